//! The object heap: a single contiguous, fixed-capacity, bump-allocated
//! buffer. Object references into it are plain byte offsets rather
//! than raw pointers, so a compaction that moves the underlying bytes
//! never invalidates a held reference the way a raw pointer would.

use crate::object::ClassRecord;
use crate::oop::{ClassRef, Oop, Region};

/// `{class: Oop, mask: u8, elem_count: u32}`, padded to 16 bytes so the
/// ivar/element slots that follow stay 8-byte aligned.
pub const HEADER_SIZE: usize = 16;
/// Every stack slot, instance variable, and array element is one `Oop`:
/// a region tag byte plus a little-endian `u32` index, padded to 8 bytes.
pub const OOP_SIZE: usize = 8;

pub const MASK_MARKED: u8 = 0b01;
pub const MASK_PRESERVE: u8 = 0b10;

pub fn align8(n: usize) -> usize {
  (n + 7) & !7
}

fn region_tag(region: Region) -> u8 {
  match region {
    Region::Heap => 0,
    Region::Class => 1,
    Region::Symbol => 2,
  }
}

fn region_from_tag(tag: u8) -> Region {
  match tag {
    0 => Region::Heap,
    1 => Region::Class,
    2 => Region::Symbol,
    other => panic!("corrupt oop region tag {other}"),
  }
}

fn encode_oop(buf: &mut [u8], at: usize, oop: Oop) {
  buf[at] = region_tag(oop.region);
  buf[at + 4..at + 8].copy_from_slice(&oop.index.to_le_bytes());
}

fn decode_oop(buf: &[u8], at: usize) -> Oop {
  let region = region_from_tag(buf[at]);
  let index = u32::from_le_bytes(buf[at + 4..at + 8].try_into().unwrap());
  Oop { region, index }
}

pub struct ObjectHeap {
  buf: Vec<u8>,
  capacity: usize,
  end: usize,
}

impl ObjectHeap {
  pub fn new(capacity: usize) -> Self {
    ObjectHeap { buf: vec![0u8; capacity], capacity, end: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn used(&self) -> usize {
    self.end
  }

  pub fn contains(&self, offset: u32) -> bool {
    (offset as usize) < self.end
  }

  /// Bumps `end` by `size` bytes (8-byte aligned), returning the base
  /// offset, or `None` if doing so would exceed capacity. The caller
  /// (the `Image`) is responsible for triggering a GC and retrying.
  pub fn try_bump(&mut self, size: usize) -> Option<u32> {
    let size = align8(size);
    if self.end + size > self.capacity {
      return None;
    }
    let base = self.end;
    self.end += size;
    Some(base as u32)
  }

  fn at(&self, offset: u32) -> usize {
    offset as usize
  }

  pub fn class_of(&self, offset: u32) -> ClassRef {
    let at = self.at(offset);
    let index = u32::from_le_bytes(self.buf[at + 4..at + 8].try_into().unwrap());
    ClassRef(index)
  }

  pub fn set_class(&mut self, offset: u32, class: ClassRef) {
    let at = self.at(offset);
    encode_oop(&mut self.buf, at, class.erase());
  }

  pub fn mask_of(&self, offset: u32) -> u8 {
    self.buf[self.at(offset) + 1]
  }

  pub fn set_mask(&mut self, offset: u32, mask: u8) {
    let at = self.at(offset);
    self.buf[at + 1] = mask;
  }

  pub fn is_marked(&self, offset: u32) -> bool {
    self.mask_of(offset) & MASK_MARKED != 0
  }

  pub fn mark(&mut self, offset: u32) {
    let mask = self.mask_of(offset) | MASK_MARKED;
    self.set_mask(offset, mask);
  }

  pub fn clear_mark(&mut self, offset: u32) {
    let mask = self.mask_of(offset) & !MASK_MARKED;
    self.set_mask(offset, mask);
  }

  pub fn is_preserved(&self, offset: u32) -> bool {
    self.mask_of(offset) & MASK_PRESERVE != 0
  }

  pub fn preserve(&mut self, offset: u32) {
    let mask = self.mask_of(offset) | MASK_PRESERVE;
    self.set_mask(offset, mask);
  }

  pub fn elem_count_of(&self, offset: u32) -> u32 {
    let at = self.at(offset);
    u32::from_le_bytes(self.buf[at + 8..at + 12].try_into().unwrap())
  }

  pub fn set_elem_count(&mut self, offset: u32, count: u32) {
    let at = self.at(offset);
    self.buf[at + 8..at + 12].copy_from_slice(&count.to_le_bytes());
  }

  pub fn ivar(&self, offset: u32, index: u32) -> Oop {
    let at = self.at(offset) + HEADER_SIZE + index as usize * OOP_SIZE;
    decode_oop(&self.buf, at)
  }

  pub fn set_ivar(&mut self, offset: u32, index: u32, value: Oop) {
    let at = self.at(offset) + HEADER_SIZE + index as usize * OOP_SIZE;
    encode_oop(&mut self.buf, at, value);
  }

  pub fn read_i32(&self, offset: u32) -> i32 {
    let at = self.at(offset) + HEADER_SIZE;
    i32::from_le_bytes(self.buf[at..at + 4].try_into().unwrap())
  }

  pub fn write_i32(&mut self, offset: u32, value: i32) {
    let at = self.at(offset) + HEADER_SIZE;
    self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
  }

  /// The total footprint of the object at `offset`, given its class
  /// record: fixed classes report their own size; variable classes
  /// (`Array`) add `elem_count` slots on top of the header.
  pub fn object_size(&self, offset: u32, class: &ClassRecord) -> usize {
    if class.is_variable {
      align8(HEADER_SIZE + self.elem_count_of(offset) as usize * OOP_SIZE)
    } else {
      class.instance_size
    }
  }

  /// Slides the live object's bytes backward by `shift` within the
  /// buffer. Safe to call with `shift == 0`. `copy_within` already
  /// handles overlapping source/destination ranges correctly.
  pub fn slide(&mut self, from: u32, to: u32, size: usize) {
    if from == to {
      return;
    }
    let from = from as usize;
    let to = to as usize;
    self.buf.copy_within(from..from + size, to);
  }

  pub fn truncate(&mut self, new_end: u32) {
    self.end = new_end as usize;
  }

  pub fn end(&self) -> u32 {
    self.end as u32
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bump_allocation_respects_capacity() {
    let mut heap = ObjectHeap::new(32);
    assert_eq!(heap.try_bump(16), Some(0));
    assert_eq!(heap.try_bump(16), Some(16));
    assert_eq!(heap.try_bump(8), None, "heap is exactly full");
  }

  #[test]
  fn ivar_roundtrip() {
    let mut heap = ObjectHeap::new(64);
    let offset = heap.try_bump(HEADER_SIZE + 2 * OOP_SIZE).unwrap();
    let value = Oop::heap(7);
    heap.set_ivar(offset, 1, value);
    assert_eq!(heap.ivar(offset, 1), value);
    assert_eq!(heap.ivar(offset, 0), Oop::heap(0));
  }

  #[test]
  fn slide_handles_overlap() {
    let mut heap = ObjectHeap::new(64);
    let a = heap.try_bump(HEADER_SIZE).unwrap();
    heap.set_elem_count(a, 0xDEAD);
    heap.slide(a, 0, HEADER_SIZE);
    assert_eq!(heap.elem_count_of(0), 0xDEAD);
  }
}

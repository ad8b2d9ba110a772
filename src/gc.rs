//! The mark-compact (sliding) collector.
//!
//! Three passes, all iterative (a `Vec`-backed work list, never Rust
//! recursion, so a deep object graph can't blow the native stack):
//! mark roots and everything reachable from them, slide every surviving
//! object toward the front of the heap while recording the gaps dead
//! objects leave behind, then rewrite every stored reference using the
//! cumulative gap size below it.

use crate::image::Image;
use crate::oop::Oop;

/// Runs a full collection cycle. Called automatically by `Image`'s
/// allocator on bump-pointer exhaustion (unless paused); also exposed
/// directly as the `gc_run` host API.
pub fn run(image: &mut Image) {
  tracing::debug!(used = image.heap.used(), capacity = image.heap.capacity(), "gc: starting cycle");
  mark(image);
  let gaps = compact(image);
  rewrite_references(image, &gaps);
  tracing::debug!(used = image.heap.used(), freed_gaps = gaps.len(), "gc: cycle complete");
}

/// Mark phase: roots are every heap reference on the operand stack,
/// every heap reference bound in global scope, and every object the
/// heap itself already carries the PRESERVE bit for (singletons).
/// Symbols and classes are pool-resident, not heap objects, so marking
/// never needs to recurse into the symbol or class table.
fn mark(image: &mut Image) {
  let mut worklist: Vec<u32> = Vec::new();

  let mut offset = 0u32;
  while offset < image.heap.end() {
    let class = image.heap.class_of(offset);
    let size = { let record = image.classes.get(class); image.heap.object_size(offset, record) } as u32;
    if image.heap.is_preserved(offset) && !image.heap.is_marked(offset) {
      image.heap.mark(offset);
      worklist.push(offset);
    }
    offset += size;
  }

  for oop in image.operand_stack.clone() {
    mark_root(image, oop, &mut worklist);
  }
  let mut globals = Vec::new();
  image.globals.for_each_inorder(|_, value| globals.push(*value));
  for oop in globals {
    mark_root(image, oop, &mut worklist);
  }

  while let Some(offset) = worklist.pop() {
    let class = image.heap.class_of(offset);
    let count = {
      let record = image.classes.get(class);
      if record.is_variable {
        image.heap.elem_count_of(offset)
      } else {
        record.ivar_count
      }
    };
    for i in 0..count {
      let child = image.heap.ivar(offset, i);
      mark_root(image, child, &mut worklist);
    }
  }
}

fn mark_root(image: &mut Image, oop: Oop, worklist: &mut Vec<u32>) {
  if !oop.is_heap() {
    return;
  }
  if image.heap.is_marked(oop.index) {
    return;
  }
  image.heap.mark(oop.index);
  worklist.push(oop.index);
}

/// Compact phase. Walks the heap once, left to right, using sizes
/// computed *before* any sliding happens. Safe because `slide` only
/// ever moves bytes to a lower address than or equal to where the walk
/// currently stands, so unread bytes ahead of the cursor are never
/// touched before they're read. Returns the ascending, gap-merged break
/// list the reference-rewrite pass needs.
fn compact(image: &mut Image) -> Vec<(u32, u32)> {
  let mut gaps: Vec<(u32, u32)> = Vec::new();
  let mut read = 0u32;
  let mut write = 0u32;
  let end = image.heap.end();

  while read < end {
    let class = image.heap.class_of(read);
    let size = { let record = image.classes.get(class); image.heap.object_size(read, record) } as u32;
    let alive = image.heap.is_marked(read) || image.heap.is_preserved(read);

    if alive {
      if write != read {
        image.heap.slide(read, write, size as usize);
      }
      image.heap.clear_mark(write);
      write += size;
    } else {
      match gaps.last_mut() {
        Some((gap_start, gap_size)) if *gap_start + *gap_size == read => *gap_size += size,
        _ => gaps.push((read, size)),
      }
    }
    read += size;
  }

  image.heap.truncate(write);
  gaps
}

/// Shifts `index` down by the total size of every gap that sat below
/// it. `gaps` is ascending by construction (the compact walk is
/// left-to-right), so this is a single linear pass. The break list
/// never grows large enough in practice to need a binary search over
/// prefix sums.
fn remap_index(index: u32, gaps: &[(u32, u32)]) -> u32 {
  let mut shift = 0u32;
  for (gap_start, gap_size) in gaps {
    if *gap_start < index {
      shift += gap_size;
    } else {
      break;
    }
  }
  index - shift
}

fn remap(oop: Oop, gaps: &[(u32, u32)]) -> Oop {
  if !oop.is_heap() || gaps.is_empty() {
    return oop;
  }
  Oop::heap(remap_index(oop.index, gaps))
}

/// Reference-rewrite phase: every stack slot, every global binding, and
/// every live object's ivars (or array elements) get remapped to their
/// post-compaction address.
fn rewrite_references(image: &mut Image, gaps: &[(u32, u32)]) {
  if gaps.is_empty() {
    return;
  }

  for oop in image.operand_stack.iter_mut() {
    *oop = remap(*oop, gaps);
  }

  image.globals.for_each_value_mut(|value| {
    *value = remap(*value, gaps);
  });

  let mut offset = 0u32;
  let end = image.heap.end();
  while offset < end {
    let class = image.heap.class_of(offset);
    let (size, count) = {
      let record = image.classes.get(class);
      let size = image.heap.object_size(offset, record) as u32;
      let count = if record.is_variable { image.heap.elem_count_of(offset) } else { record.ivar_count };
      (size, count)
    };
    for i in 0..count {
      let old = image.heap.ivar(offset, i);
      let new = remap(old, gaps);
      if new != old {
        image.heap.set_ivar(offset, i, new);
      }
    }
    offset += size;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::image::{Image, ImageConfig};

  #[test]
  fn preserved_singletons_survive_a_cycle_with_no_roots() {
    let mut image = Image::create(ImageConfig::default());
    let nil_before = image.nil;
    run(&mut image);
    assert_eq!(image.nil, nil_before);
    assert_eq!(image.class_of(image.nil), image.builtins.undefined_object);
  }

  #[test]
  fn array_element_on_the_stack_survives_and_keeps_its_value() {
    let mut image = Image::create(ImageConfig::default());
    let array = image.make_array(image.builtins.array, 10).unwrap();
    image.heap.set_ivar(array.index, 3, image.true_obj);
    // Root the array by pushing it as if it were an operand.
    image.operand_stack.push(array);
    // Force dead filler between the array and the stack-rooted data so
    // compaction actually has something to slide past.
    for _ in 0..5 {
      image.make_instance(image.builtins.undefined_object).unwrap();
    }
    run(&mut image);
    let rooted = *image.operand_stack.last().unwrap();
    assert_eq!(image.heap.ivar(rooted.index, 3), image.true_obj);
    image.operand_stack.pop();
  }

  #[test]
  fn unrooted_garbage_is_reclaimed() {
    let mut image = Image::create(ImageConfig::default());
    let used_before = image.heap.used();
    for _ in 0..20 {
      image.make_instance(image.builtins.undefined_object).unwrap();
    }
    assert!(image.heap.used() > used_before);
    run(&mut image);
    assert_eq!(image.heap.used(), used_before, "nothing but the permanent singletons should remain live");
  }
}

//! Tagged object references.
//!
//! Three storage regions: the moving object heap (ordinary instances,
//! including boxed Integers and Array payloads), the class pool, and
//! the symbol pool. A reference carries its region explicitly rather
//! than inferring it from address ranges. The GC's compaction step
//! still uses an address-range predicate for "is this heap address
//! still valid", a separate question from "what region is this".

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
  Heap,
  Class,
  Symbol,
}

/// A type-erased reference to any object in the image: a heap instance,
/// a class, or a symbol. Stack slots, instance variables, and global
/// bindings are all `Oop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oop {
  pub region: Region,
  pub index: u32,
}

impl PartialOrd for Oop {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Ordering by identity, not value. Makes `Oop` usable as a
/// selector-identity key in `OrderedMap`.
impl Ord for Oop {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.region, self.index).cmp(&(other.region, other.index))
  }
}

impl Oop {
  pub fn heap(offset: u32) -> Self {
    Oop { region: Region::Heap, index: offset }
  }

  pub fn is_heap(self) -> bool {
    self.region == Region::Heap
  }
}

/// A stable reference to a class record in the class pool. Classes are
/// never relocated or reclaimed, so this index is valid for the
/// lifetime of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef(pub u32);

impl ClassRef {
  pub fn erase(self) -> Oop {
    Oop { region: Region::Class, index: self.0 }
  }

  pub fn try_from_oop(oop: Oop) -> Option<Self> {
    (oop.region == Region::Class).then_some(ClassRef(oop.index))
  }
}

/// A stable reference to an interned symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRef(pub u32);

impl SymbolRef {
  pub fn erase(self) -> Oop {
    Oop { region: Region::Symbol, index: self.0 }
  }

  pub fn try_from_oop(oop: Oop) -> Option<Self> {
    (oop.region == Region::Symbol).then_some(SymbolRef(oop.index))
  }
}

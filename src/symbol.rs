//! Symbol interning.
//!
//! Symbols are class instances of `Symbol`, but unlike ordinary
//! instances they live in a dedicated slab pool rather than the moving
//! heap, keeping them at a stable address with no special-casing in the
//! collector. `SymbolRecord` carries the name directly rather than
//! indirecting through instance variables.

use crate::oop::{ClassRef, SymbolRef};
use crate::ordmap::OrderedMap;
use crate::pool::SlabPool;

pub struct SymbolRecord {
  pub class: ClassRef,
  pub mask: u8,
  pub name: String,
}

pub const MASK_PRESERVE: u8 = 0b10;

pub struct SymbolRegistry {
  pool: SlabPool<SymbolRecord>,
  by_name: OrderedMap<String, SymbolRef>,
}

impl SymbolRegistry {
  pub fn init(initial_count: usize) -> Self {
    SymbolRegistry { pool: SlabPool::init(initial_count), by_name: OrderedMap::new() }
  }

  /// Interns `name`, returning the existing symbol if present or
  /// allocating and registering a fresh one otherwise. Fresh symbols are
  /// marked `PRESERVE` immediately: they are permanent the instant they
  /// exist.
  pub fn intern(&mut self, name: &str, symbol_class: ClassRef) -> SymbolRef {
    if let Some(existing) = self.by_name.find(&name.to_string()) {
      return *existing;
    }
    let index = self.pool.alloc(SymbolRecord { class: symbol_class, mask: MASK_PRESERVE, name: name.to_string() });
    let sym = SymbolRef(index);
    self.by_name.insert(name.to_string(), sym);
    sym
  }

  pub fn get(&self, sym: SymbolRef) -> &SymbolRecord {
    self.pool.get(sym.0)
  }

  /// Reverse lookup by identity. The registry is expected to stay small
  /// (selectors and class names), so a linear scan is acceptable, as the
  /// spec notes.
  pub fn symbol_to_string(&self, sym: SymbolRef) -> &str {
    &self.get(sym).name
  }

  pub fn len(&self) -> usize {
    self.by_name.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_name.is_empty()
  }

  pub fn class_of(&self, sym: SymbolRef) -> ClassRef {
    self.get(sym).class
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dummy_class() -> ClassRef {
    ClassRef(0)
  }

  #[test]
  fn intern_is_idempotent_by_name() {
    let mut reg = SymbolRegistry::init(4);
    let a = reg.intern("TEST", dummy_class());
    let b = reg.intern("TEST", dummy_class());
    assert_eq!(a, b);
    assert_eq!(reg.len(), 1);
  }

  #[test]
  fn round_trips_through_string() {
    let mut reg = SymbolRegistry::init(4);
    let s = reg.intern("hello", dummy_class());
    assert_eq!(reg.symbol_to_string(s), "hello");
  }

  #[test]
  fn distinct_names_get_distinct_identity() {
    let mut reg = SymbolRegistry::init(4);
    let a = reg.intern("a", dummy_class());
    let b = reg.intern("b", dummy_class());
    assert_ne!(a, b);
  }
}

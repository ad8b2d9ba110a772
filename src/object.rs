//! The class half of the object/class model.
//!
//! A `ClassRecord` is itself an object (`header_class` normally points
//! back at the class's own `ClassRef`, modeling the `class.class ==
//! class` sentinel this system uses in place of a true metaclass
//! hierarchy) plus the class-specific bookkeeping: superclass link,
//! method dictionary, instance layout. The superclass link is a plain
//! `Option<ClassRef>`, not a self-equal sentinel. It terminates lookup
//! the same way a `None` always does in Rust.

use crate::error::Result;
use crate::image::Image;
use crate::oop::{ClassRef, Oop, SymbolRef};
use crate::ordmap::OrderedMap;
use crate::pool::SlabPool;

pub type PrimitiveFn = fn(&mut Image, Oop, &[Oop]) -> Result<Oop>;

#[derive(Clone)]
pub enum MethodEntry {
  Primitive { func: PrimitiveFn, argc: u8 },
  Compiled { code: std::rc::Rc<crate::bytecode::CodeBlob>, offset: u32, argc: u8 },
}

impl MethodEntry {
  pub fn argc(&self) -> u8 {
    match self {
      MethodEntry::Primitive { argc, .. } => *argc,
      MethodEntry::Compiled { argc, .. } => *argc,
    }
  }
}

pub const MASK_PRESERVE: u8 = 0b10;

pub struct ClassRecord {
  pub header_class: ClassRef,
  pub mask: u8,
  pub superclass: Option<ClassRef>,
  pub name: Option<SymbolRef>,
  pub methods: OrderedMap<Oop, MethodEntry>,
  /// Total instance-variable count, including everything inherited.
  pub ivar_count: u32,
  /// Names for every ivar slot (own + inherited), indexed the same way
  /// `GETIVAR`/`SETIVAR` index instance variables. `None` where a source
  /// predates named ivars (bootstrap classes installed before any
  /// `subclass:instanceVariableNames:` call).
  pub ivar_names: Vec<Option<SymbolRef>>,
  /// Per-instance byte footprint for fixed-shape classes. For variable
  /// classes (`Array`) this is the *base* footprint (header only); the
  /// actual size of an instance also depends on its `elem_count`.
  pub instance_size: usize,
  pub is_variable: bool,
  /// Optional per-class cleanup hook, called instead of any general
  /// finalization machinery. None of the built-in classes register one;
  /// this exists for host-defined classes that need it.
  pub finalizer: Option<fn(&mut Image, Oop)>,
}

pub struct ClassTable {
  pool: SlabPool<ClassRecord>,
}

impl ClassTable {
  pub fn init(initial_count: usize) -> Self {
    ClassTable { pool: SlabPool::init(initial_count) }
  }

  pub fn get(&self, class: ClassRef) -> &ClassRecord {
    self.pool.get(class.0)
  }

  pub fn get_mut(&mut self, class: ClassRef) -> &mut ClassRecord {
    self.pool.get_mut(class.0)
  }

  pub fn try_get(&self, class: ClassRef) -> Option<&ClassRecord> {
    self.pool.try_get(class.0)
  }

  pub fn capacity(&self) -> u32 {
    self.pool.capacity() as u32
  }

  /// Allocates a class record whose `header_class` points at itself
  /// (the metaclass sentinel), with no superclass, no ivars, and no
  /// name yet. Used once, for the `Object` root, during bootstrap.
  pub fn new_root(&mut self, instance_size: usize) -> ClassRef {
    let index = self.pool.alloc(ClassRecord {
      header_class: ClassRef(0),
      mask: MASK_PRESERVE,
      superclass: None,
      name: None,
      methods: OrderedMap::new(),
      ivar_count: 0,
      ivar_names: Vec::new(),
      instance_size,
      is_variable: false,
      finalizer: None,
    });
    let me = ClassRef(index);
    self.get_mut(me).header_class = me;
    me
  }

  /// `subclass(super, name, ivar_count, ...)`: allocates
  /// a new class, links the superclass, sums inherited ivars, and
  /// records the new class's own ivar names (if any).
  pub fn subclass(&mut self, superclass: ClassRef, name: Option<SymbolRef>, own_ivar_names: &[SymbolRef]) -> ClassRef {
    let parent = self.get(superclass);
    let mut ivar_names = parent.ivar_names.clone();
    ivar_names.extend(own_ivar_names.iter().map(|s| Some(*s)));
    let ivar_count = ivar_names.len() as u32;
    let instance_size = crate::heap::HEADER_SIZE + ivar_count as usize * crate::heap::OOP_SIZE;

    let index = self.pool.alloc(ClassRecord {
      header_class: ClassRef(0),
      mask: 0,
      superclass: Some(superclass),
      name,
      methods: OrderedMap::new(),
      ivar_count,
      ivar_names,
      instance_size,
      is_variable: false,
      finalizer: None,
    });
    let me = ClassRef(index);
    self.get_mut(me).header_class = me;
    me
  }

  /// Declares `class` as a variable-payload (Array-shaped) class: its
  /// instances carry a dynamic element count in the object header and
  /// their slots are laid out right after it, like trailing ivars.
  pub fn make_variable(&mut self, class: ClassRef) {
    let record = self.get_mut(class);
    record.is_variable = true;
    record.instance_size = crate::heap::HEADER_SIZE;
  }

  /// Overrides the boxed payload size of `class` (e.g. Integer's 4-byte
  /// raw `i32` beyond the header).
  pub fn set_boxed_payload(&mut self, class: ClassRef, extra_bytes: usize) {
    let record = self.get_mut(class);
    record.instance_size = crate::heap::align8(crate::heap::HEADER_SIZE + extra_bytes);
  }

  /// `set_method`: installs a method, rejecting (no-op)
  /// duplicate selectors. Returns whether the install happened.
  pub fn set_method(&mut self, class: ClassRef, selector: Oop, entry: MethodEntry) -> bool {
    self.get_mut(class).methods.insert(selector, entry)
  }

  /// Walks the superclass chain looking for `selector`, splaying each
  /// dictionary consulted along the way.
  pub fn lookup(&mut self, start: ClassRef, selector: Oop) -> Option<MethodEntry> {
    let mut current = Some(start);
    while let Some(class) = current {
      if let Some(entry) = self.get_mut(class).methods.find(&selector) {
        return Some(entry.clone());
      }
      current = self.get(class).superclass;
    }
    None
  }
}

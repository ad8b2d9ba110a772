//! The top-level image: owns every other subsystem and exposes the
//! host-facing API.

use crate::bytecode::CodeBlob;
use crate::error::{ImageError, Result};
use crate::heap::ObjectHeap;
use crate::object::{ClassTable, MethodEntry};
use crate::oop::{ClassRef, Oop, SymbolRef};
use crate::ordmap::OrderedMap;
use crate::symbol::SymbolRegistry;
use crate::vm::Frame;
use std::rc::Rc;

/// Construction-time sizing for an `Image`. Allocator-callback
/// configuration fields (alloc/free/memcopy/memset) are deliberately
/// dropped: ordinary `Vec<u8>` allocation
/// already gives this crate the same behavior those callbacks existed to
/// customize, and plumbing host-supplied function pointers through every
/// allocation site would buy nothing a real embedder needs here. See
/// DESIGN.md.
#[derive(Debug, Clone)]
pub struct ImageConfig {
  pub heap_capacity: usize,
  pub operand_stack_capacity: usize,
  pub symbol_table_initial_count: usize,
  pub class_table_initial_count: usize,
}

impl Default for ImageConfig {
  fn default() -> Self {
    ImageConfig {
      heap_capacity: 1 << 20,
      operand_stack_capacity: 4096,
      symbol_table_initial_count: 64,
      class_table_initial_count: 32,
    }
  }
}

/// Class (and a handful of oft-used selector) references resolved once
/// at bootstrap, so builtins and dispatch never re-intern or re-look-up
/// by name on the hot path.
pub struct Builtins {
  pub object: ClassRef,
  pub symbol: ClassRef,
  pub undefined_object: ClassRef,
  pub boolean: ClassRef,
  pub true_class: ClassRef,
  pub false_class: ClassRef,
  pub integer: ClassRef,
  pub array: ClassRef,
  pub message_not_understood: ClassRef,
  pub does_not_understand: SymbolRef,
}

pub struct Image {
  pub symbols: SymbolRegistry,
  pub classes: ClassTable,
  pub heap: ObjectHeap,
  pub globals: OrderedMap<Oop, Oop>,
  pub operand_stack: Vec<Oop>,
  pub frames: Vec<Frame>,
  pub nil: Oop,
  pub true_obj: Oop,
  pub false_obj: Oop,
  pub builtins: Builtins,
  pub sel_value: SymbolRef,
  pub(crate) gc_disabled: bool,
  config: ImageConfig,
}

impl Image {
  /// Brings up a fresh image: bootstraps the class hierarchy, interns
  /// the symbols every built-in needs, and installs the primitive
  /// methods of
  ///
  /// Bootstrap runs in two passes to break a circularity: interning a
  /// symbol requires a live `Symbol` class reference (for the symbol's
  /// own header), while a class's `name` field is itself a symbol. Pass
  /// one creates every class skeleton with `name: None` (the `Symbol`
  /// class is created first, so interning is valid from the very first
  /// call); pass two interns the needed names and patches each class's
  /// `name` field afterward.
  pub fn create(config: ImageConfig) -> Self {
    tracing::debug!(heap_capacity = config.heap_capacity, "bootstrapping image");

    let mut classes = ClassTable::init(config.class_table_initial_count);
    let object = classes.new_root(crate::heap::HEADER_SIZE);
    let symbol = classes.subclass(object, None, &[]);

    let mut symbols = SymbolRegistry::init(config.symbol_table_initial_count);

    let undefined_object = classes.subclass(object, None, &[]);
    let boolean = classes.subclass(object, None, &[]);
    let true_class = classes.subclass(boolean, None, &[]);
    let false_class = classes.subclass(boolean, None, &[]);
    let integer = classes.subclass(object, None, &[]);
    classes.set_boxed_payload(integer, 4);
    let array = classes.subclass(object, None, &[]);
    classes.make_variable(array);
    let message_not_understood_ivars = {
      let recv = symbols.intern("receiver", symbol);
      let sel = symbols.intern("selector", symbol);
      [recv, sel]
    };
    let message_not_understood = classes.subclass(object, None, &message_not_understood_ivars);

    for (class, name) in [
      (object, "Object"),
      (symbol, "Symbol"),
      (undefined_object, "UndefinedObject"),
      (boolean, "Boolean"),
      (true_class, "True"),
      (false_class, "False"),
      (integer, "Integer"),
      (array, "Array"),
      (message_not_understood, "MessageNotUnderstood"),
    ] {
      let sym = symbols.intern(name, symbol);
      classes.get_mut(class).name = Some(sym);
    }

    let does_not_understand = symbols.intern("doesNotUnderstand:", symbol);
    let sel_value = symbols.intern("value", symbol);

    let mut image = Image {
      symbols,
      classes,
      heap: ObjectHeap::new(config.heap_capacity),
      globals: OrderedMap::new(),
      operand_stack: Vec::with_capacity(config.operand_stack_capacity),
      frames: Vec::new(),
      nil: Oop::heap(0),
      true_obj: Oop::heap(0),
      false_obj: Oop::heap(0),
      builtins: Builtins {
        object,
        symbol,
        undefined_object,
        boolean,
        true_class,
        false_class,
        integer,
        array,
        message_not_understood,
        does_not_understand,
      },
      sel_value,
      gc_disabled: false,
      config,
    };

    image.nil = image.make_instance(undefined_object).expect("bootstrap allocation cannot fail against a fresh heap");
    image.true_obj = image.make_instance(true_class).expect("bootstrap allocation cannot fail against a fresh heap");
    image.false_obj = image.make_instance(false_class).expect("bootstrap allocation cannot fail against a fresh heap");
    image.heap.preserve(image.nil.index);
    image.heap.preserve(image.true_obj.index);
    image.heap.preserve(image.false_obj.index);

    image.install_builtin_methods();
    image
  }

  fn install_builtin_methods(&mut self) {
    use crate::builtins as prim;
    let object = self.builtins.object;
    let true_class = self.builtins.true_class;
    let false_class = self.builtins.false_class;
    let integer = self.builtins.integer;
    let array = self.builtins.array;
    let symbol = self.builtins.symbol;

    // A local macro instead of a closure: each expansion borrows only
    // the fields it needs, inline.
    macro_rules! install {
      ($class:expr, $selector:expr, $argc:expr, $func:expr) => {{
        let sym = self.symbols.intern($selector, symbol).erase();
        self.classes.set_method($class, sym, MethodEntry::Primitive { func: $func, argc: $argc });
      }};
    }

    install!(object, "new", 0, prim::object_new);
    install!(object, "class", 0, prim::object_class);
    install!(object, "subclass:", 1, prim::object_subclass);
    install!(object, "subclass:instanceVariableNames:classVariableNames:", 3, prim::object_subclass_with_ivars);
    install!(object, "doesNotUnderstand:", 1, prim::does_not_understand);

    install!(true_class, "ifTrue:", 1, prim::boolean_run_block);
    install!(true_class, "ifFalse:", 1, prim::boolean_noop);
    install!(false_class, "ifTrue:", 1, prim::boolean_noop);
    install!(false_class, "ifFalse:", 1, prim::boolean_run_block);

    install!(integer, "+", 1, prim::integer_add);
    install!(integer, "-", 1, prim::integer_sub);
    install!(integer, "*", 1, prim::integer_mul);
    install!(integer, "/", 1, prim::integer_div);
    install!(integer, "rawGet", 0, prim::integer_raw_get);
    install!(integer, "rawSet:", 1, prim::integer_raw_set);

    install!(array, "new:", 1, prim::array_new);
    install!(array, "at:", 1, prim::array_at);
    install!(array, "at:put:", 2, prim::array_at_put);
    install!(array, "length", 0, prim::array_length);
  }

  // ---- Symbols -----------------------------------------------------

  pub fn intern_symbol(&mut self, name: &str) -> SymbolRef {
    self.symbols.intern(name, self.builtins.symbol)
  }

  pub fn symbol_to_string(&self, sym: SymbolRef) -> &str {
    self.symbols.symbol_to_string(sym)
  }

  // ---- Classes -------------------------------------------------------

  pub fn class_by_name(&self, name: &str) -> Option<ClassRef> {
    let mut found = None;
    self.classes_scan(|class, record| {
      if record.name.map(|s| self.symbols.symbol_to_string(s)) == Some(name) {
        found = Some(class);
      }
    });
    found
  }

  fn classes_scan(&self, mut visit: impl FnMut(ClassRef, &crate::object::ClassRecord)) {
    // Small, bootstrap-sized registry; a linear scan mirrors the
    // symbol registry's reverse-lookup tradeoff (symbol.rs).
    for index in 0..self.classes_len() {
      let class = ClassRef(index);
      if let Some(record) = self.classes.try_get(class) {
        visit(class, record);
      }
    }
  }

  fn classes_len(&self) -> u32 {
    self.classes.capacity()
  }

  pub(crate) fn ivar_index(&self, class: ClassRef, name: &str) -> Option<u32> {
    self.classes.get(class).ivar_names.iter().position(|n| n.map(|s| self.symbols.symbol_to_string(s)) == Some(name)).map(|i| i as u32)
  }

  /// `get_super(class)`: the class's superclass, or `None` at the
  /// `Object` root. Exposed directly alongside `get_class` rather than
  /// folded into `class_of`, since "what is this object's class" and
  /// "what does this class inherit from" apply to different kinds of
  /// references.
  pub fn get_super(&self, class: ClassRef) -> Option<ClassRef> {
    self.classes.get(class).superclass
  }

  pub fn class_of(&self, oop: Oop) -> ClassRef {
    match oop.region {
      crate::oop::Region::Heap => self.heap.class_of(oop.index),
      crate::oop::Region::Class => self.classes.get(ClassRef(oop.index)).header_class,
      crate::oop::Region::Symbol => self.symbols.class_of(SymbolRef(oop.index)),
    }
  }

  pub fn set_primitive_method(&mut self, class: ClassRef, selector: SymbolRef, func: crate::object::PrimitiveFn, argc: u8) -> bool {
    self.classes.set_method(class, selector.erase(), MethodEntry::Primitive { func, argc })
  }

  // ---- Globals ---------------------------------------------------------

  /// Splays the binding to the root of the global-scope tree on every
  /// read, same as any other selector lookup in this runtime. Globals
  /// are expected to be re-read far more often than inserted.
  pub fn get_global(&mut self, symbol: SymbolRef) -> Oop {
    self.globals.find(&symbol.erase()).copied().unwrap_or(self.nil)
  }

  /// Binds `symbol -> value` in global scope, overwriting any existing
  /// binding rather than deleting it first.
  pub fn set_global(&mut self, symbol: SymbolRef, value: Oop) {
    let key = symbol.erase();
    self.globals.remove(&key);
    self.globals.insert(key, value);
  }

  /// Removes a global binding outright. Binding a global to nil leaves
  /// it bound to nil; deletion only happens through this explicit call.
  pub fn delete_global(&mut self, symbol: SymbolRef) -> Option<Oop> {
    self.globals.remove(&symbol.erase())
  }

  // ---- Instances ---------------------------------------------------------

  pub fn get_ivar(&self, object: Oop, index: u32) -> Oop {
    if !object.is_heap() {
      return self.nil;
    }
    let class = self.heap.class_of(object.index);
    if index >= self.classes.get(class).ivar_count {
      return self.nil;
    }
    self.heap.ivar(object.index, index)
  }

  pub fn set_ivar(&mut self, object: Oop, index: u32, value: Oop) {
    if !object.is_heap() {
      return;
    }
    let class = self.heap.class_of(object.index);
    if index >= self.classes.get(class).ivar_count {
      return;
    }
    self.heap.set_ivar(object.index, index, value);
  }

  /// `make_instance(class)`: allocates, nils out every
  /// ivar, and sets the header. Retries once through a GC cycle if the
  /// bump allocator is full.
  pub fn make_instance(&mut self, class: ClassRef) -> Result<Oop> {
    let size = self.classes.get(class).instance_size;
    let offset = self.alloc_raw(size)?;
    self.heap.set_class(offset, class);
    self.heap.set_mask(offset, 0);
    let ivar_count = self.classes.get(class).ivar_count;
    for i in 0..ivar_count {
      self.heap.set_ivar(offset, i, self.nil);
    }
    Ok(Oop::heap(offset))
  }

  pub fn make_array(&mut self, class: ClassRef, count: u32) -> Result<Oop> {
    let size = crate::heap::HEADER_SIZE + count as usize * crate::heap::OOP_SIZE;
    let offset = self.alloc_raw(size)?;
    self.heap.set_class(offset, class);
    self.heap.set_mask(offset, 0);
    self.heap.set_elem_count(offset, count);
    for i in 0..count {
      self.heap.set_ivar(offset, i, self.nil);
    }
    Ok(Oop::heap(offset))
  }

  fn alloc_raw(&mut self, size: usize) -> Result<u32> {
    if let Some(offset) = self.heap.try_bump(size) {
      return Ok(offset);
    }
    if !self.gc_disabled {
      crate::gc::run(self);
      if let Some(offset) = self.heap.try_bump(size) {
        return Ok(offset);
      }
    }
    tracing::error!(requested = size, available = self.heap.capacity() - self.heap.used(), "allocator exhausted");
    Err(ImageError::AllocatorExhausted { requested: size, available: self.heap.capacity() - self.heap.used() })
  }

  // ---- Integers ---------------------------------------------------------

  pub fn get_integer(&mut self, value: i32) -> Result<Oop> {
    let oop = self.make_instance(self.builtins.integer)?;
    self.heap.write_i32(oop.index, value);
    Ok(oop)
  }

  pub fn unbox_integer(&self, oop: Oop) -> i32 {
    assert_eq!(self.class_of(oop), self.builtins.integer, "unbox_integer called on a non-Integer object");
    self.heap.read_i32(oop.index)
  }

  // ---- Bytecode execution -------------------------------------------------

  /// Pushes a fresh frame at `(code, offset)` and runs the interpreter
  /// until it returns, handing back whatever value the program's
  /// top-level `RETURN` leaves. No receiver or arguments are pushed
  /// first: a top-level program addresses globals and classes directly,
  /// not a `self`.
  pub fn execute_blob(&mut self, code: Rc<CodeBlob>, offset: u32) -> Result<Oop> {
    let base = self.operand_stack.len();
    let target_depth = self.frames.len();
    self.frames.push(Frame { code, ip: offset as usize, base });
    crate::vm::run(self, target_depth)
  }

  // ---- GC control --------------------------------------------------------

  pub fn gc_run(&mut self) {
    crate::gc::run(self);
  }

  pub fn gc_pause(&mut self) {
    self.gc_disabled = true;
  }

  pub fn gc_resume(&mut self) {
    self.gc_disabled = false;
  }

  pub fn gc_preserve(&mut self, oop: Oop) {
    if oop.is_heap() {
      self.heap.preserve(oop.index);
    }
  }

  pub fn gc_release(&mut self, oop: Oop) {
    if oop.is_heap() {
      let mask = self.heap.mask_of(oop.index) & !crate::heap::MASK_PRESERVE;
      self.heap.set_mask(oop.index, mask);
    }
  }

  // ---- Scoped locals ------------------------------------------------------

  /// Opens a scope of `n` nil-initialized, stack-rooted local slots and
  /// returns the base index to pass to `pop_locals`.
  pub fn push_locals(&mut self, n: usize) -> usize {
    let base = self.operand_stack.len();
    for _ in 0..n {
      self.operand_stack.push(self.nil);
    }
    base
  }

  pub fn pop_locals(&mut self, base: usize) {
    self.operand_stack.truncate(base);
  }

  pub fn config(&self) -> &ImageConfig {
    &self.config
  }
}

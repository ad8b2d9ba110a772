//! Bootstrap-installed primitive methods.
//!
//! Every function here has the `PrimitiveFn` shape dispatch expects:
//! `(image, receiver, argv) -> Result<Oop>`. Argument-count checking
//! already happened in `dispatch::send` by the time these run, so each
//! primitive can index `argv` directly.

use crate::error::Result;
use crate::oop::{ClassRef, Oop};
use crate::image::Image;

pub fn object_new(image: &mut Image, receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  match ClassRef::try_from_oop(receiver) {
    Some(class) => image.make_instance(class),
    None => Ok(image.nil),
  }
}

pub fn object_class(image: &mut Image, receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  Ok(image.class_of(receiver).erase())
}

pub fn object_subclass(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  let Some(superclass) = ClassRef::try_from_oop(receiver) else {
    return Ok(image.nil);
  };
  let name = crate::oop::SymbolRef::try_from_oop(argv[0]);
  let class = image.classes.subclass(superclass, name, &[]);
  Ok(class.erase())
}

/// `subclass:instanceVariableNames:classVariableNames:`. The ivar-names
/// argument is an `Array` of `Symbol`s; class variables are explicit
/// open work, so that argument is accepted and ignored.
pub fn object_subclass_with_ivars(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  let Some(superclass) = ClassRef::try_from_oop(receiver) else {
    return Ok(image.nil);
  };
  let name = crate::oop::SymbolRef::try_from_oop(argv[0]);
  let mut ivar_names = Vec::new();
  if argv[1].is_heap() {
    let count = image.heap.elem_count_of(argv[1].index);
    for i in 0..count {
      let element = image.heap.ivar(argv[1].index, i);
      if let Some(sym) = crate::oop::SymbolRef::try_from_oop(element) {
        ivar_names.push(sym);
      }
    }
  }
  let class = image.classes.subclass(superclass, name, &ivar_names);
  Ok(class.erase())
}

/// The default `doesNotUnderstand:` installed on `Object`: a catch-all
/// that simply answers nil. A host is free to overwrite the binding
/// with something that raises instead.
pub fn does_not_understand(image: &mut Image, _receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  Ok(image.nil)
}

/// `True#ifTrue:` / `False#ifFalse:`: sends `#value` to the argument.
pub fn boolean_run_block(image: &mut Image, _receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  let value_sel = image.sel_value;
  crate::dispatch::send(image, argv[0], value_sel, &[])
}

pub fn boolean_noop(image: &mut Image, _receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  Ok(image.nil)
}

fn integer_payload(image: &Image, oop: Oop) -> Option<i32> {
  if !oop.is_heap() {
    return None;
  }
  if image.heap.class_of(oop.index) != image.builtins.integer {
    return None;
  }
  Some(image.heap.read_i32(oop.index))
}

fn integer_binop(image: &mut Image, receiver: Oop, argv: &[Oop], op: impl Fn(i32, i32) -> Option<i32>) -> Result<Oop> {
  let (Some(a), Some(b)) = (integer_payload(image, receiver), integer_payload(image, argv[0])) else {
    return Ok(image.nil);
  };
  match op(a, b) {
    Some(result) => image.get_integer(result),
    None => Ok(image.nil),
  }
}

pub fn integer_add(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  integer_binop(image, receiver, argv, |a, b| a.checked_add(b))
}

pub fn integer_sub(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  integer_binop(image, receiver, argv, |a, b| a.checked_sub(b))
}

pub fn integer_mul(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  integer_binop(image, receiver, argv, |a, b| a.checked_mul(b))
}

pub fn integer_div(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  integer_binop(image, receiver, argv, |a, b| if b == 0 { None } else { a.checked_div(b) })
}

/// Identity passthrough: the boxed payload is read/written by the host
/// through `Image::get_integer`/`unbox_integer`, so `rawGet` only needs
/// to hand back the same boxed receiver.
pub fn integer_raw_get(_image: &mut Image, receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  Ok(receiver)
}

pub fn integer_raw_set(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  if let Some(value) = integer_payload(image, argv[0]) {
    image.heap.write_i32(receiver.index, value);
  }
  Ok(receiver)
}

fn array_index(image: &Image, index_oop: Oop) -> Option<usize> {
  integer_payload(image, index_oop).and_then(|i| usize::try_from(i).ok())
}

pub fn array_new(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  let Some(class) = ClassRef::try_from_oop(receiver) else {
    return Ok(image.nil);
  };
  let Some(count) = integer_payload(image, argv[0]) else {
    return Ok(image.nil);
  };
  image.make_array(class, count.max(0) as u32)
}

pub fn array_at(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  if !receiver.is_heap() {
    return Ok(image.nil);
  }
  let Some(index) = array_index(image, argv[0]) else {
    return Ok(image.nil);
  };
  let count = image.heap.elem_count_of(receiver.index) as usize;
  if index >= count {
    return Ok(image.nil);
  }
  Ok(image.heap.ivar(receiver.index, index as u32))
}

pub fn array_at_put(image: &mut Image, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  if !receiver.is_heap() {
    return Ok(image.nil);
  }
  let Some(index) = array_index(image, argv[0]) else {
    return Ok(image.nil);
  };
  let count = image.heap.elem_count_of(receiver.index) as usize;
  if index >= count {
    return Ok(image.nil);
  }
  image.heap.set_ivar(receiver.index, index as u32, argv[1]);
  Ok(argv[1])
}

pub fn array_length(image: &mut Image, receiver: Oop, _argv: &[Oop]) -> Result<Oop> {
  if !receiver.is_heap() {
    return Ok(image.nil);
  }
  let count = image.heap.elem_count_of(receiver.index) as i32;
  image.get_integer(count)
}

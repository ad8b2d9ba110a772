//! Message dispatch: selector lookup up the class chain,
//! primitive vs. compiled invocation, and the `doesNotUnderstand:`
//! fallback.

use crate::error::{ImageError, Result};
use crate::image::Image;
use crate::object::MethodEntry;
use crate::oop::{Oop, SymbolRef};
use crate::vm::{self, Frame};
use std::rc::Rc;

/// `send(receiver, selector, argv)`.
///
/// Dispatch pushes the receiver onto the operand stack, then each
/// argument, before pushing a compiled method's frame. The frame's
/// `base` therefore points at the receiver slot, so a freshly entered
/// method finds its receiver at the top of its stack, ready for an
/// immediate `GETIVAR`/`SETIVAR`/`PUSHSUPER`. Re-accessing it later in a
/// method body is a concern for the bytecode compiler, which is outside
/// this crate's scope.
pub fn send(image: &mut Image, receiver: Oop, selector: SymbolRef, argv: &[Oop]) -> Result<Oop> {
  tracing::trace!(selector = image.symbol_to_string(selector), argc = argv.len(), "send");
  send_inner(image, receiver, selector, argv, false)
}

fn send_inner(image: &mut Image, receiver: Oop, selector: SymbolRef, argv: &[Oop], is_dnu_retry: bool) -> Result<Oop> {
  let class = image.class_of(receiver);
  let entry = image.classes.lookup(class, selector.erase());

  let Some(entry) = entry else {
    if is_dnu_retry {
      return Err(ImageError::MessageNotUnderstoodUnhandled);
    }
    tracing::warn!(selector = image.symbol_to_string(selector), "method not understood, falling through to doesNotUnderstand:");
    let mnu = image.make_instance(image.builtins.message_not_understood)?;
    if let Some(index) = image.ivar_index(image.builtins.message_not_understood, "receiver") {
      image.heap.set_ivar(mnu.index, index, receiver);
    }
    if let Some(index) = image.ivar_index(image.builtins.message_not_understood, "selector") {
      image.heap.set_ivar(mnu.index, index, selector.erase());
    }
    return send_inner(image, receiver, image.builtins.does_not_understand, &[mnu], true);
  };

  if argv.len() != entry.argc() as usize {
    // Arity mismatch on a primitive is a documented quirk: silently
    // answer nil rather than raise.
    return Ok(image.nil);
  }

  match entry {
    MethodEntry::Primitive { func, .. } => func(image, receiver, argv),
    MethodEntry::Compiled { code, offset, .. } => invoke_compiled(image, code, offset, receiver, argv),
  }
}

fn invoke_compiled(image: &mut Image, code: Rc<crate::bytecode::CodeBlob>, offset: u32, receiver: Oop, argv: &[Oop]) -> Result<Oop> {
  let base = image.operand_stack.len();
  image.operand_stack.push(receiver);
  image.operand_stack.extend_from_slice(argv);
  let target_depth = image.frames.len();
  image.frames.push(Frame { code, ip: offset as usize, base });
  vm::run(image, target_depth)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::image::{Image, ImageConfig};

  #[test]
  fn unregistered_selector_invokes_does_not_understand() {
    let mut image = Image::create(ImageConfig::default());
    let object = image.make_instance(image.builtins.object).unwrap();
    let mystery = image.intern_symbol("mysterySelector");
    let result = send(&mut image, object, mystery, &[]).unwrap();
    // The bootstrap `doesNotUnderstand:` is a catch-all primitive that
    // answers nil, see builtins.rs.
    assert_eq!(result, image.nil);
  }

  #[test]
  fn primitive_arity_mismatch_answers_nil() {
    let mut image = Image::create(ImageConfig::default());
    let a = image.get_integer(6).unwrap();
    let plus = image.intern_symbol("+");
    let result = send(&mut image, a, plus, &[]).unwrap();
    assert_eq!(result, image.nil);
  }

  #[test]
  fn method_inherited_from_superclass_is_found() {
    let mut image = Image::create(ImageConfig::default());
    let name = image.intern_symbol("Widget");
    let widget = image.classes.subclass(image.builtins.object, Some(name), &[]);
    let instance = image.make_instance(widget).unwrap();
    let class_sel = image.intern_symbol("class");
    let result = send(&mut image, instance, class_sel, &[]).unwrap();
    assert_eq!(result, widget.erase());
  }
}

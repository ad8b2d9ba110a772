//! The stack-based bytecode interpreter.
//!
//! `run` drives whatever frame is on top of `Image`'s frame stack until
//! it (and nothing deeper) has returned. A `SENDMSG` to a compiled
//! method hands off to `dispatch::send`, which pushes a new frame and
//! re-enters `run` to execute it to completion before coming back.
//! Ordinary Rust call-stack recursion mirrors the nesting of message
//! sends, the same shape a tree-walking interpreter would use.

use crate::bytecode::{read_u16, read_u32, CodeBlob, Opcode};
use crate::error::{ImageError, Result};
use crate::image::Image;
use crate::oop::Oop;
use std::rc::Rc;

/// `{code_blob_ref, instruction_pointer, base_pointer_into_operand_stack}`.
/// `base` points at the receiver slot dispatch pushed before the
/// arguments, see `dispatch::send`'s doc comment for why.
pub struct Frame {
  pub code: Rc<CodeBlob>,
  pub ip: usize,
  pub base: usize,
}

/// Runs frames until the one at `target_depth` (the depth of
/// `image.frames` before the call this interpreter loop was entered
/// for) has returned, then hands back the value `RETURN` left on the
/// operand stack.
pub fn run(image: &mut Image, target_depth: usize) -> Result<Oop> {
  loop {
    if image.frames.len() <= target_depth {
      return Ok(image.operand_stack.pop().expect("RETURN always leaves exactly one value for its caller"));
    }
    step(image)?;
  }
}

fn current_byte(code: &CodeBlob, ip: usize, offset: usize) -> Result<u8> {
  code
    .instructions
    .get(ip + offset)
    .copied()
    .ok_or(ImageError::UnknownOpcode { offset: ip, byte: 0 })
}

fn step(image: &mut Image) -> Result<()> {
  let frame_index = image.frames.len() - 1;
  let code = image.frames[frame_index].code.clone();
  let ip = image.frames[frame_index].ip;
  let base = image.frames[frame_index].base;

  if ip >= code.instructions.len() {
    // Falling off the end of the instruction stream without an explicit
    // RETURN behaves like an implicit RETURN of nil.
    let nil = image.nil;
    finish_return(image, frame_index, nil);
    return Ok(());
  }

  let byte = code.instructions[ip];
  let opcode = Opcode::from_byte(byte).ok_or(ImageError::UnknownOpcode { offset: ip, byte })?;

  match opcode {
    Opcode::PushNil => {
      image.operand_stack.push(image.nil);
      advance(image, frame_index, 1);
    }
    Opcode::PushTrue => {
      image.operand_stack.push(image.true_obj);
      advance(image, frame_index, 1);
    }
    Opcode::PushFalse => {
      image.operand_stack.push(image.false_obj);
      advance(image, frame_index, 1);
    }
    Opcode::PushSuper => {
      let top = image.operand_stack.pop().expect("PUSHSUPER requires a receiver on the stack");
      let class = image.class_of(top);
      let sup = image.classes.get(class).superclass;
      let result = match sup {
        Some(s) => s.erase(),
        None => image.nil,
      };
      image.operand_stack.push(result);
      advance(image, frame_index, 1);
    }
    Opcode::Dup => {
      let top = *image.operand_stack.last().expect("DUP requires a value on the stack");
      image.operand_stack.push(top);
      advance(image, frame_index, 1);
    }
    Opcode::Pop => {
      image.operand_stack.pop().expect("POP requires a value on the stack");
      advance(image, frame_index, 1);
    }
    Opcode::Swap => {
      let len = image.operand_stack.len();
      image.operand_stack.swap(len - 1, len - 2);
      advance(image, frame_index, 1);
    }
    Opcode::Return => {
      let value = image.operand_stack.pop().expect("RETURN requires a value on the stack");
      finish_return(image, frame_index, value);
    }
    Opcode::GetGlobal => {
      let index = read_u16(&code.instructions, ip + 1);
      let symbol = code.symbol_at(index);
      let value = image.get_global(symbol);
      image.operand_stack.push(value);
      advance(image, frame_index, 3);
    }
    Opcode::SetGlobal => {
      let index = read_u16(&code.instructions, ip + 1);
      let symbol = code.symbol_at(index);
      let value = image.operand_stack.pop().expect("SETGLOBAL requires a value on the stack");
      image.set_global(symbol, value);
      advance(image, frame_index, 3);
    }
    Opcode::GetIvar => {
      let index = read_u16(&code.instructions, ip + 1);
      let object = image.operand_stack.pop().expect("GETIVAR requires an object on the stack");
      let value = image.get_ivar(object, index as u32);
      image.operand_stack.push(value);
      advance(image, frame_index, 3);
    }
    Opcode::SetIvar => {
      let index = read_u16(&code.instructions, ip + 1);
      let object = image.operand_stack.pop().expect("SETIVAR requires an object on the stack");
      let value = image.operand_stack.pop().expect("SETIVAR requires a value on the stack");
      image.set_ivar(object, index as u32, value);
      advance(image, frame_index, 3);
    }
    Opcode::PushSymbol => {
      let index = read_u16(&code.instructions, ip + 1);
      let symbol = code.symbol_at(index);
      image.operand_stack.push(symbol.erase());
      advance(image, frame_index, 3);
    }
    Opcode::SendMsg => {
      // The encoding carries no arg count: that's left to whatever
      // compiler arranges before emitting SENDMSG. Pop whatever count
      // the resolved method itself declares, zero when the selector
      // isn't found at all, since `dispatch::send` builds its own
      // MessageNotUnderstood argument in that case.
      let index = read_u16(&code.instructions, ip + 1);
      let selector = code.symbol_at(index);
      let receiver = image.operand_stack.pop().expect("SENDMSG requires a receiver on the stack");
      advance(image, frame_index, 3);
      let class = image.class_of(receiver);
      let argc = image.classes.lookup(class, selector.erase()).map(|e| e.argc()).unwrap_or(0) as usize;
      let split_at = image.operand_stack.len() - argc;
      let argv = image.operand_stack.split_off(split_at);
      let result = crate::dispatch::send(image, receiver, selector, &argv)?;
      image.operand_stack.push(result);
    }
    Opcode::SetMethod => {
      let index = read_u16(&code.instructions, ip + 1);
      let selector = code.symbol_at(index);
      let argc = current_byte(&code, ip, 3)?;
      let body_length = read_u32(&code.instructions, ip + 4);
      let body_offset = (ip + 8) as u32;
      let target = image.operand_stack.pop().expect("SETMETHOD requires a target class on the stack");
      if let Some(class) = crate::oop::ClassRef::try_from_oop(target) {
        let entry = crate::object::MethodEntry::Compiled { code: code.clone(), offset: body_offset, argc };
        image.classes.set_method(class, selector.erase(), entry);
      }
      advance(image, frame_index, 8 + body_length as usize);
    }
  }
  Ok(())
}

fn advance(image: &mut Image, frame_index: usize, by: usize) {
  image.frames[frame_index].ip += by;
}

/// Shared tail of `RETURN` and falling off the end of a blob: discards
/// locals down to the frame's base, pops the frame, and leaves `value`
/// for the (now current) caller.
fn finish_return(image: &mut Image, frame_index: usize, value: Oop) {
  let base = image.frames[frame_index].base;
  image.operand_stack.truncate(base);
  image.frames.truncate(frame_index);
  image.operand_stack.push(value);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::encode_blob;
  use crate::image::{Image, ImageConfig};

  fn push_and_run(image: &mut Image, instructions: &[u8]) -> Oop {
    push_and_run_with_symbols(image, &[], instructions)
  }

  fn push_and_run_with_symbols(image: &mut Image, symbols: &[&str], instructions: &[u8]) -> Oop {
    let bytes = encode_blob(symbols, instructions);
    let blob = crate::bytecode::load_blob(&bytes, image).unwrap();
    let code = Rc::new(blob);
    let target_depth = image.frames.len();
    image.frames.push(Frame { code, ip: 0, base: image.operand_stack.len() });
    run(image, target_depth).unwrap()
  }

  #[test]
  fn push_nil_then_return() {
    let mut image = Image::create(ImageConfig::default());
    let result = push_and_run(&mut image, &[Opcode::PushNil as u8, Opcode::Return as u8]);
    assert_eq!(result, image.nil);
  }

  #[test]
  fn dup_pop_swap_stack_effects() {
    let mut image = Image::create(ImageConfig::default());
    let result = push_and_run(
      &mut image,
      &[Opcode::PushTrue as u8, Opcode::PushFalse as u8, Opcode::Swap as u8, Opcode::Pop as u8, Opcode::Return as u8],
    );
    assert_eq!(result, image.true_obj);
  }

  #[test]
  fn falling_off_the_end_returns_nil() {
    let mut image = Image::create(ImageConfig::default());
    let result = push_and_run(&mut image, &[]);
    assert_eq!(result, image.nil);
  }

  #[test]
  fn pushsuper_pops_receiver_and_pushes_its_class_superclass() {
    let mut image = Image::create(ImageConfig::default());
    let name = image.intern_symbol("Widget");
    let widget = image.classes.subclass(image.builtins.object, Some(name), &[]);
    let instance = image.make_instance(widget).unwrap();
    let key = image.intern_symbol("it");
    image.set_global(key, instance);

    let result = push_and_run_with_symbols(
      &mut image,
      &["it"],
      &[
        Opcode::GetGlobal as u8,
        0,
        0,
        Opcode::PushSuper as u8,
        Opcode::Return as u8,
      ],
    );
    assert_eq!(result, image.builtins.object.erase());
  }

  #[test]
  fn setglobal_then_getglobal_round_trips() {
    let mut image = Image::create(ImageConfig::default());
    let result = push_and_run_with_symbols(
      &mut image,
      &["myGlobal"],
      &[
        Opcode::PushTrue as u8,
        Opcode::SetGlobal as u8,
        0,
        0,
        Opcode::GetGlobal as u8,
        0,
        0,
        Opcode::Return as u8,
      ],
    );
    assert_eq!(result, image.true_obj);
  }

  #[test]
  fn setivar_then_getivar_round_trips() {
    let mut image = Image::create(ImageConfig::default());
    let x = image.intern_symbol("x");
    let name = image.intern_symbol("Point");
    let point = image.classes.subclass(image.builtins.object, Some(name), &[x]);
    let instance = image.make_instance(point).unwrap();
    let key = image.intern_symbol("obj");
    image.set_global(key, instance);

    let result = push_and_run_with_symbols(
      &mut image,
      &["obj"],
      &[
        // Push the ivar value, then the object (SETIVAR pops object first, then value).
        Opcode::PushTrue as u8,
        Opcode::GetGlobal as u8,
        0,
        0,
        Opcode::SetIvar as u8,
        0,
        0,
        // Read it back.
        Opcode::GetGlobal as u8,
        0,
        0,
        Opcode::GetIvar as u8,
        0,
        0,
        Opcode::Return as u8,
      ],
    );
    assert_eq!(result, image.true_obj);
  }

  #[test]
  fn pushsymbol_pushes_the_interned_symbol() {
    let mut image = Image::create(ImageConfig::default());
    let result = push_and_run_with_symbols(&mut image, &["greeting"], &[Opcode::PushSymbol as u8, 0, 0, Opcode::Return as u8]);
    assert_eq!(result, image.intern_symbol("greeting").erase());
  }

  #[test]
  fn sendmsg_dispatches_a_primitive() {
    let mut image = Image::create(ImageConfig::default());
    let name = image.intern_symbol("Widget");
    let widget = image.classes.subclass(image.builtins.object, Some(name), &[]);
    let instance = image.make_instance(widget).unwrap();
    let key = image.intern_symbol("it");
    image.set_global(key, instance);

    let result = push_and_run_with_symbols(
      &mut image,
      &["it", "class"],
      &[Opcode::GetGlobal as u8, 0, 0, Opcode::SendMsg as u8, 1, 0, Opcode::Return as u8],
    );
    assert_eq!(result, widget.erase());
  }

  #[test]
  fn setmethod_installs_a_compiled_method_invokable_through_send() {
    let mut image = Image::create(ImageConfig::default());
    let name = image.intern_symbol("Greeter");
    let greeter = image.classes.subclass(image.builtins.object, Some(name), &[]);
    let key = image.intern_symbol("TargetClass");
    image.set_global(key, greeter.erase());

    let body = [Opcode::PushTrue as u8, Opcode::Return as u8];
    let mut instructions = vec![Opcode::GetGlobal as u8, 0, 0, Opcode::SetMethod as u8, 1, 0, 0 /* argc */];
    instructions.extend_from_slice(&(body.len() as u32).to_le_bytes());
    instructions.extend_from_slice(&body);
    instructions.push(Opcode::PushNil as u8);
    instructions.push(Opcode::Return as u8);

    push_and_run_with_symbols(&mut image, &["TargetClass", "sayHi"], &instructions);

    let instance = image.make_instance(greeter).unwrap();
    let say_hi = image.intern_symbol("sayHi");
    let result = crate::dispatch::send(&mut image, instance, say_hi, &[]).unwrap();
    assert_eq!(result, image.true_obj);
  }
}

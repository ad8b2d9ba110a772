//! Opcode set and the bit-exact loader format.
//!
//! Opcode numbering is append-only: existing values are never
//! renumbered, so a compiled blob produced against an older opcode set
//! keeps decoding correctly against a newer runtime.

use crate::error::{ImageError, Result};
use crate::image::Image;
use crate::oop::SymbolRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
  PushNil = 0,
  PushTrue = 1,
  PushFalse = 2,
  PushSuper = 3,
  Dup = 4,
  Pop = 5,
  Swap = 6,
  Return = 7,
  GetGlobal = 8,
  SetGlobal = 9,
  GetIvar = 10,
  SetIvar = 11,
  PushSymbol = 12,
  SendMsg = 13,
  SetMethod = 14,
}

impl Opcode {
  pub fn from_byte(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
      0 => PushNil,
      1 => PushTrue,
      2 => PushFalse,
      3 => PushSuper,
      4 => Dup,
      5 => Pop,
      6 => Swap,
      7 => Return,
      8 => GetGlobal,
      9 => SetGlobal,
      10 => GetIvar,
      11 => SetIvar,
      12 => PushSymbol,
      13 => SendMsg,
      14 => SetMethod,
      _ => return None,
    })
  }
}

/// `{symbol_table, instructions, length}`. Immutable once
/// loaded and shared (via `Rc`) by every method that was compiled
/// against it.
pub struct CodeBlob {
  pub symbols: Vec<SymbolRef>,
  pub instructions: Vec<u8>,
}

impl CodeBlob {
  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  pub fn symbol_at(&self, index: u16) -> SymbolRef {
    self.symbols[index as usize]
  }
}

pub fn read_u16(code: &[u8], at: usize) -> u16 {
  u16::from_le_bytes(code[at..at + 2].try_into().unwrap())
}

pub fn read_u32(code: &[u8], at: usize) -> u32 {
  u32::from_le_bytes(code[at..at + 4].try_into().unwrap())
}

/// Parses the bytecode image wire format: a NUL-terminated string table
/// (an extra NUL marks its end), followed by the raw instruction stream
/// running to the end of the buffer. Each symbol is interned to obtain
/// its runtime identity before the blob is considered loaded.
pub fn load_blob(bytes: &[u8], image: &mut Image) -> Result<CodeBlob> {
  let mut i = 0;
  let mut names: Vec<String> = Vec::new();
  loop {
    let start = i;
    while i < bytes.len() && bytes[i] != 0 {
      i += 1;
    }
    if i >= bytes.len() {
      return Err(ImageError::Malformed("symbol table is missing its NUL terminator".into()));
    }
    let raw = &bytes[start..i];
    i += 1; // consume the NUL
    if raw.is_empty() {
      break; // two consecutive NULs: end of table
    }
    let name = std::str::from_utf8(raw).map_err(|_| ImageError::Malformed("symbol table entry is not valid UTF-8".into()))?;
    names.push(name.to_string());
  }

  let symbols = names.iter().map(|n| image.intern_symbol(n)).collect();
  let instructions = bytes[i..].to_vec();
  Ok(CodeBlob { symbols, instructions })
}

/// Serializes `symbols` and `instructions` back into the §6.2 wire
/// format. Exercised by tests that want to round-trip a hand-assembled
/// program through the loader instead of poking a `CodeBlob` directly.
pub fn encode_blob(names: &[&str], instructions: &[u8]) -> Vec<u8> {
  let mut out = Vec::new();
  for name in names {
    out.extend_from_slice(name.as_bytes());
    out.push(0);
  }
  out.push(0); // terminator
  out.extend_from_slice(instructions);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_then_parse_symbol_table() {
    let bytes = encode_blob(&["foo", "bar"], &[Opcode::PushNil as u8, Opcode::Return as u8]);
    let mut i = 0;
    let mut names = Vec::new();
    loop {
      let start = i;
      while bytes[i] != 0 {
        i += 1;
      }
      let raw = &bytes[start..i];
      i += 1;
      if raw.is_empty() {
        break;
      }
      names.push(std::str::from_utf8(raw).unwrap().to_string());
    }
    assert_eq!(names, vec!["foo", "bar"]);
    assert_eq!(&bytes[i..], &[Opcode::PushNil as u8, Opcode::Return as u8]);
  }
}

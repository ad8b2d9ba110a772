use std::error::Error as StdError;
use std::fmt::{self, Display};

pub type Result<T, E = ImageError> = std::result::Result<T, E>;

/// Fatal and host-facing error conditions.
///
/// Most in-VM failures (bad arity, out-of-bounds index) are *not*
/// represented here: those are defined as nil-producing, not
/// exceptional, so they never reach this type.
#[derive(Debug)]
pub enum ImageError {
  /// The heap could not satisfy a pending allocation even after a GC cycle.
  AllocatorExhausted { requested: usize, available: usize },
  /// The interpreter encountered a byte that does not name a known opcode.
  UnknownOpcode { offset: usize, byte: u8 },
  /// Method lookup failed for `doesNotUnderstand:` itself.
  MessageNotUnderstoodUnhandled,
  /// The bytecode image format was malformed.
  Malformed(String),
}

impl Display for ImageError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ImageError::AllocatorExhausted { requested, available } => write!(
        f,
        "allocator exhausted: requested {requested} bytes, {available} available after gc"
      ),
      ImageError::UnknownOpcode { offset, byte } => {
        write!(f, "unknown opcode 0x{byte:02x} at instruction offset {offset}")
      }
      ImageError::MessageNotUnderstoodUnhandled => {
        write!(f, "doesNotUnderstand: is itself not understood")
      }
      ImageError::Malformed(msg) => write!(f, "malformed bytecode image: {msg}"),
    }
  }
}

impl StdError for ImageError {}

//! Wire-level pieces of the MicroPython raw REPL protocol.
//!
//! Nothing in this crate performs I/O. It holds the control sequences and
//! prompts the device firmware expects bit-for-bit, the receive-side
//! [`Accumulator`], and the builders that turn file operations into Python
//! source suitable for raw-mode execution.

mod buffer;
mod control;
mod literal;
pub mod script;

pub use buffer::{Accumulator, find_marker};
pub use control::{
    CHUNK_DELAY_MS, CHUNK_SIZE, DEFAULT_BAUD, DEFAULT_MARKER, ENTER_RAW, EXECUTE, EXIT_RAW,
    FRIENDLY_PROMPT, INTERRUPT, RAW_PROMPT,
};
pub use literal::{LiteralError, decode_literal, encode_literal};

//! Control bytes, prompts and transfer constants.

/// Carriage return followed by two Ctrl-C: stops a running program.
pub const INTERRUPT: &[u8] = &[0x0d, 0x03, 0x03];

/// Carriage return followed by Ctrl-A: enters raw REPL mode.
pub const ENTER_RAW: &[u8] = &[0x0d, 0x01];

/// Carriage return followed by Ctrl-B: leaves raw REPL mode.
pub const EXIT_RAW: &[u8] = &[0x0d, 0x02];

/// Ctrl-D: executes the buffered command in raw mode (soft reset otherwise).
pub const EXECUTE: &[u8] = &[0x04];

/// Prompt printed by the friendly REPL.
pub const FRIENDLY_PROMPT: &str = ">>> ";

/// Prompt printed once raw mode is active.
pub const RAW_PROMPT: &str = ">";

/// Completion marker printed after every executed command.
pub const DEFAULT_MARKER: &str = "CGLI5wxheI";

/// Largest slice written to the device in one go.
///
/// The raw REPL input buffer on small boards overflows well below 1 KiB.
pub const CHUNK_SIZE: usize = 256;

/// Pause between two chunks, in milliseconds.
pub const CHUNK_DELAY_MS: u64 = 10;

/// Baud rate of the MicroPython REPL on ESP32 class boards.
pub const DEFAULT_BAUD: u32 = 115_200;

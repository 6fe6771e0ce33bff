//! Python bytes-literal encoding.
//!
//! [`encode_literal`] renders arbitrary bytes as the body of a single-quoted
//! `b'...'` literal. [`decode_literal`] applies Python's escape rules to such
//! a body and is the exact inverse for every byte value.

use std::fmt::Write as _;

/// Errors from [`decode_literal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LiteralError {
    /// Bytes literals may only contain ASCII characters.
    #[error("non-ASCII character {0:?} in bytes literal")]
    NonAscii(char),

    /// The literal ends in the middle of an escape sequence.
    #[error("truncated escape sequence at offset {0}")]
    Truncated(usize),

    /// A `\x` escape is not followed by two hex digits.
    #[error("invalid \\x escape at offset {0}")]
    BadHex(usize),
}

/// Encodes `bytes` as the body of a single-quoted Python bytes literal.
///
/// Printable ASCII is emitted as-is except `'` and `\`, which get a
/// backslash. Every other byte becomes a lowercase `\xHH` escape.
pub fn encode_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\'' | b'\\' => {
                out.push('\\');
                out.push(char::from(b));
            }
            32..=126 => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

/// Decodes the body of a Python bytes literal.
///
/// Supports the escapes Python recognises in bytes literals: `\\`, `\'`,
/// `\"`, `\a`, `\b`, `\f`, `\n`, `\r`, `\t`, `\v`, `\xHH`, octal `\ooo` and
/// backslash-newline continuation. Unknown escapes keep their backslash.
pub fn decode_literal(text: &str) -> Result<Vec<u8>, LiteralError> {
    if let Some(c) = text.chars().find(|c| !c.is_ascii()) {
        return Err(LiteralError::NonAscii(c));
    }
    let src = text.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let b = src[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = *src.get(i + 1).ok_or(LiteralError::Truncated(i))?;
        i += 2;
        match esc {
            b'\n' => {}
            b'\\' | b'\'' | b'"' => out.push(esc),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'x' => {
                let digits = src
                    .get(i..i + 2)
                    .filter(|d| d.iter().all(u8::is_ascii_hexdigit))
                    .ok_or(LiteralError::BadHex(i - 2))?;
                out.push((hex_value(digits[0]) << 4) | hex_value(digits[1]));
                i += 2;
            }
            b'0'..=b'7' => {
                let mut v = u32::from(esc - b'0');
                for _ in 0..2 {
                    match src.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            v = v * 8 + u32::from(d - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                // Python keeps the low byte of octal escapes above 0o377.
                out.push(v.to_le_bytes()[0]);
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

/// Value of an ASCII hex digit already known to be valid.
const fn hex_value(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        _ => d - b'A' + 10,
    }
}

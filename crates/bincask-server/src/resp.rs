//! Wire protocol framing
//!
//! Clients send commands as length-prefixed arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
//! ```
//!
//! Replies use simple strings (`+OK`), bulk strings (`$5\r\nvalue\r\n`),
//! the nil bulk (`$-1\r\n`), integers (`:1\r\n`), and errors (`-ERR ...`).
//!
//! The parser is incremental: it consumes nothing from the buffer until a
//! complete command is available, so frames may arrive split across any
//! number of TCP segments.

use std::fmt;

use bytes::{Buf, BytesMut};

/// Upper bound on elements in one command array
const MAX_ARRAY_LEN: usize = 16;

/// Upper bound on a single bulk string payload (64 MiB)
const MAX_BULK_LEN: usize = 64 * 1024 * 1024;

/// A protocol violation. The connection is closed after reporting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameError(pub String);

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FrameError {}

fn invalid(message: impl Into<String>) -> FrameError {
    FrameError(message.into())
}

/// Find the next CRLF-terminated line starting at `pos`.
/// Returns the line (without CRLF) and the position just past it.
fn read_line(src: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = &src[pos..];
    let newline = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..newline], pos + newline + 2))
}

fn parse_int(digits: &[u8], what: &str) -> Result<i64, FrameError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid(format!("invalid {} length", what)))
}

/// Try to parse one complete command from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed (the buffer is untouched),
/// `Ok(Some(parts))` after consuming a full command, or `Err` on a protocol
/// violation.
pub fn parse_command(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, FrameError> {
    let src: &[u8] = &buf[..];

    let Some((line, mut pos)) = read_line(src, 0) else {
        return Ok(None);
    };
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array header"));
    }
    let count = parse_int(&line[1..], "array")?;
    if count < 1 || count as usize > MAX_ARRAY_LEN {
        return Err(invalid(format!("array length {} out of range", count)));
    }

    let mut parts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some((line, next)) = read_line(src, pos) else {
            return Ok(None);
        };
        pos = next;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk string header"));
        }
        let len = parse_int(&line[1..], "bulk string")?;
        if len < 0 || len as usize > MAX_BULK_LEN {
            return Err(invalid(format!("bulk string length {} out of range", len)));
        }
        let len = len as usize;

        if src.len() < pos + len + 2 {
            return Ok(None);
        }
        if &src[pos + len..pos + len + 2] != b"\r\n" {
            return Err(invalid("bulk string missing terminator"));
        }
        parts.push(src[pos..pos + len].to_vec());
        pos += len + 2;
    }

    buf.advance(pos);
    Ok(Some(parts))
}

/// `+OK\r\n`
pub fn ok() -> &'static [u8] {
    b"+OK\r\n"
}

/// `$-1\r\n` — the nil bulk string, used for absent keys
pub fn nil() -> &'static [u8] {
    b"$-1\r\n"
}

/// `$<len>\r\n<value>\r\n`
pub fn bulk(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 16);
    out.extend_from_slice(format!("${}\r\n", value.len()).as_bytes());
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    out
}

/// `:<n>\r\n`
pub fn integer(n: i64) -> Vec<u8> {
    format!(":{}\r\n", n).into_bytes()
}

/// `-ERR <message>\r\n`
pub fn error(message: &str) -> Vec<u8> {
    // Strip CR/LF so the reply stays a single protocol line.
    let clean: String = message.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    format!("-ERR {}\r\n", clean).into_bytes()
}

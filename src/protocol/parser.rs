//! Incremental RESP Frame Decoder
//!
//! The decoder walks the buffer by declared lengths: for a bulk string it
//! reads the `$<len>` header and then takes exactly `len` bytes, whatever
//! they contain. Payloads holding spaces, digits, NUL bytes or even CRLF
//! pairs decode correctly.
//!
//! ## Outcomes
//!
//! - `Ok(Some((value, consumed)))` - one complete frame, `consumed` bytes used
//! - `Ok(None)` - the frame is not complete yet, read more bytes and retry
//! - `Err(ParseError)` - the bytes can never form a valid frame
//!
//! Keeping "incomplete" apart from "malformed" lets the connection handler
//! buffer TCP data that arrives split across reads.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Leading byte is not one of `+ - $ *`
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A length or count header is not a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null) or above the limit
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Structural violation (missing CRLF, bad element type, ...)
    #[error("{0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A complete frame that carries no command name
    #[error("empty command")]
    EmptyCommand,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array frame
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a `+ - $ *` line before its CRLF (64 KB, same as Redis)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A RESP frame decoder.
///
/// # Example
///
/// ```
/// use emberkv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (frame, consumed) = parser
///     .parse(b"*1\r\n$4\r\nPING\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(consumed, 14);
/// assert!(frame.as_bytes().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to decode one frame from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(parse_line(buf)?
                .map(|(line, consumed)| (RespValue::SimpleString(line.to_string()), consumed))),
            prefix::ERROR => Ok(parse_line(buf)?
                .map(|(line, consumed)| (RespValue::Error(line.to_string()), consumed))),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (length, header_len) = match parse_header(buf)? {
            Some(h) => h,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header_len + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, header_len) = match parse_header(buf)? {
            Some(h) => h,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if count < 0 || count as usize > MAX_ARRAY_LEN {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(64));
        let mut consumed = header_len;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads a `<prefix><text>\r\n` line, returning the text and bytes consumed.
///
/// Only the first `MAX_LINE_LEN + 2` bytes after the prefix are scanned, so
/// re-parsing an unterminated line on every read stays bounded.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let window = &buf[1..buf.len().min(1 + MAX_LINE_LEN + 2)];
    match find_crlf(window) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + 2)))
        }
        None if window.len() == MAX_LINE_LEN + 2 => Err(ParseError::ProtocolError(format!(
            "line exceeds {} bytes without CRLF",
            MAX_LINE_LEN
        ))),
        None => Ok(None),
    }
}

/// Reads a `<prefix><integer>\r\n` header used by bulk strings and arrays.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let (line, consumed) = match parse_line(buf)? {
        Some(l) => l,
        None => return Ok(None),
    };
    let n = line
        .parse::<i64>()
        .map_err(|e| ParseError::InvalidInteger(format!("{:?}: {}", line, e)))?;
    Ok(Some((n, consumed)))
}

/// Position of the first `\r` of a CRLF pair.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single RESP frame from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

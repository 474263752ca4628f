//! Request Decoding
//!
//! Turns a decoded frame into a [`Command`]: the first array element is the
//! command name, the rest are its arguments in order.

use crate::protocol::parser::{ParseError, ParseResult, RespParser};
use crate::protocol::types::RespValue;
use bytes::Bytes;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name exactly as sent; matched case-insensitively
    pub name: String,
    /// Arguments in the order they were sent
    pub args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Builds a command from a request frame.
    ///
    /// The frame must be a non-empty array of bulk strings whose first
    /// element is valid UTF-8. A one-element array yields no arguments.
    pub fn from_frame(frame: RespValue) -> ParseResult<Self> {
        let elements = match frame {
            RespValue::Array(elements) => elements,
            other => {
                return Err(ParseError::ProtocolError(format!(
                    "expected array of bulk strings, got {}",
                    kind(&other)
                )))
            }
        };

        let mut parts = elements.into_iter().map(|element| match element {
            RespValue::BulkString(data) => Ok(data),
            other => Err(ParseError::ProtocolError(format!(
                "expected bulk string, got {}",
                kind(&other)
            ))),
        });

        let name = match parts.next() {
            Some(first) => first?,
            None => return Err(ParseError::EmptyCommand),
        };
        let name = std::str::from_utf8(&name)
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?
            .to_string();
        if name.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        let args = parts.collect::<ParseResult<Vec<Bytes>>>()?;
        Ok(Self { name, args })
    }

    /// True if this command's name equals `name`, ignoring ASCII case.
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

fn kind(value: &RespValue) -> &'static str {
    match value {
        RespValue::SimpleString(_) => "simple string",
        RespValue::Error(_) => "error",
        RespValue::BulkString(_) => "bulk string",
        RespValue::Null => "null",
        RespValue::Array(_) => "array",
    }
}

/// Decodes one command from the start of `buf`.
///
/// Returns `Ok(None)` while the frame is incomplete, and the number of
/// bytes consumed once a command is available.
///
/// ```
/// use bytes::Bytes;
/// use emberkv::protocol::decode_command;
///
/// let (cmd, consumed) = decode_command(b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n")
///     .unwrap()
///     .unwrap();
/// assert!(cmd.is("echo"));
/// assert_eq!(cmd.args, vec![Bytes::from("hello")]);
/// assert_eq!(consumed, 25);
/// ```
pub fn decode_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    match RespParser::new().parse(buf)? {
        Some((frame, consumed)) => Ok(Some((Command::from_frame(frame)?, consumed))),
        None => Ok(None),
    }
}

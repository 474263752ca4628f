//! RESP Protocol Implementation
//!
//! The request/response subset this server speaks.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and reply encoding
//! - `parser`: incremental, length-prefixed frame decoder
//! - `command`: turns a request frame into a `Command`
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{decode_command, RespValue};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (command, consumed) = decode_command(data).unwrap().unwrap();
//! assert!(command.is("GET"));
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string("Ariz");
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::{decode_command, Command};
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;

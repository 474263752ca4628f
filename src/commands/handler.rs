//! Command Handler
//!
//! Maps a decoded [`Command`] to its behavior, runs it against the
//! [`StorageEngine`] and builds the reply.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - `+PONG`, or the message as a bulk string
//! - `ECHO message` - the message as a bulk string
//! - `SET key value [EX seconds | PX milliseconds]` - `+OK`
//! - `GET key` - the stored value, or the null bulk string
//!
//! Names are matched case-insensitively. Every command gets exactly one
//! reply: wrong arity, bad options and unknown names all produce an
//! error reply instead of silence, and none of them touch the store.

use crate::protocol::{Command, ParseError, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Dispatches commands against the shared store.
///
/// Cheap to clone; each connection owns one.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply to send back.
    pub fn execute(&self, command: Command) -> RespValue {
        let args = command.args.as_slice();

        if command.is("PING") {
            self.cmd_ping(args)
        } else if command.is("ECHO") {
            self.cmd_echo(args)
        } else if command.is("SET") {
            self.cmd_set(args)
        } else if command.is("GET") {
            self.cmd_get(args)
        } else {
            debug!(command = ?command.name, "Unknown command");
            RespValue::error(format!(
                "ERR unknown command '{}'",
                printable(&command.name)
            ))
        }
    }

    /// Reply for a request that could not be decoded into a command.
    pub fn reject(&self, error: &ParseError) -> RespValue {
        RespValue::error(format!("ERR Protocol error: {}", error))
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [message] => RespValue::bulk_string(message.clone()),
            _ => wrong_arity("ping"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        match args {
            [message] => RespValue::bulk_string(message.clone()),
            _ => wrong_arity("echo"),
        }
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return wrong_arity("set"),
        };

        let ttl = match options {
            [] => None,
            [unit, amount] => {
                let amount = match std::str::from_utf8(amount)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    Some(n) if n > 0 => n,
                    _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                };
                if unit.eq_ignore_ascii_case(b"EX") {
                    Some(Duration::from_secs(amount))
                } else if unit.eq_ignore_ascii_case(b"PX") {
                    Some(Duration::from_millis(amount))
                } else {
                    return RespValue::error("ERR syntax error");
                }
            }
            _ => return RespValue::error("ERR syntax error"),
        };

        match ttl {
            Some(ttl) => self.storage.set_with_ttl(key.clone(), value.clone(), ttl),
            None => self.storage.set(key.clone(), value.clone()),
        };
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        match args {
            [key] => match self.storage.get(key) {
                Some(entry) => RespValue::bulk_string(entry.value),
                None => RespValue::null(),
            },
            _ => wrong_arity("get"),
        }
    }
}

/// Client-supplied text quoted in an error line, with control characters
/// replaced by spaces.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn wrong_arity(name: &str) -> RespValue {
    debug!(command = name, "Wrong number of arguments");
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_command, parse_message};

    fn create_handler() -> (CommandHandler, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        (CommandHandler::new(Arc::clone(&storage)), storage)
    }

    fn make_command(args: &[&str]) -> Command {
        Command::new(
            args[0],
            args[1..]
                .iter()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_ping() {
        let (handler, _) = create_handler();

        let response = handler.execute(make_command(&["PING"]));
        assert_eq!(response.serialize(), b"+PONG\r\n");

        let response = handler.execute(make_command(&["PING", "hello"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_case_insensitive() {
        let (handler, _) = create_handler();

        assert_eq!(handler.execute(make_command(&["ping"])), RespValue::pong());
        assert_eq!(handler.execute(make_command(&["PiNg"])), RespValue::pong());
        assert_eq!(
            handler.execute(make_command(&["set", "k", "v"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(make_command(&["gEt", "k"])),
            RespValue::bulk_string("v")
        );
    }

    #[test]
    fn test_echo() {
        let (handler, _) = create_handler();

        let response = handler.execute(make_command(&["ECHO", "hello"]));
        assert_eq!(response.serialize(), b"$5\r\nhello\r\n");

        let response = handler.execute(make_command(&["ECHO", "hello world 42"]));
        assert_eq!(response, RespValue::bulk_string("hello world 42"));
    }

    #[test]
    fn test_echo_wrong_arity() {
        let (handler, _) = create_handler();

        for cmd in [&["ECHO"][..], &["ECHO", "a", "b"][..]] {
            assert_eq!(
                handler.execute(make_command(cmd)),
                RespValue::error("ERR wrong number of arguments for 'echo' command")
            );
        }
    }

    #[test]
    fn test_set_get() {
        let (handler, storage) = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let (handler, _) = create_handler();

        handler.execute(make_command(&["SET", "key", "v1"]));
        handler.execute(make_command(&["SET", "key", "v2"]));
        assert_eq!(
            handler.execute(make_command(&["GET", "key"])),
            RespValue::bulk_string("v2")
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let (handler, _) = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_set_wrong_arity_leaves_store_untouched() {
        let (handler, storage) = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "key"])),
            RespValue::error("ERR wrong number of arguments for 'set' command")
        );
        assert_eq!(
            handler.execute(make_command(&["SET"])),
            RespValue::error("ERR wrong number of arguments for 'set' command")
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_get_wrong_arity() {
        let (handler, _) = create_handler();

        assert_eq!(
            handler.execute(make_command(&["GET"])),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert!(handler.execute(make_command(&["GET", "a", "b"])).is_error());
    }

    #[test]
    fn test_set_with_expiry_records_ttl() {
        let (handler, storage) = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "s", "v", "EX", "60"])),
            RespValue::ok()
        );
        assert_eq!(storage.peek(b"s").unwrap().ttl, Some(Duration::from_secs(60)));

        assert_eq!(
            handler.execute(make_command(&["SET", "p", "v", "px", "1500"])),
            RespValue::ok()
        );
        assert_eq!(
            storage.peek(b"p").unwrap().ttl,
            Some(Duration::from_millis(1500))
        );

        // A plain SET keeps the recorded TTL
        handler.execute(make_command(&["SET", "s", "w"]));
        assert_eq!(storage.peek(b"s").unwrap().ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_set_bad_options() {
        let (handler, storage) = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "EX", "0"])),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "EX", "soon"])),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "XX", "10"])),
            RespValue::error("ERR syntax error")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "EX"])),
            RespValue::error("ERR syntax error")
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let (handler, storage) = create_handler();

        let response = handler.execute(make_command(&["FOO", "bar"]));
        assert_eq!(response.serialize(), b"-ERR unknown command 'FOO'\r\n");
        assert!(storage.is_empty());
        assert_eq!(storage.stats().set_ops, 0);
    }

    #[test]
    fn test_unknown_command_with_crlf_in_name_is_one_reply() {
        let (handler, storage) = create_handler();

        let request = RespValue::command(&["FOO\r\n+OK"]).serialize();
        let (command, _) = decode_command(&request).unwrap().unwrap();
        let wire = handler.execute(command).serialize();
        assert_eq!(wire, b"-ERR unknown command 'FOO  +OK'\r\n");

        // The client sees exactly one frame and nothing left over
        let (frame, consumed) = parse_message(&wire).unwrap().unwrap();
        assert!(frame.is_error());
        assert_eq!(consumed, wire.len());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_unknown_command_control_bytes_replaced() {
        let (handler, _) = create_handler();

        let response = handler.execute(make_command(&["A\tB\x00C"]));
        assert_eq!(response, RespValue::error("ERR unknown command 'A B C'"));
    }

    #[test]
    fn test_reject() {
        let (handler, _) = create_handler();

        let response = handler.reject(&ParseError::EmptyCommand);
        assert_eq!(response.serialize(), b"-ERR Protocol error: empty command\r\n");
    }
}

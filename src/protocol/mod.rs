//! Client Protocol Module
//!
//! The line-oriented text protocol spoken between clients and storage nodes.
//!
//! ## Format
//! - One request per line: `get <key>[ <pw>]`, `put <key> <hexValue>[ <pw>]`,
//!   `delete <key>[ <pw>]`, `keyrange`, `keyrange_read`.
//! - One response line per request. Values travel hex-encoded so arbitrary bytes (including
//!   whitespace and newlines) survive the line framing.
//! - Control responses (`server_stopped`, `server_write_lock`, `server_not_responsible`) may
//!   answer any request.
//!
//! Keys and values are size-bounded; clients reject oversized input before sending.

pub mod request;
pub mod response;

pub use request::Request;
pub use response::Response;

use thiserror::Error;

/// Longest accepted key, in bytes.
pub const KEY_MAX_BYTES: usize = 20;
/// Largest accepted value, in bytes (before hex encoding).
pub const VALUE_MAX_BYTES: usize = 120 * 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{command}': {found}")]
    Arity { command: String, found: usize },

    #[error("invalid hex payload: {0}")]
    Hex(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("value of {0} bytes exceeds the {max} byte limit", max = VALUE_MAX_BYTES)]
    ValueTooLarge(usize),

    #[error("value is empty")]
    EmptyValue,

    #[error("unexpected response '{0}'")]
    UnexpectedResponse(String),
}

pub fn validate_key(key: &str) -> Result<(), ProtocolError> {
    if key.is_empty() {
        return Err(ProtocolError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > KEY_MAX_BYTES {
        return Err(ProtocolError::InvalidKey(format!(
            "key is {} bytes, at most {} allowed",
            key.len(),
            KEY_MAX_BYTES
        )));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidKey(
            "key must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_value(value: &[u8]) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::EmptyValue);
    }
    if value.len() > VALUE_MAX_BYTES {
        return Err(ProtocolError::ValueTooLarge(value.len()));
    }
    Ok(())
}

fn decode_hex(payload: &str) -> Result<Vec<u8>, ProtocolError> {
    hex::decode(payload).map_err(|e| ProtocolError::Hex(e.to_string()))
}

use std::fmt;

use super::{ProtocolError, decode_hex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    GetSuccess { key: String, value: Vec<u8> },
    GetError { key: String },
    PutSuccess { key: String },
    PutUpdate { key: String },
    PutError { key: String, reason: String },
    DeleteSuccess { key: String },
    DeleteError { key: String },
    KeyRange(String),
    KeyRangeRead(String),
    InvalidPassword,
    ServerStopped,
    ServerWriteLock,
    ServerNotResponsible,
    /// Request could not be understood.
    Error(String),
}

impl Response {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let (token, rest) = line.split_once(' ').unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();
        let unexpected = || ProtocolError::UnexpectedResponse(line.to_string());
        let key = || args.first().map(|k| k.to_string()).ok_or_else(unexpected);

        let response = match (token, args.len()) {
            ("get_success", 2) => Response::GetSuccess {
                key: key()?,
                value: decode_hex(args[1])?,
            },
            ("get_error", 1) => Response::GetError { key: key()? },
            ("put_success", 1) => Response::PutSuccess { key: key()? },
            ("put_update", 1) => Response::PutUpdate { key: key()? },
            ("put_error", 2) => Response::PutError {
                key: key()?,
                reason: String::from_utf8_lossy(&decode_hex(args[1])?).into_owned(),
            },
            ("delete_success", 1) => Response::DeleteSuccess { key: key()? },
            ("delete_error", 1) => Response::DeleteError { key: key()? },
            ("keyrange_success", 1) => Response::KeyRange(args[0].to_string()),
            ("keyrange_read_success", 1) => Response::KeyRangeRead(args[0].to_string()),
            ("invalid_password", 0) => Response::InvalidPassword,
            ("server_stopped", 0) => Response::ServerStopped,
            ("server_write_lock", 0) => Response::ServerWriteLock,
            ("server_not_responsible", 0) => Response::ServerNotResponsible,
            ("error", _) => Response::Error(rest.trim().to_string()),
            _ => return Err(unexpected()),
        };
        Ok(response)
    }

    /// Responses that mean "try the same request again later".
    pub fn is_transient(&self) -> bool {
        matches!(self, Response::ServerStopped | Response::ServerWriteLock)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::GetSuccess { key, value } => {
                write!(f, "get_success {} {}", key, hex::encode(value))
            }
            Response::GetError { key } => write!(f, "get_error {}", key),
            Response::PutSuccess { key } => write!(f, "put_success {}", key),
            Response::PutUpdate { key } => write!(f, "put_update {}", key),
            Response::PutError { key, reason } => {
                write!(f, "put_error {} {}", key, hex::encode(reason.as_bytes()))
            }
            Response::DeleteSuccess { key } => write!(f, "delete_success {}", key),
            Response::DeleteError { key } => write!(f, "delete_error {}", key),
            Response::KeyRange(wire) => write!(f, "keyrange_success {}", wire),
            Response::KeyRangeRead(wire) => write!(f, "keyrange_read_success {}", wire),
            Response::InvalidPassword => write!(f, "invalid_password"),
            Response::ServerStopped => write!(f, "server_stopped"),
            Response::ServerWriteLock => write!(f, "server_write_lock"),
            Response::ServerNotResponsible => write!(f, "server_not_responsible"),
            Response::Error(message) => write!(f, "error {}", message),
        }
    }
}

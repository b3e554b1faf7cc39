use std::fmt;

use super::{ProtocolError, decode_hex, validate_key, validate_value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get {
        key: String,
        password: Option<String>,
    },
    Put {
        key: String,
        value: Vec<u8>,
        password: Option<String>,
    },
    Delete {
        key: String,
        password: Option<String>,
    },
    KeyRange,
    KeyRangeRead,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else {
            return Err(ProtocolError::Empty);
        };
        let arity = || ProtocolError::Arity {
            command: command.to_string(),
            found: args.len(),
        };
        let password = |index: usize| args.get(index).map(|p| p.to_string());

        let request = match *command {
            "get" if (1..=2).contains(&args.len()) => Request::Get {
                key: args[0].to_string(),
                password: password(1),
            },
            "put" if (2..=3).contains(&args.len()) => {
                let value = decode_hex(args[1])?;
                validate_value(&value)?;
                Request::Put {
                    key: args[0].to_string(),
                    value,
                    password: password(2),
                }
            }
            "delete" if (1..=2).contains(&args.len()) => Request::Delete {
                key: args[0].to_string(),
                password: password(1),
            },
            "keyrange" if args.is_empty() => Request::KeyRange,
            "keyrange_read" if args.is_empty() => Request::KeyRangeRead,
            "get" | "put" | "delete" | "keyrange" | "keyrange_read" => return Err(arity()),
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        if let Some(key) = request.key() {
            validate_key(key)?;
        }
        Ok(request)
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Request::Get { key, .. } | Request::Put { key, .. } | Request::Delete { key, .. } => {
                Some(key)
            }
            Request::KeyRange | Request::KeyRangeRead => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Request::Put { .. } | Request::Delete { .. })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { key, password } => {
                write!(f, "get {}", key)?;
                write_password(f, password)
            }
            Request::Put {
                key,
                value,
                password,
            } => {
                write!(f, "put {} {}", key, hex::encode(value))?;
                write_password(f, password)
            }
            Request::Delete { key, password } => {
                write!(f, "delete {}", key)?;
                write_password(f, password)
            }
            Request::KeyRange => write!(f, "keyrange"),
            Request::KeyRangeRead => write!(f, "keyrange_read"),
        }
    }
}

fn write_password(f: &mut fmt::Formatter<'_>, password: &Option<String>) -> fmt::Result {
    match password {
        Some(password) => write!(f, " {}", password),
        None => Ok(()),
    }
}

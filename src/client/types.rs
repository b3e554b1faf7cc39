use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::ring::RingError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Every node in the ring in use failed to accept a connection.
    #[error("no reachable storage node")]
    NoReachableNode,

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cluster kept redirecting the request ({0} ring refreshes)")]
    TooManyRedirects(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetReply {
    Found(Vec<u8>),
    NotFound,
    PasswordRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutReply {
    Created,
    Updated,
    /// The node accepted the request but could not store it.
    Failed(String),
    PasswordRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReply {
    Deleted,
    NotFound,
    PasswordRequired,
}

/// Whether the last response asked for a password, and how many times in a row it has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordChallenge {
    pub pending: bool,
    pub attempts: u32,
}

impl PasswordChallenge {
    pub(crate) fn record(&mut self) {
        self.pending = true;
        self.attempts = self.attempts.saturating_add(1);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

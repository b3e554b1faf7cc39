use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerStatus {
    /// No ring installed yet, or shutting down.
    Stopped = 0,
    Active = 1,
    /// Hand-off in progress: reads are served, writes are refused.
    WriteLock = 2,
}

/// Status shared between the listener tasks and the rebalancer.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: ServerStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> ServerStatus {
        match self.0.load(Ordering::Acquire) {
            1 => ServerStatus::Active,
            2 => ServerStatus::WriteLock,
            _ => ServerStatus::Stopped,
        }
    }

    pub fn set(&self, status: ServerStatus) {
        let previous = self.0.swap(status as u8, Ordering::AcqRel);
        if previous != status as u8 {
            tracing::info!("Server status: {:?}", status);
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ServerStatus::Stopped)
    }
}

use rand::Rng;
use std::time::Duration;

/// Upper bound of any single backoff delay, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 1024;

/// Delay before retry number `attempt` (starting at 0): uniform in
/// `[0, min(1024, 2^attempt))` milliseconds.
pub fn backoff_delay<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let ceiling = 1u64
        .checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(rng.gen_range(0..ceiling))
}

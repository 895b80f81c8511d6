use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source for signal timestamps. Signals cross process boundaries,
/// so they are stamped with unix milliseconds rather than a monotonic instant.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
pub(crate) use self::manual::ManualClock;

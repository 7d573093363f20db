use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// A [`Duration`] that can be updated and read concurrently.
///
/// Stored as whole nanoseconds in a single `AtomicU64`, which bounds
/// representable values to roughly 584 years. Used for runtime-tunable
/// timeouts shared between client handles and their background pipeline.
pub(crate) struct AtomicDuration(AtomicU64);

impl AtomicDuration {
    pub(crate) fn new(duration: Duration) -> Self {
        Self(AtomicU64::new(Self::to_nanos(duration)))
    }

    pub(crate) fn store(&self, duration: Duration, order: Ordering) {
        self.0.store(Self::to_nanos(duration), order);
    }

    pub(crate) fn load(&self, order: Ordering) -> Duration {
        Duration::from_nanos(self.0.load(order))
    }

    fn to_nanos(duration: Duration) -> u64 {
        u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
    }
}

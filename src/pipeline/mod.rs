use std::sync::LazyLock;

pub(crate) mod flush;
pub(super) mod ringbuf;

/// Monotonic reference instant for all deadline math in the flush loop.
///
/// Cycle timing is computed as elapsed time since this epoch, immune to
/// wall-clock adjustments.
pub(super) static LOCAL_EPOCH: LazyLock<quanta::Instant> = LazyLock::new(quanta::Instant::now);

/// Headroom subtracted from the send buffer size when sizing the
/// transmission buffer, leaving room for the request envelope.
pub(crate) const BUFFER_HEADROOM: usize = 512;

fn env_limit(var: &str, default: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Send buffer size in bytes. Tunable via `FLUXLINE_SEND_BUFFER_SIZE`;
/// defaults to 1 MiB.
pub(crate) fn send_buffer_size() -> usize {
    static SIZE: LazyLock<usize> = LazyLock::new(|| env_limit("FLUXLINE_SEND_BUFFER_SIZE", 1024 * 1024));
    *SIZE
}

/// Maximum size of a single serialized point in bytes. Tunable via
/// `FLUXLINE_MAX_POINT_SIZE`; defaults to 32 KiB.
pub(crate) fn max_point_size() -> usize {
    static SIZE: LazyLock<usize> = LazyLock::new(|| env_limit("FLUXLINE_MAX_POINT_SIZE", 32 * 1024));
    *SIZE
}

use std::time::Duration;

/// Relay tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum bytes read from either side per readiness event
    pub chunk_size: usize,
    /// Upper bound on one poll wait; also the child-exit and resize check period
    pub poll_interval: Duration,
    /// Consecutive I/O failures tolerated per direction before giving up
    pub max_io_errors: u32,
    /// PTY rows when the user's terminal size is unknown
    pub fallback_rows: u16,
    /// PTY columns when the user's terminal size is unknown
    pub fallback_cols: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * 1024,
            poll_interval: Duration::from_millis(50),
            max_io_errors: 3,
            fallback_rows: 24,
            fallback_cols: 80,
        }
    }
}

impl RelayConfig {
    /// Largest read buffer the relay will allocate
    pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

    /// Read buffer length: `chunk_size` kept within `1..=MAX_CHUNK_SIZE`
    pub(crate) fn buffer_len(&self) -> usize {
        self.chunk_size.clamp(1, Self::MAX_CHUNK_SIZE)
    }

    /// Poll timeout in milliseconds, clamped to what `poll(2)` accepts
    pub(crate) fn poll_timeout_ms(&self) -> u16 {
        u16::try_from(self.poll_interval.as_millis()).unwrap_or(u16::MAX)
    }
}

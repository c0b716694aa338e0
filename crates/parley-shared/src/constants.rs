/// Delay before the first reconnection attempt after an unexpected closure.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on the exponential reconnect backoff.
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Two timestamps within this window can describe the same logical message.
///
/// The optimistic local clock and the server clock are not guaranteed to
/// agree at sub-second granularity.
pub const DEDUP_WINDOW_MS: i64 = 1_000;

/// Capacity of the command and event channels around the connection task.
pub const CHANNEL_CAPACITY: usize = 256;

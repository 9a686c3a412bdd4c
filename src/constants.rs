/// Lower bound for the worker pool size.
pub const MIN_CONCURRENCY: usize = 1;
/// Upper bound for the worker pool size.
pub const MAX_CONCURRENCY: usize = 32;

/// Number of leading candidates tried sequentially in hybrid mode.
pub const PRIORITY_PREFIX_LEN: usize = 100;

pub const CHANNEL_CAPACITY_MULTIPLIER: usize = 64;
pub const MIN_CHANNEL_CAPACITY: usize = 256;

/// Read buffer used when fingerprinting the document.
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

//! Hard caps on request sizes and in-memory growth.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_PAYMENT_METHOD_LEN: usize = 64;
pub const MAX_STAYS_PER_BOOKING: usize = 64;
pub const MAX_NIGHTS_PER_STAY: u32 = 366;
pub const MAX_STAYS_PER_ROOM: usize = 100_000;
/// Largest accepted per-night rate, keeps `rate * nights` sums far from overflow.
pub const MAX_RATE: i64 = 1_000_000_000_000;
/// Longest accepted protocol line in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

mod loop_slot;
mod rate_limiter;

pub use loop_slot::LoopSlot;
pub use rate_limiter::{RateLimiter, RateLimiters, RequestType};

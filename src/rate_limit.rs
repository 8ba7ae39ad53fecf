/// Keyed rate limiting for verification resends
use crate::error::{ApiError, ApiResult};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Per-caller limiter for resend-verification: `max` requests per `window`.
/// Keys are normalized email addresses.
pub struct ResendLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl ResendLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        let max = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / max.get())
            .unwrap_or_else(|| Quota::per_hour(max))
            .allow_burst(max);

        Self {
            limiter: DefaultKeyedRateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Check the limit for a key, consuming one slot on success
    pub fn check(&self, key: &str) -> ApiResult<()> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => Err(ApiError::RateLimited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }
}

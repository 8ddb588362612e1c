//! Per-connection input rate limiting

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket for one peer's input messages
pub struct PeerRateLimiter {
    limiter: Limiter,
}

impl PeerRateLimiter {
    /// Allow `per_second` messages per second, with a burst of the same size
    pub fn new(per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Returns true if the message may pass
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_capped() {
        let limiter = PeerRateLimiter::new(3);
        let allowed = (0..10).filter(|_| limiter.check()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_rate_still_lets_one_through() {
        let limiter = PeerRateLimiter::new(0);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}

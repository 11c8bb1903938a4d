// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-origin attempt throttling.
//!
//! A keyed token bucket admits `per_minute` attempts per origin. Once an
//! origin exhausts it, the origin is blocked for `backoff_base`, doubling on
//! every further denial up to `backoff_max`. The backoff level only resets
//! after a full `backoff_max` without denials.
//!
//! The bucket and the backoff both read the injected [`Clock`].

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::ThrottleConfig;
use crate::error::{ServiceError, ServiceResult};

/// Shrink the bucket map once it grows past this many origins.
const RETAIN_THRESHOLD: usize = 4096;

/// Feeds the service clock to `governor` as nanoseconds since construction.
#[derive(Clone)]
struct BucketClock {
    clock: Arc<dyn Clock>,
    epoch: DateTime<Utc>,
}

impl BucketClock {
    fn new(clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self { clock, epoch }
    }
}

impl governor::clock::Clock for BucketClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        let elapsed = (self.clock.now() - self.epoch)
            .num_nanoseconds()
            .unwrap_or(i64::MAX)
            .max(0);
        Nanos::from(elapsed as u64)
    }
}

type OriginLimiter =
    RateLimiter<String, DashMapStateStore<String>, BucketClock, NoOpMiddleware<Nanos>>;

#[derive(Debug, Clone, Copy)]
struct Backoff {
    level: u32,
    until: DateTime<Utc>,
    last_denied: DateTime<Utc>,
}

pub struct AttemptThrottle {
    limiter: OriginLimiter,
    backoff: Mutex<HashMap<String, Backoff>>,
    clock: Arc<dyn Clock>,
    config: ThrottleConfig,
}

impl AttemptThrottle {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let per_minute = NonZeroU32::new(config.per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::dashmap_with_clock(
                Quota::per_minute(per_minute),
                BucketClock::new(clock.clone()),
            ),
            backoff: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// Consume one attempt for `origin`, or fail with `RateLimited`.
    pub fn check(&self, origin: &str) -> ServiceResult<()> {
        let now = self.clock.now();
        if let Some(retry_after) = self.blocked_until(origin, now) {
            return Err(rate_limited(retry_after));
        }

        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }

        match self.limiter.check_key(&origin.to_string()) {
            Ok(()) => {
                let mut backoff = self.backoff.lock();
                if let Some(state) = backoff.get(origin) {
                    if now - state.last_denied >= self.config.backoff_max {
                        backoff.remove(origin);
                    }
                }
                Ok(())
            }
            Err(_) => {
                let retry_after = self.record_denial(origin, now);
                tracing::warn!(
                    origin,
                    retry_after_secs = retry_after.num_seconds(),
                    "Attempt rate limit exceeded"
                );
                Err(rate_limited(retry_after))
            }
        }
    }

    /// Remaining block for `origin`, if any. Does not consume an attempt.
    pub fn blocked_for(&self, origin: &str) -> Option<Duration> {
        self.blocked_until(origin, self.clock.now())
    }

    fn blocked_until(&self, origin: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.backoff
            .lock()
            .get(origin)
            .filter(|state| state.until > now)
            .map(|state| state.until - now)
    }

    fn record_denial(&self, origin: &str, now: DateTime<Utc>) -> Duration {
        let mut backoff = self.backoff.lock();
        let level = match backoff.get(origin) {
            Some(state) if now - state.last_denied < self.config.backoff_max => state.level + 1,
            _ => 1,
        };
        let delay = self.delay_for(level);
        backoff.insert(
            origin.to_string(),
            Backoff {
                level,
                until: now + delay,
                last_denied: now,
            },
        );
        delay
    }

    fn delay_for(&self, level: u32) -> Duration {
        let factor = 1i32 << level.saturating_sub(1).min(20);
        self.config
            .backoff_base
            .checked_mul(factor)
            .unwrap_or(self.config.backoff_max)
            .min(self.config.backoff_max)
    }
}

fn rate_limited(retry_after: Duration) -> ServiceError {
    ServiceError::RateLimited {
        retry_after_secs: retry_after.num_seconds().max(1) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn throttle(per_minute: u32) -> (AttemptThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let throttle = AttemptThrottle::new(
            ThrottleConfig {
                per_minute,
                backoff_base: Duration::seconds(30),
                backoff_max: Duration::hours(1),
            },
            clock.clone(),
        );
        (throttle, clock)
    }

    #[test]
    fn allows_quota_then_limits() {
        let (throttle, _) = throttle(10);
        for _ in 0..10 {
            throttle.check("10.0.0.1").unwrap();
        }
        assert!(matches!(
            throttle.check("10.0.0.1"),
            Err(ServiceError::RateLimited { retry_after_secs: 30 })
        ));
    }

    #[test]
    fn origins_are_independent() {
        let (throttle, _) = throttle(1);
        throttle.check("a").unwrap();
        assert!(throttle.check("a").is_err());
        assert!(throttle.check("b").is_ok());
    }

    #[test]
    fn blocked_origin_stays_blocked_until_backoff_expires() {
        let (throttle, clock) = throttle(1);
        throttle.check("a").unwrap();
        assert!(throttle.check("a").is_err());
        assert_eq!(throttle.blocked_for("a"), Some(Duration::seconds(30)));

        clock.advance(Duration::seconds(10));
        assert!(matches!(
            throttle.check("a"),
            Err(ServiceError::RateLimited { retry_after_secs: 20 })
        ));

        clock.advance(Duration::seconds(20));
        assert_eq!(throttle.blocked_for("a"), None);
    }

    #[test]
    fn origin_is_admitted_again_once_time_passes() {
        let (throttle, clock) = throttle(10);
        for _ in 0..10 {
            throttle.check("a").unwrap();
        }
        assert!(throttle.check("a").is_err());

        clock.advance(Duration::minutes(10));
        for _ in 0..10 {
            throttle.check("a").unwrap();
        }
    }

    #[test]
    fn bucket_refills_at_the_quota_rate() {
        let (throttle, clock) = throttle(1);
        throttle.check("a").unwrap();
        clock.advance(Duration::seconds(59));
        assert!(throttle.check("a").is_err());

        // Past the 30 s backoff and the one-minute refill.
        clock.advance(Duration::seconds(31));
        throttle.check("a").unwrap();
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let (throttle, clock) = throttle(1);
        let now = clock.now();
        assert_eq!(throttle.record_denial("a", now), Duration::seconds(30));
        assert_eq!(throttle.record_denial("a", now), Duration::seconds(60));
        assert_eq!(throttle.record_denial("a", now), Duration::seconds(120));
        for _ in 0..20 {
            throttle.record_denial("a", now);
        }
        assert_eq!(throttle.record_denial("a", now), Duration::hours(1));
    }

    #[test]
    fn backoff_level_resets_after_quiet_period() {
        let (throttle, clock) = throttle(1);
        let now = clock.now();
        throttle.record_denial("a", now);
        throttle.record_denial("a", now);
        let later = now + Duration::hours(2);
        assert_eq!(throttle.record_denial("a", later), Duration::seconds(30));
    }
}

// ============================
// crates/backend-lib/src/rate_limit.rs
// ============================
//! Per-client token buckets for the two traffic classes.
//!
//! Each class maps a client identity to its own limiter, created on first
//! contact. The map is only write-locked to insert or evict; checking a
//! token goes through the shared read guard and the limiter itself, which
//! is lock-free.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

use crate::config::{LimiterSettings, RateLimitSettings};
use crate::error::AppError;

/// Traffic classes with independent budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    /// Every inbound HTTP request
    Http,
    /// Chat frames, enforced inside the receive loop
    Chat,
}

impl TrafficClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TrafficClass::Http => "http",
            TrafficClass::Chat => "chat",
        }
    }
}

/// Entry in a class map
struct LimiterEntry {
    limiter: Arc<DefaultDirectRateLimiter>,
    /// Milliseconds since the owning map's epoch
    last_seen: AtomicU64,
}

/// Identity-keyed limiters sharing one quota
pub struct ClassLimiter {
    class: TrafficClass,
    quota: Quota,
    entries: DashMap<String, LimiterEntry>,
    epoch: Instant,
}

impl ClassLimiter {
    pub fn new(class: TrafficClass, settings: LimiterSettings) -> Self {
        Self {
            class,
            quota: quota_for(settings),
            entries: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Get the limiter for `identity`, creating it on first contact.
    pub fn limiter_for(&self, identity: &str) -> Arc<DefaultDirectRateLimiter> {
        let now = self.now_ms();
        if let Some(entry) = self.entries.get(identity) {
            entry.last_seen.store(now, Ordering::Relaxed);
            return Arc::clone(&entry.limiter);
        }

        let entry = self
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(class = self.class.as_str(), identity, "new limiter");
                LimiterEntry {
                    limiter: Arc::new(RateLimiter::direct(self.quota)),
                    last_seen: AtomicU64::new(now),
                }
            });
        Arc::clone(&entry.limiter)
    }

    /// Take one token for `identity`.
    pub fn check(&self, identity: &str) -> Result<(), AppError> {
        let now = self.now_ms();
        if let Some(entry) = self.entries.get(identity) {
            entry.last_seen.store(now, Ordering::Relaxed);
            return entry.limiter.check().map_err(|_| AppError::RateLimited);
        }
        self.limiter_for(identity)
            .check()
            .map_err(|_| AppError::RateLimited)
    }

    /// Drop limiters nobody used for `ttl`. Returns how many were removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let now = self.now_ms();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.last_seen.load(Ordering::Relaxed)) < ttl_ms);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn quota_for(settings: LimiterSettings) -> Quota {
    let burst = NonZeroU32::new(settings.burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(settings.period())
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

/// Both traffic classes
pub struct RateLimiterRegistry {
    http: ClassLimiter,
    chat: ClassLimiter,
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(&RateLimitSettings::default())
    }
}

impl RateLimiterRegistry {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            http: ClassLimiter::new(TrafficClass::Http, settings.http),
            chat: ClassLimiter::new(TrafficClass::Chat, settings.chat),
        }
    }

    pub fn class(&self, class: TrafficClass) -> &ClassLimiter {
        match class {
            TrafficClass::Http => &self.http,
            TrafficClass::Chat => &self.chat,
        }
    }

    pub fn http(&self) -> &ClassLimiter {
        &self.http
    }

    pub fn chat(&self) -> &ClassLimiter {
        &self.chat
    }

    pub fn check(&self, class: TrafficClass, identity: &str) -> Result<(), AppError> {
        self.class(class).check(identity)
    }

    /// Evict idle entries from both classes
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.http.evict_idle(ttl) + self.chat.evict_idle(ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_settings() -> LimiterSettings {
        LimiterSettings { period_ms: 2000, burst: 5 }
    }

    #[test]
    fn test_burst_is_capped() {
        let limiter = ClassLimiter::new(TrafficClass::Chat, chat_settings());
        let allowed = (0..20).filter(|_| limiter.check("10.0.0.1:5000").is_ok()).count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_rejection_is_rate_limited_error() {
        let limiter = ClassLimiter::new(TrafficClass::Chat, LimiterSettings { period_ms: 60_000, burst: 1 });
        assert!(limiter.check("a").is_ok());
        assert!(matches!(limiter.check("a"), Err(AppError::RateLimited)));
    }

    #[test]
    fn test_identities_tracked_separately() {
        let limiter = ClassLimiter::new(TrafficClass::Http, LimiterSettings { period_ms: 60_000, burst: 2 });
        assert!(limiter.check("1.1.1.1").is_ok());
        assert!(limiter.check("1.1.1.1").is_ok());
        assert!(limiter.check("1.1.1.1").is_err());
        assert!(limiter.check("2.2.2.2").is_ok());
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_classes_are_independent() {
        let registry = RateLimiterRegistry::new(&RateLimitSettings {
            http: LimiterSettings { period_ms: 60_000, burst: 1 },
            chat: LimiterSettings { period_ms: 60_000, burst: 1 },
            ..RateLimitSettings::default()
        });
        assert!(registry.check(TrafficClass::Http, "c").is_ok());
        assert!(registry.check(TrafficClass::Http, "c").is_err());
        assert!(registry.check(TrafficClass::Chat, "c").is_ok());
    }

    #[test]
    fn test_limiter_for_returns_shared_bucket() {
        let limiter = ClassLimiter::new(TrafficClass::Chat, LimiterSettings { period_ms: 60_000, burst: 1 });
        let held = limiter.limiter_for("conn");
        assert!(held.check().is_ok());
        assert!(limiter.check("conn").is_err());
    }

    #[tokio::test]
    async fn test_tokens_refill() {
        let limiter = ClassLimiter::new(TrafficClass::Http, LimiterSettings { period_ms: 50, burst: 1 });
        assert!(limiter.check("x").is_ok());
        assert!(limiter.check("x").is_err());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.check("x").is_ok());
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let registry = RateLimiterRegistry::default();
        registry.check(TrafficClass::Http, "old").unwrap();
        let held = registry.chat().limiter_for("conn");

        tokio::time::sleep(Duration::from_millis(60)).await;
        registry.check(TrafficClass::Http, "fresh").unwrap();

        let removed = registry.evict_idle(Duration::from_millis(30));
        assert_eq!(removed, 2);
        assert_eq!(registry.http().len(), 1);
        assert!(registry.chat().is_empty());
        // a connection keeps its own handle after eviction
        assert!(held.check().is_ok());
    }
}

//! Sliding-window rate limiting
//!
//! Article views are limited per client IP with a `<count>/<period>` rate such
//! as `100/1m`. Failed logins reuse the same window keyed by username.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Failed login attempts allowed per username
pub const LOGIN_RATE: &str = "5/15m";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateParseError {
    #[error("rate must look like <count>/<period>, got '{0}'")]
    Format(String),
    #[error("unknown period unit '{0}' (use s, m, h or d)")]
    Unit(String),
}

/// Parse `<count>/<period>` where period is `[n](s|m|h|d)`, e.g. `100/1m` or `10/h`
pub fn parse_rate(rate: &str) -> Result<(usize, Duration), RateParseError> {
    let (count, period) = rate
        .trim()
        .split_once('/')
        .ok_or_else(|| RateParseError::Format(rate.to_string()))?;
    let count: usize = count
        .trim()
        .parse()
        .map_err(|_| RateParseError::Format(rate.to_string()))?;

    let period = period.trim();
    let split = period
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| RateParseError::Format(rate.to_string()))?;
    let (amount, unit) = period.split_at(split);
    let amount: i64 = if amount.is_empty() {
        1
    } else {
        amount
            .parse()
            .map_err(|_| RateParseError::Format(rate.to_string()))?
    };

    let window = match unit {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        other => return Err(RateParseError::Unit(other.to_string())),
    };
    Ok((count, window))
}

/// Counts hits per key inside a sliding window
pub struct RateLimiter<K> {
    limit: usize,
    window: Duration,
    hits: Arc<RwLock<HashMap<K, Vec<DateTime<Utc>>>>>,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_rate(rate: &str) -> Result<Self, RateParseError> {
        let (limit, window) = parse_rate(rate)?;
        Ok(Self::new(limit, window))
    }

    /// Whether `key` already used up its window
    pub async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        match hits.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    pub async fn record(&self, key: K) {
        let mut hits = self.hits.write().await;
        hits.entry(key).or_default().push(Utc::now());
    }

    /// Record a hit and report whether it went over the limit
    pub async fn hit(&self, key: K) -> bool {
        let limited = self.is_limited(&key).await;
        if !limited {
            self.record(key).await;
        }
        limited
    }

    pub async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    /// Drop keys whose hits all fell out of the window
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Per-IP limiter for article views
pub struct ViewRateLimiter {
    limiter: RateLimiter<IpAddr>,
    /// Reject over-limit requests; when false they are only logged
    block: bool,
}

impl ViewRateLimiter {
    pub fn new(rate: &str, block: bool) -> Result<Self, RateParseError> {
        Ok(Self {
            limiter: RateLimiter::from_rate(rate)?,
            block,
        })
    }

    /// `true` when the request must be rejected
    pub async fn check(&self, ip: IpAddr) -> bool {
        let limited = self.limiter.hit(ip).await;
        if limited {
            tracing::warn!("View rate limit exceeded for {}", ip);
        }
        limited && self.block
    }

    pub async fn cleanup(&self) {
        self.limiter.cleanup().await;
    }
}

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

// Bucket count at which admission first sweeps out finished windows.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Error, Debug, PartialEq)]
pub enum RateLimitParseError {
    #[error("invalid rate limit '{0}': expected '<count> per <unit>'")]
    Malformed(String),
    #[error("invalid rate limit '{0}': unknown unit '{1}'")]
    UnknownUnit(String, String),
}

/// `count` requests per fixed window of length `per`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimit {
    pub count: u32,
    pub per: Duration,
}

impl RateLimit {
    pub fn new(count: u32, per: Duration) -> Self {
        Self { count, per }
    }

    pub fn per_second(count: u32) -> Self {
        Self::new(count, Duration::from_secs(1))
    }

    pub fn per_minute(count: u32) -> Self {
        Self::new(count, Duration::from_secs(60))
    }

    /// Parses a `;`-separated list such as `"20 per minute; 500 per day"`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, RateLimitParseError> {
        raw.split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.per.as_millis()).unwrap_or(i64::MAX).max(1)
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || RateLimitParseError::Malformed(raw.to_string());
        let normalized = raw.trim().to_lowercase();

        let (count, window) = normalized
            .split_once(" per ")
            .or_else(|| normalized.split_once('/'))
            .ok_or_else(malformed)?;
        let count: u32 = count.trim().parse().map_err(|_| malformed())?;

        // "minute", "5 minutes"
        let mut parts = window.split_whitespace();
        let (amount, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(unit), None, None) => (1, unit),
            (Some(amount), Some(unit), None) => {
                (amount.parse::<u64>().map_err(|_| malformed())?, unit)
            }
            _ => return Err(malformed()),
        };
        if amount == 0 {
            return Err(malformed());
        }

        let unit_secs = match unit.trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            _ => {
                return Err(RateLimitParseError::UnknownUnit(
                    raw.to_string(),
                    unit.to_string(),
                ))
            }
        };

        let secs = amount.checked_mul(unit_secs).ok_or_else(malformed)?;
        Ok(Self::new(count, Duration::from_secs(secs)))
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.per.as_secs();
        let (amount, unit) = if secs > 0 && secs % 86_400 == 0 {
            (secs / 86_400, "day")
        } else if secs > 0 && secs % 3_600 == 0 {
            (secs / 3_600, "hour")
        } else if secs > 0 && secs % 60 == 0 {
            (secs / 60, "minute")
        } else {
            (secs, "second")
        };
        write!(f, "{} per {} {}", self.count, amount, unit)
    }
}

/// How a route's own limits combine with the global default.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutePolicy {
    Default,
    /// The route's limits replace the default.
    Override(Vec<RateLimit>),
    /// The route's limits apply on top of the default; all must pass.
    Additive(Vec<RateLimit>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Rejected { limit: RateLimit, retry_after: Duration },
}

#[cfg(test)]
impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identity: String,
    route: String,
    limit: RateLimit,
}

/// Requests counted in a window that opened with its first request.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: i64,
}

impl Bucket {
    fn is_live(&self, limit: &RateLimit, now: i64) -> bool {
        now < self.window_start.saturating_add(limit.window_millis())
    }
}

#[derive(Debug)]
struct BucketTable {
    buckets: HashMap<BucketKey, Bucket>,
    prune_at: usize,
}

impl BucketTable {
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            prune_at: PRUNE_THRESHOLD,
        }
    }

    /// Sweeps finished windows once the table reaches `prune_at`, then moves
    /// the mark to twice the surviving size so a table of live buckets is not
    /// rescanned on every admission.
    fn maybe_prune(&mut self, now: i64) {
        if self.buckets.len() < self.prune_at {
            return;
        }
        self.buckets.retain(|key, bucket| bucket.is_live(&key.limit, now));
        self.prune_at = (self.buckets.len() * 2).max(PRUNE_THRESHOLD);
        tracing::debug!(
            "Pruned rate limit buckets, {} live, next sweep at {}",
            self.buckets.len(),
            self.prune_at
        );
    }
}

/// Fixed-window limiter keyed by (client identity, route, limit).
pub struct RateLimiter {
    default_limits: Vec<RateLimit>,
    table: Mutex<BucketTable>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(default_limits: Vec<RateLimit>) -> Self {
        Self::with_clock(default_limits, Arc::new(SystemClock))
    }

    pub fn with_clock(default_limits: Vec<RateLimit>, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_limits,
            table: Mutex::new(BucketTable::new()),
            clock,
        }
    }

    pub fn limits_for(&self, policy: &RoutePolicy) -> Vec<RateLimit> {
        match policy {
            RoutePolicy::Default => self.default_limits.clone(),
            RoutePolicy::Override(limits) => limits.clone(),
            RoutePolicy::Additive(limits) => self
                .default_limits
                .iter()
                .chain(limits.iter())
                .copied()
                .collect(),
        }
    }

    /// Checks every applicable bucket and counts the request only if all of them pass.
    ///
    /// A bucket's window opens with the first request it counts and closes one
    /// window length later; the next request after that opens a fresh window.
    pub fn admit(&self, identity: &str, route: &str, policy: &RoutePolicy) -> Decision {
        let now = self.clock.now().timestamp_millis();
        let limits = self.limits_for(policy);

        let mut table = match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.maybe_prune(now);

        let keys: Vec<BucketKey> = limits
            .iter()
            .map(|limit| BucketKey {
                identity: identity.to_string(),
                route: route.to_string(),
                limit: *limit,
            })
            .collect();

        for key in &keys {
            let live = table
                .buckets
                .get(key)
                .filter(|bucket| bucket.is_live(&key.limit, now));

            if let Some(bucket) = live {
                if bucket.count >= key.limit.count {
                    let window_end = bucket.window_start.saturating_add(key.limit.window_millis());
                    return Decision::Rejected {
                        limit: key.limit,
                        retry_after: Duration::from_millis((window_end - now).max(0) as u64),
                    };
                }
            } else if key.limit.count == 0 {
                return Decision::Rejected {
                    limit: key.limit,
                    retry_after: key.limit.per,
                };
            }
        }

        for key in keys {
            let limit = key.limit;
            let bucket = table.buckets.entry(key).or_insert(Bucket {
                count: 0,
                window_start: now,
            });
            if !bucket.is_live(&limit, now) {
                *bucket = Bucket {
                    count: 0,
                    window_start: now,
                };
            }
            bucket.count += 1;
        }

        Decision::Allowed
    }

    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.table.lock().map(|t| t.buckets.len()).unwrap_or(0)
    }
}

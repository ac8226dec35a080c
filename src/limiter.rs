//! Token-bucket rate limiting with optional escalation to timed mutes.
//!
//! Each user gets an independent bucket that refills continuously at
//! `tokens_per_second` and caps at `max_tokens` (the burst size). Consuming
//! refills first, based on elapsed time, so no background task is needed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single user's bucket state.
#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(initial_tokens: f64) -> Self {
        Self { tokens: initial_tokens, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant, tokens_per_second: f64, max_tokens: f64) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * tokens_per_second).min(max_tokens);
        self.last_refill = now;
    }
}

/// Per-user token-bucket rate limiter.
///
/// New users start with a full bucket, allowing an initial burst.
/// All operations are internally synchronized.
#[derive(Debug)]
pub struct RateLimiter {
    tokens_per_second: f64,
    max_tokens: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(tokens_per_second: f64, max_tokens: f64) -> Self {
        Self {
            tokens_per_second,
            max_tokens,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to consume one token. Returns false when rate limited.
    pub fn try_consume(&self, user_id: &str) -> bool {
        self.try_consume_n(user_id, 1.0)
    }

    /// Try to consume `count` tokens at once.
    pub fn try_consume_n(&self, user_id: &str, count: f64) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets
            .entry(user_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens));
        bucket.refill(now, self.tokens_per_second, self.max_tokens);
        if bucket.tokens >= count {
            bucket.tokens -= count;
            true
        } else {
            false
        }
    }

    /// Check whether a token is available without consuming it.
    pub fn can_consume(&self, user_id: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets
            .entry(user_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens));
        bucket.refill(now, self.tokens_per_second, self.max_tokens);
        bucket.tokens >= 1.0
    }

    /// Current token count for a user, or `None` if they have no bucket.
    pub fn tokens(&self, user_id: &str) -> Option<f64> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets.get_mut(user_id)?;
        bucket.refill(now, self.tokens_per_second, self.max_tokens);
        Some(bucket.tokens)
    }

    /// Milliseconds until the next token becomes available; 0 if one is
    /// available now.
    pub fn wait_time_ms(&self, user_id: &str) -> u64 {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets
            .entry(user_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens));
        bucket.refill(now, self.tokens_per_second, self.max_tokens);
        if bucket.tokens >= 1.0 {
            return 0;
        }
        let needed = 1.0 - bucket.tokens;
        ((needed / self.tokens_per_second) * 1000.0) as u64
    }

    /// Reset a user's bucket to full capacity.
    pub fn reset(&self, user_id: &str) {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get_mut(user_id) {
            bucket.tokens = self.max_tokens;
            bucket.last_refill = Instant::now();
        }
    }

    /// Drop a user's bucket entirely. Call on disconnect to free memory.
    pub fn remove(&self, user_id: &str) {
        self.buckets.lock().unwrap().remove(user_id);
    }

    /// Drop buckets untouched for longer than `max_age`. Returns the number
    /// removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.last_refill) <= max_age);
        before - buckets.len()
    }

    /// Number of tracked users.
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all buckets.
    pub fn clear(&self) {
        self.buckets.lock().unwrap().clear();
    }

    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }
}

#[derive(Debug, Default)]
struct MuteState {
    violations: HashMap<String, u32>,
    muted_until: HashMap<String, Instant>,
}

/// Rate limiter that escalates repeat offenders to a timed mute.
///
/// After `violations_before_mute` consecutive rejected consumes the user is
/// muted; while muted, `try_consume` fails without touching the bucket. A
/// successful consume clears the violation streak.
#[derive(Debug)]
pub struct MutingRateLimiter {
    limiter: RateLimiter,
    mute_duration: Duration,
    violations_before_mute: u32,
    state: Mutex<MuteState>,
}

impl MutingRateLimiter {
    pub fn new(
        tokens_per_second: f64,
        max_tokens: f64,
        mute_duration: Duration,
        violations_before_mute: u32,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(tokens_per_second, max_tokens),
            mute_duration,
            violations_before_mute,
            state: Mutex::new(MuteState::default()),
        }
    }

    /// Try to consume a token, tracking violations and mutes.
    pub fn try_consume(&self, user_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();

        if let Some(until) = state.muted_until.get(user_id).copied() {
            if Instant::now() < until {
                return false;
            }
            state.muted_until.remove(user_id);
            state.violations.remove(user_id);
        }

        if self.limiter.try_consume(user_id) {
            state.violations.remove(user_id);
            return true;
        }

        let count = state.violations.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.violations_before_mute {
            state
                .muted_until
                .insert(user_id.to_string(), Instant::now() + self.mute_duration);
        }
        false
    }

    /// Whether the user is currently muted. Expired mutes are cleared.
    pub fn is_muted(&self, user_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.muted_until.get(user_id).copied() {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                state.muted_until.remove(user_id);
                state.violations.remove(user_id);
                false
            }
            None => false,
        }
    }

    /// Milliseconds of mute remaining; 0 if not muted.
    pub fn mute_remaining_ms(&self, user_id: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        match state.muted_until.get(user_id).copied() {
            Some(until) => {
                let now = Instant::now();
                if now >= until {
                    state.muted_until.remove(user_id);
                    return 0;
                }
                until.duration_since(now).as_millis() as u64
            }
            None => 0,
        }
    }

    /// Drop all tracking for a user.
    pub fn remove(&self, user_id: &str) {
        self.limiter.remove(user_id);
        let mut state = self.state.lock().unwrap();
        state.violations.remove(user_id);
        state.muted_until.remove(user_id);
    }

    /// Drop all state.
    pub fn clear(&self) {
        self.limiter.clear();
        let mut state = self.state.lock().unwrap();
        state.violations.clear();
        state.muted_until.clear();
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use time::{OffsetDateTime, Duration};
use tracing::{warn, error};
use shared::error::ErrorResponse;

#[derive(Debug)]
struct RateLimit {
    attempts: u32,
    first_attempt: OffsetDateTime,
    last_attempt: OffsetDateTime,
}

/// Fixed-window attempt counter keyed by caller. Used to slow down guessing
/// of the admin secret.
#[derive(Debug)]
pub struct RateLimiter {
    limits: Mutex<HashMap<String, RateLimit>>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_minutes: i64) -> Self {
        Self {
            limits: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Fails while `key` has used up its attempts in the current window.
    pub fn check_rate_limit(&self, key: &str) -> Result<(), ErrorResponse> {
        let now = OffsetDateTime::now_utc();

        let mut limits = match self.limits.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Failed to acquire rate limit lock: {}", e);
                return Err(ErrorResponse::new("Internal rate limit error"));
            }
        };

        limits.retain(|_, limit| now - limit.last_attempt <= self.window * 2);

        match limits.get(key) {
            Some(limit) if now - limit.first_attempt <= self.window && limit.attempts >= self.max_attempts => {
                let minutes_to_wait = (limit.first_attempt + self.window - now).whole_minutes();
                let response = ErrorResponse::new(format!(
                    "Rate limit exceeded. Please try again in {} minutes.",
                    minutes_to_wait.max(1)
                ));
                warn!("Rate limit triggered for key {}: {}", key, response.error);
                Err(response)
            }
            _ => Ok(()),
        }
    }

    pub fn record_attempt(&self, key: &str) {
        let now = OffsetDateTime::now_utc();
        let Ok(mut limits) = self.limits.lock() else {
            error!("Failed to acquire rate limit lock");
            return;
        };

        match limits.get_mut(key) {
            Some(limit) if now - limit.first_attempt <= self.window => {
                limit.attempts += 1;
                limit.last_attempt = now;
            }
            _ => {
                limits.insert(key.to_string(), RateLimit {
                    attempts: 1,
                    first_attempt: now,
                    last_attempt: now,
                });
            }
        }
    }
}

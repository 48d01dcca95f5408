use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::IndexerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be >= 1".to_string());
        }
        if self.multiplier == 0 {
            return Err("retry multiplier must be >= 1".to_string());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(format!(
                "retry max_backoff_ms {} is below initial_backoff_ms {}",
                self.max_backoff_ms, self.initial_backoff_ms
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = u64::from(self.multiplier).saturating_pow(exponent);
        let delay_ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(
        &self,
        event_id: &str,
        mut op: impl FnMut() -> Result<T, IndexerError>,
    ) -> Result<T, IndexerError> {
        let mut attempt = 1_u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) if error.is_transient() => {
                    return Err(IndexerError::RetryExhausted {
                        event_id: event_id.to_string(),
                        attempts: attempt,
                        reason: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }
}

//! Bounded-retry timer shared by every polling loop.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::ProvisionError;

/// Delay imposed between successive attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Issues numbered attempt tokens until a total time budget is spent.
///
/// The first token is issued immediately; every later token is preceded by
/// [`RETRY_DELAY`]. Once the budget has elapsed,
/// [`next_attempt`](RetryTimer::next_attempt) yields
/// [`ProvisionError::DeadlineExceeded`] carrying the purpose label and the
/// number of attempts made. Construct a fresh timer per polling loop;
/// timers are never shared or reused.
pub struct RetryTimer {
    purpose: String,
    deadline: Instant,
    attempts: u32,
}

impl RetryTimer {
    #[must_use]
    pub fn new(budget: Duration, purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            deadline: Instant::now() + budget,
            attempts: 0,
        }
    }

    /// Obtain the next attempt token, waiting out the inter-attempt delay
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::DeadlineExceeded`] once the budget is
    /// spent.
    pub async fn next_attempt(&mut self) -> Result<u32, ProvisionError> {
        if self.attempts > 0 {
            tokio::time::sleep(RETRY_DELAY).await;
        }
        if Instant::now() >= self.deadline {
            return Err(self.deadline_exceeded());
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Number of tokens issued so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The deadline failure for this timer's purpose label.
    #[must_use]
    pub fn deadline_exceeded(&self) -> ProvisionError {
        ProvisionError::DeadlineExceeded {
            purpose: self.purpose.clone(),
            attempts: self.attempts,
        }
    }
}

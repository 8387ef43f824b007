//! Server-declared per-bucket budget

use std::time::{Duration, Instant};

/// Budget for one rate-limit bucket, as last reported by the server
///
/// Before the first response for a bucket arrives, the budget is
/// undiscovered and never blocks.
#[derive(Debug, Clone)]
pub struct BucketBudget {
    limit: u32,
    remaining: u32,
    resets_at: Option<Instant>,
    locked_until: Option<Instant>,
    discovered: bool,
}

impl Default for BucketBudget {
    fn default() -> Self {
        Self::undiscovered()
    }
}

impl BucketBudget {
    /// A bucket nobody has reported limits for yet
    pub fn undiscovered() -> Self {
        Self {
            limit: u32::MAX,
            remaining: u32::MAX,
            resets_at: None,
            locked_until: None,
            discovered: false,
        }
    }

    /// Whether the server has declared limits for this bucket
    #[inline]
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Remaining spends at `now`, restoring to the limit once the reset passed
    pub fn remaining(&mut self, now: Instant) -> u32 {
        self.restore(now);
        self.remaining
    }

    /// Reset deadline, if the server gave one
    #[inline]
    pub fn resets_at(&self) -> Option<Instant> {
        self.resets_at
    }

    fn restore(&mut self, now: Instant) {
        if self.resets_at.is_some_and(|reset| reset <= now) {
            self.remaining = self.limit;
            self.resets_at = None;
        }
        if self.locked_until.is_some_and(|deadline| deadline <= now) {
            self.locked_until = None;
        }
    }

    /// Apply limit headers from a response received at `now`
    pub fn update(&mut self, limit: u32, remaining: u32, reset_after: Duration, now: Instant) {
        self.limit = limit;
        self.remaining = remaining.min(limit);
        self.resets_at = Some(now + reset_after);
        self.discovered = true;
    }

    /// How long until a spend would be admitted, or `None` if it would be now
    pub fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        self.restore(now);

        let lockout = self
            .locked_until
            .map(|deadline| deadline.saturating_duration_since(now));
        let exhausted = if self.remaining == 0 {
            self.resets_at
                .map(|reset| reset.saturating_duration_since(now))
        } else {
            None
        };

        match (lockout, exhausted) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
        .filter(|wait| !wait.is_zero())
    }

    /// Spend one unit if possible, otherwise return the wait
    pub fn try_spend(&mut self, now: Instant) -> Result<(), Duration> {
        match self.wait_time(now) {
            Some(wait) => Err(wait),
            None => {
                self.remaining = self.remaining.saturating_sub(1);
                Ok(())
            }
        }
    }

    /// Block this bucket until `deadline` (non-global 429)
    pub fn lock_until(&mut self, deadline: Instant) {
        self.remaining = 0;
        self.resets_at = Some(self.resets_at.map_or(deadline, |reset| reset.max(deadline)));
        self.locked_until = Some(self.locked_until.map_or(deadline, |d| d.max(deadline)));
    }
}

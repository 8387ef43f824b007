//! Sliding-window log budget
//!
//! Keeps the instants of the most recent spends and admits a new spend only
//! when fewer than `capacity` of them fall inside the trailing window. Unlike a
//! fixed window that resets on a boundary, this can never admit more than
//! `capacity` spends in any window-length interval.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A capacity-per-window send budget with an optional lockout deadline
#[derive(Debug, Clone)]
pub struct WindowBudget {
    capacity: usize,
    window: Duration,
    spends: VecDeque<Instant>,
    locked_until: Option<Instant>,
}

impl WindowBudget {
    /// Create a budget of `capacity` spends per `window`
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = (capacity as usize).max(1);
        Self {
            capacity,
            window,
            spends: VecDeque::with_capacity(capacity),
            locked_until: None,
        }
    }

    /// Configured capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured window length
    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Forget spends that have left the trailing window
    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.spends.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.spends.pop_front();
            } else {
                break;
            }
        }
        if self.locked_until.is_some_and(|deadline| deadline <= now) {
            self.locked_until = None;
        }
    }

    /// Spends still available at `now`
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.capacity - self.spends.len()
    }

    /// How long until a spend would be admitted, or `None` if it would be now
    pub fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        self.evict(now);

        let lockout = self
            .locked_until
            .map(|deadline| deadline.saturating_duration_since(now));

        let window_wait = if self.spends.len() < self.capacity {
            None
        } else {
            // Full: the oldest spend must age out first
            self.spends
                .front()
                .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
        };

        match (lockout, window_wait) {
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
                self.spends.push_back(now);
                Ok(())
            }
        }
    }

    /// Block every spend until `deadline`
    ///
    /// A later deadline replaces an earlier one, never the other way round.
    pub fn lock_until(&mut self, deadline: Instant) {
        self.locked_until = Some(match self.locked_until {
            Some(current) => current.max(deadline),
            None => deadline,
        });
    }

    /// Active lockout deadline, if any
    pub fn locked_until(&self) -> Option<Instant> {
        self.locked_until
    }

    /// When the next unit restores, if the budget is currently exhausted
    pub fn next_restore(&mut self, now: Instant) -> Option<Instant> {
        self.wait_time(now).map(|wait| now + wait)
    }
}

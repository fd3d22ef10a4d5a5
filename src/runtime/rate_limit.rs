//! Per-user event budget
//!
//! Each user gets a governor limiter allowing `per_minute` events in a burst,
//! refilled evenly over the minute. Idle entries are swept opportunistically.

use crate::db::UserId;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Entries untouched for this long are dropped by the sweep
const IDLE_TTL: Duration = Duration::from_secs(120);

/// Sweep once every this many checks
const SWEEP_EVERY: u64 = 256;

const DEFAULT_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(30) {
    Some(n) => n,
    None => unreachable!(),
};

struct UserBudget {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

pub struct UserRateLimiter {
    budgets: DashMap<UserId, UserBudget>,
    quota: Quota,
    checks: AtomicU64,
}

impl UserRateLimiter {
    /// A zero budget falls back to the default of 30 per minute
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(DEFAULT_PER_MINUTE);
        Self {
            budgets: DashMap::new(),
            quota: Quota::per_minute(per_minute),
            checks: AtomicU64::new(0),
        }
    }

    /// Consume one unit of the user's budget; `false` when exhausted
    pub fn check(&self, user_id: UserId) -> bool {
        let now = Instant::now();
        let allowed = {
            let mut budget = self.budgets.entry(user_id).or_insert_with(|| UserBudget {
                limiter: RateLimiter::direct(self.quota),
                last_seen: now,
            });
            budget.last_seen = now;
            budget.limiter.check().is_ok()
        };

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }
        if !allowed {
            tracing::debug!(user_id, "Event rate limit exceeded");
        }
        allowed
    }

    /// Drop budgets idle past the TTL; their window has fully refilled anyway
    pub fn sweep(&self, now: Instant) {
        let before = self.budgets.len();
        self.budgets
            .retain(|_, budget| now.duration_since(budget.last_seen) < IDLE_TTL);
        let removed = before.saturating_sub(self.budgets.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept idle rate limit entries");
        }
    }

    #[cfg(test)]
    pub fn tracked_users(&self) -> usize {
        self.budgets.len()
    }
}

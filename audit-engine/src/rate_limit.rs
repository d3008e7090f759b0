// Per-user request budgets for the read and export paths.
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use uuid::Uuid;

/// Which budget a request draws from. View queries and export submissions
/// have separate quotas since exports are far more expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaCategory {
    ViewQuery,
    ExportSubmit,
}

impl fmt::Display for QuotaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ViewQuery => write!(f, "view_query"),
            Self::ExportSubmit => write!(f, "export_submit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// View queries allowed per user per minute.
    pub view_queries_per_minute: u32,
    /// Export submissions allowed per user per hour.
    pub export_submits_per_hour: u32,
    /// Export jobs a user may have pending or running at once.
    pub max_active_exports: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            view_queries_per_minute: 120,
            export_submits_per_hour: 5,
            max_active_exports: 3,
        }
    }
}

#[derive(Debug)]
struct Window {
    window_start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter per (key, category), plus a gauge of each
/// user's active export jobs.
///
/// Denial is a pure function of the current counts. The limiter never blocks
/// the caller and never retries; callers surface a denial as `RateLimited`.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<(Uuid, QuotaCategory), Window>,
    active_exports: DashMap<Uuid, u32>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            active_exports: DashMap::new(),
        }
    }

    fn budget(&self, category: QuotaCategory) -> (u32, Duration) {
        match category {
            QuotaCategory::ViewQuery => (self.config.view_queries_per_minute, Duration::minutes(1)),
            QuotaCategory::ExportSubmit => {
                (self.config.export_submits_per_hour, Duration::hours(1))
            }
        }
    }

    /// Count one request against the windowed budget. Returns whether the
    /// request is granted. The window resets once it has fully elapsed.
    pub fn try_acquire(&self, key: Uuid, category: QuotaCategory) -> bool {
        let (limit, window) = self.budget(category);
        let now = Utc::now();

        let mut entry = self.windows.entry((key, category)).or_insert(Window {
            window_start: now,
            count: 0,
        });
        if now - entry.window_start >= window {
            entry.window_start = now;
            entry.count = 0;
        }
        if entry.count >= limit {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Reserve one active-export slot for the user. Granted only while the
    /// user is under `max_active_exports`.
    pub fn try_acquire_export_slot(&self, key: Uuid) -> bool {
        let mut entry = self.active_exports.entry(key).or_insert(0);
        if *entry >= self.config.max_active_exports {
            return false;
        }
        *entry += 1;
        true
    }

    /// Release a slot taken by [`try_acquire_export_slot`] once the job
    /// reaches a terminal state.
    pub fn release_export_slot(&self, key: Uuid) {
        if let Some(mut entry) = self.active_exports.get_mut(&key) {
            *entry = entry.saturating_sub(1);
        }
        self.active_exports.remove_if(&key, |_, count| *count == 0);
    }

    /// Restore a slot for a job recovered from a previous process, without
    /// checking the cap: the job already exists and must be accounted for.
    pub fn note_active_export(&self, key: Uuid) {
        *self.active_exports.entry(key).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(view: u32, export: u32, active: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            view_queries_per_minute: view,
            export_submits_per_hour: export,
            max_active_exports: active,
        })
    }

    #[test]
    fn denies_once_budget_is_spent() {
        let limiter = limiter(2, 1, 1);
        let user = Uuid::new_v4();

        assert!(limiter.try_acquire(user, QuotaCategory::ViewQuery));
        assert!(limiter.try_acquire(user, QuotaCategory::ViewQuery));
        assert!(!limiter.try_acquire(user, QuotaCategory::ViewQuery));
    }

    #[test]
    fn categories_have_independent_budgets() {
        let limiter = limiter(1, 1, 1);
        let user = Uuid::new_v4();

        assert!(limiter.try_acquire(user, QuotaCategory::ViewQuery));
        assert!(limiter.try_acquire(user, QuotaCategory::ExportSubmit));
        assert!(!limiter.try_acquire(user, QuotaCategory::ViewQuery));
        assert!(!limiter.try_acquire(user, QuotaCategory::ExportSubmit));
    }

    #[test]
    fn keys_do_not_share_budgets() {
        let limiter = limiter(1, 1, 1);
        assert!(limiter.try_acquire(Uuid::new_v4(), QuotaCategory::ViewQuery));
        assert!(limiter.try_acquire(Uuid::new_v4(), QuotaCategory::ViewQuery));
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = limiter(1, 1, 1);
        let user = Uuid::new_v4();

        assert!(limiter.try_acquire(user, QuotaCategory::ViewQuery));
        assert!(!limiter.try_acquire(user, QuotaCategory::ViewQuery));

        // Age the window past its span instead of sleeping for a minute.
        if let Some(mut entry) = limiter.windows.get_mut(&(user, QuotaCategory::ViewQuery)) {
            entry.window_start = Utc::now() - Duration::minutes(2);
        }

        assert!(limiter.try_acquire(user, QuotaCategory::ViewQuery));
    }

    #[test]
    fn export_slots_cap_and_release() {
        let limiter = limiter(10, 10, 2);
        let user = Uuid::new_v4();

        assert!(limiter.try_acquire_export_slot(user));
        assert!(limiter.try_acquire_export_slot(user));
        assert!(!limiter.try_acquire_export_slot(user));

        limiter.release_export_slot(user);
        assert!(limiter.try_acquire_export_slot(user));
    }
}

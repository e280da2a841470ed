//! Lifecycle timing configuration.

use std::time::Duration;

/// Timing knobs for the session engine.
///
/// Defaults match production behavior; tests shrink them where useful.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Proactive refresh fires this long before expiry.
    pub refresh_margin: Duration,
    /// Expiry warning is eligible once remaining time drops below this.
    pub warning_window: Duration,
    /// Idle period after which the session is forcibly ended.
    pub inactivity_budget: Duration,
    /// Budget for the primary profile lookup before the fallback path runs.
    pub primary_lookup_timeout: Duration,
    /// Recompute cadence of the expiry notifier.
    pub notifier_tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(5 * 60),
            warning_window: Duration::from_secs(3 * 60),
            inactivity_budget: Duration::from_secs(30 * 60),
            primary_lookup_timeout: Duration::from_secs(5),
            notifier_tick: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_warning_window(mut self, window: Duration) -> Self {
        self.warning_window = window;
        self
    }

    pub fn with_inactivity_budget(mut self, budget: Duration) -> Self {
        self.inactivity_budget = budget;
        self
    }

    pub fn with_primary_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.primary_lookup_timeout = timeout;
        self
    }
}

/// What the factory does about messages still alive at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakTracking {
    /// No bookkeeping.
    Off,
    /// Track live messages and log every leak at teardown.
    Report,
    /// As `Report`, then panic if anything leaked.
    Strict,
}

impl LeakTracking {
    pub fn is_enabled(self) -> bool {
        !matches!(self, LeakTracking::Off)
    }
}

impl Default for LeakTracking {
    /// `Report` in debug builds or with the `leak-tracking` feature, `Off` otherwise.
    fn default() -> Self {
        if cfg!(any(debug_assertions, feature = "leak-tracking")) {
            LeakTracking::Report
        } else {
            LeakTracking::Off
        }
    }
}

/// Controls message factory behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FactoryConfig {
    /// Leak bookkeeping mode.
    pub leak_tracking: LeakTracking,
}

impl FactoryConfig {
    /// Config with leak tracking in `mode`.
    pub fn with_leak_tracking(mode: LeakTracking) -> Self {
        Self {
            leak_tracking: mode,
        }
    }
}

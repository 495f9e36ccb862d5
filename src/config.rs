use std::time::Duration;

/// Which environment the walker is running in. Pacing defaults resolve
/// against this instead of reading ambient process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RuntimeMode {
    Production,
    #[default]
    Development,
}

/// Delay inserted between consecutive batch pops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// One second in production, no delay elsewhere.
    #[default]
    Auto,
    Disabled,
    Every(Duration),
}

impl Pacing {
    pub fn interval_in(self, mode: RuntimeMode) -> Duration {
        match self {
            Pacing::Auto => match mode {
                RuntimeMode::Production => Duration::from_secs(1),
                RuntimeMode::Development => Duration::ZERO,
            },
            Pacing::Disabled => Duration::ZERO,
            Pacing::Every(interval) => interval,
        }
    }
}

/// Runtime configuration for a `Walker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkerConfig {
    pub runtime_mode: RuntimeMode,
    /// Create snapshot tables unlogged where the store supports it.
    pub unlogged_snapshots: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            runtime_mode: RuntimeMode::Development,
            unlogged_snapshots: true,
        }
    }
}

impl WalkerConfig {
    pub fn production() -> Self {
        Self {
            runtime_mode: RuntimeMode::Production,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self::default()
    }
}

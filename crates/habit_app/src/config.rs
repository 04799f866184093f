use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Snapshot loaded at start and written back when input closes.
    pub state_path: Option<PathBuf>,
    pub seed_defaults: bool,
    pub seed_sample_stacks: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            seed_defaults: true,
            seed_sample_stacks: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("HABIT_STATE_PATH") {
            let path = path.trim();
            if !path.is_empty() {
                info!(path = %path, "using state file");
                config.state_path = Some(PathBuf::from(path));
            }
        }
        if let Some(raw) = lookup("HABIT_SEED_DEFAULTS") {
            config.seed_defaults = parse_flag("HABIT_SEED_DEFAULTS", &raw, config.seed_defaults);
        }
        if let Some(raw) = lookup("HABIT_SEED_SAMPLE_STACKS") {
            config.seed_sample_stacks =
                parse_flag("HABIT_SEED_SAMPLE_STACKS", &raw, config.seed_sample_stacks);
        }
        if config.seed_sample_stacks && !config.seed_defaults {
            warn!("sample stacks need the default catalog; skipping them");
            config.seed_sample_stacks = false;
        }
        config
    }
}

fn parse_flag(key: &str, raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            warn!(key, value = other, default, "unrecognised flag value");
            default
        }
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use carelink_core::staff::StaffUser;
use carelink_events::{ConfigError, FanOutConfig, SmsConfig};

/// Notifier configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// JSON file holding the staff roster (array of staff users).
    pub staff_roster_path: PathBuf,
    pub fanout: FanOutConfig,
    /// `None` when SMS delivery is disabled.
    pub sms: Option<SmsConfig>,
}

impl NotifierConfig {
    /// | Env Var             | Default  |
    /// |---------------------|----------|
    /// | `STAFF_ROSTER_PATH` | required |
    ///
    /// See [`FanOutConfig::from_env`] and [`SmsConfig::from_env`] for the rest.
    pub fn from_env() -> Result<Self, ConfigError> {
        let staff_roster_path = std::env::var("STAFF_ROSTER_PATH")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::Missing("STAFF_ROSTER_PATH"))?;

        Ok(Self {
            staff_roster_path,
            fanout: FanOutConfig::from_env()?,
            sms: SmsConfig::from_env()?,
        })
    }
}

pub fn load_roster(path: &Path) -> anyhow::Result<Vec<StaffUser>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read staff roster {}", path.display()))?;
    parse_roster(&raw).with_context(|| format!("Invalid staff roster {}", path.display()))
}

fn parse_roster(raw: &str) -> Result<Vec<StaffUser>, serde_json::Error> {
    serde_json::from_str(raw)
}

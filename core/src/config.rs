use crate::types::MAX_HORIZON_DAYS;
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

/// Tunables for window size and deadline placement.
/// Every field has a default; a config file only needs the fields it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Inclusive length of the materialised completion window.
    pub max_horizon_days:   u32,
    /// Local wall-clock on-time deadline for morning steps.
    pub morning_deadline:   NaiveTime,
    /// Local wall-clock on-time deadline for evening steps.
    pub evening_deadline:   NaiveTime,
    /// How long after the on-time deadline a step may still be completed late.
    pub grace_period_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_horizon_days:   MAX_HORIZON_DAYS,
            morning_deadline:   NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            evening_deadline:   NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
            grace_period_hours: 24,
        }
    }
}

impl SchedulerConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_horizon_days == 0 {
            anyhow::bail!("max_horizon_days must be at least 1");
        }
        if self.grace_period_hours == 0 {
            anyhow::bail!("grace_period_hours must be at least 1");
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::hours(i64::from(self.grace_period_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "max_horizon_days": 30 }"#).unwrap();
        assert_eq!(config.max_horizon_days, 30);
        assert_eq!(config.grace_period_hours, 24);
        assert_eq!(config.morning_deadline, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(config.evening_deadline, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let config = SchedulerConfig { max_horizon_days: 0, ..SchedulerConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SchedulerConfig::load("/nonexistent/scheduler.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }
}

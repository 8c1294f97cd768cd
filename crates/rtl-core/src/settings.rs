//! Runtime settings of the damage and loss engine.

use crate::accumulator::FragilityMode;
use crate::error::{LossError, LossResult};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// Numerical and behavioural knobs shared by every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Whether engine damage already accounts for pre-existing damage.
    #[serde(default)]
    pub state_dependent: bool,

    /// Largest negative engine value tolerated, as a share of the row total.
    #[serde(default = "default_negative_tolerance")]
    pub negative_tolerance: f64,

    /// Rows with fewer buildings than this are dropped after redistribution.
    #[serde(default = "default_prune_epsilon")]
    pub prune_epsilon: f64,

    /// Prior weights summing to less than this fall back to a uniform split.
    #[serde(default = "default_weight_epsilon")]
    pub weight_epsilon: f64,

    /// Days after an event covered by recovery timelines.
    #[serde(default = "default_recovery_horizon_days")]
    pub recovery_horizon_days: i64,

    /// Prefix of the asset ids generated for each new snapshot.
    #[serde(default = "default_asset_id_prefix")]
    pub asset_id_prefix: String,

    /// Fixed offset of local time from UTC, in hours.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

fn default_negative_tolerance() -> f64 {
    1e-4
}

fn default_prune_epsilon() -> f64 {
    1e-10
}

fn default_weight_epsilon() -> f64 {
    1e-12
}

fn default_recovery_horizon_days() -> i64 {
    3650
}

fn default_asset_id_prefix() -> String {
    "res_".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            state_dependent: false,
            negative_tolerance: default_negative_tolerance(),
            prune_epsilon: default_prune_epsilon(),
            weight_epsilon: default_weight_epsilon(),
            recovery_horizon_days: default_recovery_horizon_days(),
            asset_id_prefix: default_asset_id_prefix(),
            utc_offset_hours: 0,
        }
    }
}

impl EngineSettings {
    /// Fragility semantics implied by `state_dependent`.
    pub fn fragility_mode(&self) -> FragilityMode {
        FragilityMode::from_flag(self.state_dependent)
    }

    /// Local time offset.
    pub fn utc_offset(&self) -> LossResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            LossError::InvalidSettings(format!(
                "utc_offset_hours {} is out of range",
                self.utc_offset_hours
            ))
        })
    }

    /// Checks value ranges.
    pub fn validate(&self) -> LossResult<()> {
        if is_negative_or_nan(self.negative_tolerance) {
            return Err(LossError::InvalidSettings(
                "negative_tolerance must be non-negative".to_string(),
            ));
        }
        if is_negative_or_nan(self.prune_epsilon) || is_negative_or_nan(self.weight_epsilon) {
            return Err(LossError::InvalidSettings(
                "prune_epsilon and weight_epsilon must be non-negative".to_string(),
            ));
        }
        if self.recovery_horizon_days <= 0 {
            return Err(LossError::InvalidSettings(
                "recovery_horizon_days must be positive".to_string(),
            ));
        }
        if self.asset_id_prefix.is_empty() {
            return Err(LossError::InvalidSettings(
                "asset_id_prefix must not be empty".to_string(),
            ));
        }
        self.utc_offset().map(|_| ())
    }
}

fn is_negative_or_nan(value: f64) -> bool {
    value.is_nan() || value < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fragility_mode(), FragilityMode::StateIndependent);
        assert_eq!(settings.negative_tolerance, 1e-4);
        assert_eq!(settings.prune_epsilon, 1e-10);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"state_dependent": true, "utc_offset_hours": 2}"#).unwrap();
        assert_eq!(settings.fragility_mode(), FragilityMode::StateDependent);
        assert_eq!(settings.recovery_horizon_days, 3650);
        assert_eq!(settings.utc_offset().unwrap().local_minus_utc(), 7200);
    }

    #[test]
    fn test_invalid_values() {
        let settings = EngineSettings {
            negative_tolerance: -1.0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(LossError::InvalidSettings(_))));

        let settings = EngineSettings {
            utc_offset_hours: 30,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}

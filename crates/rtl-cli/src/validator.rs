//! Configuration validation for the real-time loss CLI.
//!
//! Checks run before any calculation so that a sequence never stops halfway
//! through on a configuration gap.

use crate::config::AppConfig;
use crate::io::{read_triggers, AnalysisType};
use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent a run.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent a run.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Creates a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates the configuration and the input tree under `main_path`.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the application configuration.
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_damage_states(config, &mut result);
        Self::validate_injuries_scale(config, &mut result);
        Self::validate_engine_settings(config, &mut result);
        Self::validate_oelf(config, &mut result);
        Self::validate_inputs(config, &mut result);

        result
    }

    fn validate_damage_states(config: &AppConfig, result: &mut ValidationResult) {
        if config.mapping_damage_states.is_empty() {
            result.add_error("mapping_damage_states is empty");
            return;
        }
        if config.mapping_damage_states.len() < 2 {
            result.add_warning(
                "mapping_damage_states has a single state; no damage can ever be recorded",
            );
        }

        let mut engine = HashSet::new();
        let mut fragility = HashSet::new();
        for labels in &config.mapping_damage_states {
            if !engine.insert(labels.engine.as_str()) {
                result.add_error(format!(
                    "Damage state '{}' appears more than once in mapping_damage_states",
                    labels.engine
                ));
            }
            if !fragility.insert(labels.fragility.as_str()) {
                result.add_error(format!(
                    "Damage state '{}' appears more than once in mapping_damage_states",
                    labels.fragility
                ));
            }
            if labels.fragility.contains('/') {
                result.add_error(format!(
                    "Fragility label '{}' must not contain '/'",
                    labels.fragility
                ));
            }
        }
    }

    fn validate_injuries_scale(config: &AppConfig, result: &mut ValidationResult) {
        if config.injuries_scale.is_empty() {
            result.add_error("injuries_scale is empty");
            return;
        }
        let mut seen = HashSet::new();
        for severity in &config.injuries_scale {
            if !seen.insert(severity.as_str()) {
                result.add_error(format!(
                    "Injury severity '{}' appears more than once in injuries_scale",
                    severity
                ));
            }
        }
    }

    fn validate_engine_settings(config: &AppConfig, result: &mut ValidationResult) {
        if let Err(e) = config.engine_settings().validate() {
            result.add_error(e.to_string());
        }
        if config.engine.state_dependent && !config.state_dependent_fragilities {
            result.add_warning(
                "engine.state_dependent is set but state_dependent_fragilities is not; \
                 state-dependent semantics are used",
            );
        }
    }

    fn validate_oelf(config: &AppConfig, result: &mut ValidationResult) {
        let oelf = &config.oelf;
        if oelf.max_distance_km.is_nan() || oelf.max_distance_km <= 0.0 {
            result.add_error(format!(
                "oelf.max_distance_km must be positive, got {}",
                oelf.max_distance_km
            ));
        }
        if oelf.continuous_ses_numbering && oelf.ses_range[0] > oelf.ses_range[1] {
            result.add_error(format!(
                "oelf.ses_range [{}, {}] is inverted",
                oelf.ses_range[0], oelf.ses_range[1]
            ));
        }
        if oelf.min_magnitude < 0.0 {
            result.add_warning(format!(
                "oelf.min_magnitude is negative ({}); every forecast earthquake passes the \
                 magnitude filter",
                oelf.min_magnitude
            ));
        }
    }

    fn validate_inputs(config: &AppConfig, result: &mut ValidationResult) {
        let layout = config.layout();

        if !config.main_path.is_dir() {
            result.add_error(format!(
                "main_path '{}' is not a directory",
                config.main_path.display()
            ));
            return;
        }

        let mut required = vec![
            layout.triggers(),
            layout.undamaged_inventory(),
            layout.economic_consequences(),
            layout.occupancy_recovery(),
            layout.injury_recovery(),
        ];
        required.extend(
            config
                .injuries_scale
                .iter()
                .map(|s| layout.injury_consequences(s)),
        );
        for path in &required {
            Self::require_file(path, result);
        }

        if layout.current_inventory().exists() {
            result.add_warning(format!(
                "{} already exists; the directory may hold a previous run",
                layout.current_inventory().display()
            ));
        }

        let Ok(triggers) = read_triggers(&layout.triggers()) else {
            if layout.triggers().exists() {
                result.add_error(format!(
                    "Failed to parse {}",
                    layout.triggers().display()
                ));
            }
            return;
        };
        if triggers.is_empty() {
            result.add_warning("triggering.csv lists no calculations");
        }
        for trigger in &triggers {
            Self::require_file(&layout.catalogue(&trigger.catalogue_filename), result);
        }
        if triggers
            .iter()
            .any(|t| t.type_analysis == AnalysisType::Rla)
            && !layout.monitoring().exists()
        {
            result.add_warning(format!(
                "{} not found; engine damage is used for every building",
                layout.monitoring().display()
            ));
        }
    }

    fn require_file(path: &Path, result: &mut ValidationResult) {
        if !path.is_file() {
            result.add_error(format!("Missing input file: {}", path.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtl_core::DamageStateLabels;
    use tempfile::TempDir;

    fn default_config() -> AppConfig {
        AppConfig::default()
    }

    fn labels(engine: &str, fragility: &str) -> DamageStateLabels {
        DamageStateLabels {
            engine: engine.to_string(),
            fragility: fragility.to_string(),
        }
    }

    #[test]
    fn test_default_damage_states_valid() {
        let mut result = ValidationResult::new();
        ConfigValidator::validate_damage_states(&default_config(), &mut result);
        assert!(!result.has_errors());
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_duplicate_damage_state() {
        let mut config = default_config();
        config.mapping_damage_states = vec![labels("no_damage", "DS0"), labels("dmg_1", "DS0")];

        let mut result = ValidationResult::new();
        ConfigValidator::validate_damage_states(&config, &mut result);

        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_empty_injuries_scale() {
        let mut config = default_config();
        config.injuries_scale.clear();

        let mut result = ValidationResult::new();
        ConfigValidator::validate_injuries_scale(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_inverted_ses_range() {
        let mut config = default_config();
        config.oelf.continuous_ses_numbering = true;
        config.oelf.ses_range = [10, 1];

        let mut result = ValidationResult::new();
        ConfigValidator::validate_oelf(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_inverted_range_ignored_without_continuous_numbering() {
        let mut config = default_config();
        config.oelf.ses_range = [10, 1];

        let mut result = ValidationResult::new();
        ConfigValidator::validate_oelf(&config, &mut result);

        assert!(!result.has_errors());
    }

    #[test]
    fn test_non_positive_distance() {
        for distance in [0.0, -5.0, f64::NAN] {
            let mut config = default_config();
            config.oelf.max_distance_km = distance;

            let mut result = ValidationResult::new();
            ConfigValidator::validate_oelf(&config, &mut result);

            assert!(result.has_errors(), "distance {} should be rejected", distance);
        }
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut config = default_config();
        config.engine.negative_tolerance = -1.0;

        let mut result = ValidationResult::new();
        ConfigValidator::validate_engine_settings(&config, &mut result);

        assert!(result.has_errors());
    }

    #[test]
    fn test_missing_inputs_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = default_config();
        config.main_path = dir.path().to_path_buf();
        config.injuries_scale = vec!["1".to_string()];

        let mut result = ValidationResult::new();
        ConfigValidator::validate_inputs(&config, &mut result);

        // triggers, inventory, economic, two recovery files and one injury model
        assert_eq!(result.errors.len(), 6);
    }

    #[test]
    fn test_missing_main_path() {
        let mut config = default_config();
        config.main_path = "/nonexistent/realtime-loss".into();

        let mut result = ValidationResult::new();
        ConfigValidator::validate_inputs(&config, &mut result);

        assert_eq!(result.errors.len(), 1);
    }
}

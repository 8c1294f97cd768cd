//! Configuration loading for the real-time loss CLI.

use anyhow::{Context, Result};
use rtl_core::{DamageStateLabels, DamageStateScale, EngineSettings, SesNumbering, TimeOfDayFactors};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Free-text description prepended to run outputs.
    #[serde(default)]
    pub description: String,

    /// Root directory holding inputs and receiving outputs.
    #[serde(default = "default_main_path")]
    pub main_path: PathBuf,

    /// Damage states from least to most severe, with their engine and fragility labels.
    #[serde(default = "default_mapping_damage_states")]
    pub mapping_damage_states: Vec<DamageStateLabels>,

    /// Injury severity levels, in column order.
    #[serde(default = "default_injuries_scale")]
    pub injuries_scale: Vec<String>,

    /// Whether the damage engine uses state-dependent fragility models.
    #[serde(default)]
    pub state_dependent_fragilities: bool,

    /// Share of census occupants indoors per occupancy type and period.
    #[serde(default = "default_time_of_day_occupancy")]
    pub time_of_day_occupancy: TimeOfDayFactors,

    /// Numerical settings of the damage and loss engine.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Forecast settings.
    #[serde(default)]
    pub oelf: OelfConfig,

    /// Whether inventory snapshots and damage tables are written after every event.
    #[serde(default)]
    pub store_intermediate: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_main_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_mapping_damage_states() -> Vec<DamageStateLabels> {
    DamageStateScale::five_state().labels().to_vec()
}

fn default_injuries_scale() -> Vec<String> {
    ["1", "2", "3", "4"].iter().map(|s| s.to_string()).collect()
}

fn default_time_of_day_occupancy() -> TimeOfDayFactors {
    use rtl_core::PerPeriod;
    TimeOfDayFactors::new()
        .with_occupancy(
            "Res",
            PerPeriod {
                day: 0.242853,
                night: 0.9916,
                transit: 0.5507,
            },
        )
        .with_occupancy(
            "Com",
            PerPeriod {
                day: 0.4292,
                night: 0.0,
                transit: 0.0887,
            },
        )
        .with_occupancy(
            "Ind",
            PerPeriod {
                day: 0.4292,
                night: 0.0,
                transit: 0.0887,
            },
        )
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            main_path: default_main_path(),
            mapping_damage_states: default_mapping_damage_states(),
            injuries_scale: default_injuries_scale(),
            state_dependent_fragilities: false,
            time_of_day_occupancy: default_time_of_day_occupancy(),
            engine: EngineSettings::default(),
            oelf: OelfConfig::default(),
            store_intermediate: false,
            logging: LoggingSection::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Saves configuration to a file.
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Ordered damage-state scale.
    pub fn damage_scale(&self) -> Result<DamageStateScale> {
        DamageStateScale::from_labels(self.mapping_damage_states.clone())
            .context("Invalid mapping_damage_states")
    }

    /// Engine settings with the fragility flag applied.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            state_dependent: self.engine.state_dependent || self.state_dependent_fragilities,
            ..self.engine.clone()
        }
    }

    /// Input and output locations under `main_path`.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.main_path)
    }
}

/// Forecast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OelfConfig {
    /// Earthquakes below this magnitude are not assessed.
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,

    /// Earthquakes farther than this from every exposure location are not assessed.
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,

    /// Whether every SES id of `ses_range` exists, including SES with no earthquakes.
    #[serde(default)]
    pub continuous_ses_numbering: bool,

    /// First and last SES id when numbering is continuous.
    #[serde(default = "default_ses_range")]
    pub ses_range: [u32; 2],
}

fn default_min_magnitude() -> f64 {
    3.5
}

fn default_max_distance_km() -> f64 {
    200.0
}

fn default_ses_range() -> [u32; 2] {
    [1, 1]
}

impl Default for OelfConfig {
    fn default() -> Self {
        Self {
            min_magnitude: default_min_magnitude(),
            max_distance_km: default_max_distance_km(),
            continuous_ses_numbering: false,
            ses_range: default_ses_range(),
        }
    }
}

impl OelfConfig {
    /// SES enumeration implied by the configuration.
    pub fn numbering(&self) -> SesNumbering {
        if self.continuous_ses_numbering {
            SesNumbering::Continuous {
                first: self.ses_range[0],
                last: self.ses_range[1],
            }
        } else {
            SesNumbering::FromCatalogue
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Directory structure under `main_path`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn triggers(&self) -> PathBuf {
        self.root.join("triggering.csv")
    }

    pub fn catalogue(&self, filename: &str) -> PathBuf {
        self.root.join("catalogues").join(filename)
    }

    pub fn undamaged_inventory(&self) -> PathBuf {
        self.root
            .join("exposure_models")
            .join("exposure_model_undamaged.csv")
    }

    pub fn current_inventory(&self) -> PathBuf {
        self.root.join("current").join("exposure_model_current.csv")
    }

    pub fn economic_consequences(&self) -> PathBuf {
        self.root.join("static").join("consequences_economic.csv")
    }

    pub fn injury_consequences(&self, severity: &str) -> PathBuf {
        self.root
            .join("static")
            .join(format!("consequences_injuries_severity_{severity}.csv"))
    }

    pub fn occupancy_recovery(&self) -> PathBuf {
        self.root.join("static").join("recovery_damage.csv")
    }

    pub fn injury_recovery(&self) -> PathBuf {
        self.root.join("static").join("recovery_injuries.csv")
    }

    pub fn monitoring(&self) -> PathBuf {
        self.root.join("shm").join("damage_results_shm.csv")
    }

    /// Precomputed engine damage for rapid loss assessment.
    pub fn rla_damage(&self) -> PathBuf {
        self.root.join("damage_engine").join("rla")
    }

    /// Precomputed engine damage for one forecast.
    pub fn oelf_damage(&self, forecast: &str) -> PathBuf {
        self.root.join("damage_engine").join("oelf").join(forecast)
    }

    pub fn rla_intermediate(&self) -> PathBuf {
        self.root.join("exposure_models").join("rla")
    }

    pub fn oelf_intermediate(&self, forecast: &str) -> PathBuf {
        self.root.join("exposure_models").join("oelf").join(forecast)
    }

    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.mapping_damage_states.len(), 5);
        assert_eq!(config.injuries_scale, vec!["1", "2", "3", "4"]);
        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.oelf.numbering(), SesNumbering::FromCatalogue);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
description: "L'Aquila sequence"
main_path: /data/laquila
mapping_damage_states:
  - { engine: no_damage, fragility: DS0 }
  - { engine: dmg_1, fragility: DS1 }
  - { engine: dmg_2, fragility: DS2 }
injuries_scale: ["1", "2"]
state_dependent_fragilities: true
time_of_day_occupancy:
  Res: { day: 0.25, night: 1.0, transit: 0.5 }
engine:
  negative_tolerance: 0.001
  utc_offset_hours: 2
oelf:
  min_magnitude: 4.0
  max_distance_km: 150
  continuous_ses_numbering: true
  ses_range: [1, 1000]
store_intermediate: true
logging:
  level: debug
  json: true
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.main_path, PathBuf::from("/data/laquila"));
        assert_eq!(config.damage_scale().unwrap().len(), 3);
        assert!(config.time_of_day_occupancy.contains("Res"));
        assert!(!config.time_of_day_occupancy.contains("Com"));

        let settings = config.engine_settings();
        assert!(settings.state_dependent);
        assert_eq!(settings.negative_tolerance, 0.001);
        assert_eq!(settings.utc_offset_hours, 2);
        assert_eq!(settings.prune_epsilon, 1e-10);

        assert_eq!(
            config.oelf.numbering(),
            SesNumbering::Continuous {
                first: 1,
                last: 1000
            }
        );
        assert!(config.store_intermediate);
        assert!(config.logging.json);
    }

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new(Path::new("/runs/a"));
        assert_eq!(
            layout.current_inventory(),
            PathBuf::from("/runs/a/current/exposure_model_current.csv")
        );
        assert_eq!(
            layout.injury_consequences("2"),
            PathBuf::from("/runs/a/static/consequences_injuries_severity_2.csv")
        );
        assert_eq!(
            layout.oelf_damage("forecast_01"),
            PathBuf::from("/runs/a/damage_engine/oelf/forecast_01")
        );
    }
}

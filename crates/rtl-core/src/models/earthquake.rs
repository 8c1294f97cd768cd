//! Earthquake records.

use super::asset::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One earthquake to assess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earthquake {
    /// Identifier, unique within its event set.
    pub event_id: String,
    /// Origin time.
    pub time: DateTime<Utc>,
    /// Moment magnitude.
    pub magnitude: f64,
    /// Epicentre.
    pub epicentre: Location,
    /// Hypocentral depth in km, when known.
    #[serde(default)]
    pub depth_km: Option<f64>,
}

impl Earthquake {
    /// Creates an earthquake with no depth.
    pub fn new(
        event_id: impl Into<String>,
        time: DateTime<Utc>,
        magnitude: f64,
        epicentre: Location,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            time,
            magnitude,
            epicentre,
            depth_km: None,
        }
    }
}

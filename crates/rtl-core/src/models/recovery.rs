//! Recovery models: day offsets before occupants return or are discharged.

use crate::damage_state::DamageState;
use crate::error::{LossError, LossResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Days after an event before occupants may re-enter buildings in each damage state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OccupancyRecoveryModel {
    days: BTreeMap<DamageState, i64>,
}

impl OccupancyRecoveryModel {
    /// Creates a model from days per damage state.
    pub fn new(days: BTreeMap<DamageState, i64>) -> Self {
        Self { days }
    }

    /// Creates a model from days in scale order.
    pub fn from_days(days: impl IntoIterator<Item = i64>) -> Self {
        Self {
            days: days
                .into_iter()
                .enumerate()
                .map(|(i, d)| (DamageState::new(i as u8), d))
                .collect(),
        }
    }

    /// Offset for a damage state.
    pub fn days(&self, state: DamageState) -> LossResult<i64> {
        self.days
            .get(&state)
            .copied()
            .ok_or_else(|| LossError::MissingRecoveryEntry(state.to_string()))
    }
}

/// Days after an event before an injured occupant of each severity is discharged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjuryRecoveryModel {
    days: BTreeMap<String, i64>,
}

impl InjuryRecoveryModel {
    /// Creates a model from days per severity label.
    pub fn new(days: BTreeMap<String, i64>) -> Self {
        Self { days }
    }

    /// Adds or replaces one severity.
    pub fn with_severity(mut self, severity: impl Into<String>, days: i64) -> Self {
        self.days.insert(severity.into(), days);
        self
    }

    /// Offset for a severity level.
    pub fn days(&self, severity: &str) -> LossResult<i64> {
        self.days
            .get(severity)
            .copied()
            .ok_or_else(|| LossError::MissingRecoveryEntry(severity.to_string()))
    }
}

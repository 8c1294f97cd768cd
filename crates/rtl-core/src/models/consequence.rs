//! Consequence (loss-ratio) models.

use crate::damage_state::DamageState;
use crate::error::{LossError, LossResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Loss ratios in percent per building class and damage state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsequenceModel {
    /// Model name used in error messages (`economic`, `injuries_1`, ...).
    pub name: String,
    ratios: HashMap<String, Vec<f64>>,
}

impl ConsequenceModel {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ratios: HashMap::new(),
        }
    }

    /// Adds the percentages of a building class, least severe state first.
    pub fn with_class(mut self, building_class: impl Into<String>, percentages: Vec<f64>) -> Self {
        self.ratios.insert(building_class.into(), percentages);
        self
    }

    /// Inserts or replaces the percentages of a building class.
    pub fn insert(&mut self, building_class: impl Into<String>, percentages: Vec<f64>) {
        self.ratios.insert(building_class.into(), percentages);
    }

    /// Loss ratio as a fraction (percentage / 100).
    pub fn loss_ratio(&self, building_class: &str, state: DamageState) -> LossResult<f64> {
        self.ratios
            .get(building_class)
            .and_then(|r| r.get(state.index()))
            .map(|pct| pct / 100.0)
            .ok_or_else(|| LossError::MissingConsequence {
                building_class: building_class.to_string(),
                model: self.name.clone(),
            })
    }

    /// Building classes among `classes` with no complete entry for `states` damage
    /// states.
    pub fn missing_classes<'a, I>(&self, classes: I, states: usize) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        classes
            .into_iter()
            .filter(|c| self.ratios.get(*c).map_or(true, |r| r.len() < states))
            .map(str::to_string)
            .collect()
    }
}

/// One consequence model per injury severity, in severity order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjuryConsequences {
    models: Vec<ConsequenceModel>,
}

impl InjuryConsequences {
    /// Creates the set from models named after their severity level.
    pub fn new(models: Vec<ConsequenceModel>) -> Self {
        Self { models }
    }

    /// Severity labels in order.
    pub fn severities(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    /// Models in severity order.
    pub fn models(&self) -> &[ConsequenceModel] {
        &self.models
    }

    /// Number of severity levels.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no severity levels exist.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

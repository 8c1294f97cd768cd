//! Ordered damage-state scale.
//!
//! A [`DamageState`] is an ordinal position in a [`DamageStateScale`], from the
//! least severe state (index 0) to the most severe one. The scale also carries the
//! two vocabularies used for each state: the label emitted by the damage engine
//! (e.g. `dmg_2`) and the label of the fragility model (e.g. `DS2`), which is the
//! trailing token of building-class strings such as `CR/LFINF/H:1/DS2`.

use crate::error::{LossError, LossResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Separator between the building class and its damage-state token.
pub const CLASS_SEPARATOR: char = '/';

/// Position of a damage state in its scale (0 = least severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DamageState(u8);

impl DamageState {
    /// The least severe state of every scale.
    pub const UNDAMAGED: DamageState = DamageState(0);

    /// Creates a damage state from its ordinal.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Ordinal position in the scale.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DamageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Labels of one damage state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageStateLabels {
    /// Label used by the damage engine.
    pub engine: String,
    /// Label used by the fragility model and in building-class strings.
    pub fragility: String,
}

/// Ordered list of damage states with a bidirectional label mapping.
#[derive(Debug, Clone)]
pub struct DamageStateScale {
    labels: Vec<DamageStateLabels>,
    by_engine: HashMap<String, DamageState>,
    by_fragility: HashMap<String, DamageState>,
}

impl DamageStateScale {
    /// Builds a scale from `(engine label, fragility label)` pairs ordered from the
    /// least to the most severe state.
    pub fn from_pairs<I, E, F>(pairs: I) -> LossResult<Self>
    where
        I: IntoIterator<Item = (E, F)>,
        E: Into<String>,
        F: Into<String>,
    {
        let labels: Vec<DamageStateLabels> = pairs
            .into_iter()
            .map(|(engine, fragility)| DamageStateLabels {
                engine: engine.into(),
                fragility: fragility.into(),
            })
            .collect();
        Self::from_labels(labels)
    }

    /// Builds a scale from ordered label records.
    pub fn from_labels(labels: Vec<DamageStateLabels>) -> LossResult<Self> {
        if labels.is_empty() {
            return Err(LossError::EmptyDamageScale);
        }
        if labels.len() > u8::MAX as usize {
            return Err(LossError::InvalidSettings(format!(
                "damage state scale has {} entries, at most {} are supported",
                labels.len(),
                u8::MAX
            )));
        }

        let mut by_engine = HashMap::with_capacity(labels.len());
        let mut by_fragility = HashMap::with_capacity(labels.len());
        for (i, entry) in labels.iter().enumerate() {
            let state = DamageState(i as u8);
            if by_engine.insert(entry.engine.clone(), state).is_some() {
                return Err(LossError::DuplicateDamageState(entry.engine.clone()));
            }
            if by_fragility.insert(entry.fragility.clone(), state).is_some() {
                return Err(LossError::DuplicateDamageState(entry.fragility.clone()));
            }
        }

        Ok(Self {
            labels,
            by_engine,
            by_fragility,
        })
    }

    /// The conventional five-state scale `no_damage, dmg_1..dmg_4` / `DS0..DS4`.
    pub fn five_state() -> Self {
        let labels = (0..5)
            .map(|i| DamageStateLabels {
                engine: if i == 0 {
                    "no_damage".to_string()
                } else {
                    format!("dmg_{i}")
                },
                fragility: format!("DS{i}"),
            })
            .collect::<Vec<_>>();
        let by_engine = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.engine.clone(), DamageState(i as u8)))
            .collect();
        let by_fragility = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.fragility.clone(), DamageState(i as u8)))
            .collect();
        Self {
            labels,
            by_engine,
            by_fragility,
        }
    }

    /// Number of damage states.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: construction rejects empty scales.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All states, least severe first.
    pub fn states(&self) -> impl DoubleEndedIterator<Item = DamageState> + ExactSizeIterator {
        (0..self.labels.len()).map(|i| DamageState(i as u8))
    }

    /// The most severe state.
    pub fn most_severe(&self) -> DamageState {
        DamageState((self.labels.len() - 1) as u8)
    }

    /// Label records in severity order.
    pub fn labels(&self) -> &[DamageStateLabels] {
        &self.labels
    }

    /// Resolves an engine label.
    pub fn from_engine_label(&self, label: &str) -> LossResult<DamageState> {
        self.by_engine
            .get(label)
            .copied()
            .ok_or_else(|| LossError::UnknownDamageState(label.to_string()))
    }

    /// Resolves a fragility label.
    pub fn from_fragility_label(&self, label: &str) -> LossResult<DamageState> {
        self.by_fragility
            .get(label)
            .copied()
            .ok_or_else(|| LossError::UnknownDamageState(label.to_string()))
    }

    /// Engine label of a state.
    pub fn engine_label(&self, state: DamageState) -> &str {
        &self.labels[state.index()].engine
    }

    /// Fragility label of a state.
    pub fn fragility_label(&self, state: DamageState) -> &str {
        &self.labels[state.index()].fragility
    }

    /// Whether `state` belongs to this scale.
    pub fn contains(&self, state: DamageState) -> bool {
        state.index() < self.labels.len()
    }

    /// Splits a building-class string into its class and damage state.
    ///
    /// `"CR/LFINF/H:1/DS2"` yields `("CR/LFINF/H:1", DS2)`.
    pub fn parse_building_class(&self, taxonomy: &str) -> LossResult<(String, DamageState)> {
        let (class, token) = taxonomy
            .rsplit_once(CLASS_SEPARATOR)
            .ok_or_else(|| LossError::MalformedBuildingClass(taxonomy.to_string()))?;
        let state = self.from_fragility_label(token)?;
        Ok((class.to_string(), state))
    }

    /// Joins a class and a damage state into a building-class string.
    pub fn format_building_class(&self, class: &str, state: DamageState) -> String {
        format!("{}{}{}", class, CLASS_SEPARATOR, self.fragility_label(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_ordering_and_lookup() {
        let scale = DamageStateScale::five_state();
        assert_eq!(scale.len(), 5);
        assert_eq!(scale.from_engine_label("no_damage").unwrap(), DamageState::UNDAMAGED);
        assert_eq!(scale.from_engine_label("dmg_3").unwrap(), DamageState::new(3));
        assert_eq!(scale.from_fragility_label("DS4").unwrap(), scale.most_severe());
        assert_eq!(scale.engine_label(DamageState::new(2)), "dmg_2");
        assert_eq!(scale.fragility_label(DamageState::new(1)), "DS1");
    }

    #[test]
    fn test_from_pairs_matches_five_state() {
        let scale = DamageStateScale::from_pairs([
            ("no_damage", "DS0"),
            ("dmg_1", "DS1"),
            ("dmg_2", "DS2"),
            ("dmg_3", "DS3"),
            ("dmg_4", "DS4"),
        ])
        .unwrap();
        assert_eq!(scale.labels(), DamageStateScale::five_state().labels());
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let dup = DamageStateScale::from_pairs([("no_damage", "DS0"), ("dmg_1", "DS0")]);
        assert!(matches!(dup, Err(LossError::DuplicateDamageState(l)) if l == "DS0"));

        let empty = DamageStateScale::from_pairs(Vec::<(String, String)>::new());
        assert!(matches!(empty, Err(LossError::EmptyDamageScale)));
    }

    #[test]
    fn test_unknown_label() {
        let scale = DamageStateScale::five_state();
        assert!(matches!(
            scale.from_engine_label("complete"),
            Err(LossError::UnknownDamageState(_))
        ));
    }

    #[test]
    fn test_building_class_round_trip() {
        let scale = DamageStateScale::five_state();
        let (class, state) = scale.parse_building_class("CR/LFINF+CDN/H:1/DS2").unwrap();
        assert_eq!(class, "CR/LFINF+CDN/H:1");
        assert_eq!(state, DamageState::new(2));
        assert_eq!(
            scale.format_building_class(&class, DamageState::new(3)),
            "CR/LFINF+CDN/H:1/DS3"
        );
    }

    #[test]
    fn test_building_class_without_suffix() {
        let scale = DamageStateScale::five_state();
        assert!(matches!(
            scale.parse_building_class("CR"),
            Err(LossError::MalformedBuildingClass(_))
        ));
        assert!(matches!(
            scale.parse_building_class("CR/LFINF"),
            Err(LossError::UnknownDamageState(_))
        ));
    }
}

//! Damage tables keyed by `(entity, damage state)`.

use crate::damage_state::{DamageState, DamageStateScale};
use crate::error::{LossError, LossResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Probability or building count per entity and damage state.
///
/// The entity is an asset, an original asset or a building depending on the stage of
/// the pipeline. Absent entries read as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageTable<K: Ord> {
    values: BTreeMap<(K, DamageState), f64>,
}

impl<K: Ord> Default for DamageTable<K> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> DamageTable<K> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, replacing any previous one.
    pub fn insert(&mut self, entity: K, state: DamageState, value: f64) {
        self.values.insert((entity, state), value);
    }

    /// Adds to a value.
    pub fn add(&mut self, entity: K, state: DamageState, value: f64) {
        *self.values.entry((entity, state)).or_insert(0.0) += value;
    }

    /// Stored value, if any.
    pub fn get(&self, entity: &K, state: DamageState) -> Option<f64> {
        self.values.get(&(entity.clone(), state)).copied()
    }

    /// Stored value or zero.
    pub fn value(&self, entity: &K, state: DamageState) -> f64 {
        self.get(entity, state).unwrap_or(0.0)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in `(entity, state)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, DamageState, f64)> + '_ {
        self.values.iter().map(|((k, s), v)| (k, *s, *v))
    }

    /// Distinct entities.
    pub fn entities(&self) -> BTreeSet<&K> {
        self.values.keys().map(|(k, _)| k).collect()
    }

    /// Distinct damage states.
    pub fn damage_states(&self) -> BTreeSet<DamageState> {
        self.values.keys().map(|(_, s)| *s).collect()
    }

    /// Entries of one entity, least severe first.
    pub fn row(&self, entity: &K) -> impl Iterator<Item = (DamageState, f64)> + '_ {
        let start = (entity.clone(), DamageState::new(0));
        let end = (entity.clone(), DamageState::new(u8::MAX));
        self.values.range(start..=end).map(|((_, s), v)| (*s, *v))
    }

    /// Values of one entity as a dense vector over `states` damage states.
    pub fn row_vector(&self, entity: &K, states: usize) -> Vec<f64> {
        let mut dense = vec![0.0; states];
        for (state, value) in self.row(entity) {
            if let Some(slot) = dense.get_mut(state.index()) {
                *slot = value;
            }
        }
        dense
    }

    /// Sum of one entity's values.
    pub fn row_total(&self, entity: &K) -> f64 {
        self.row(entity).map(|(_, v)| v).sum()
    }

    /// Sum of all values.
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Inserts an explicit zero for every damage state missing from every entity.
    pub fn fill_missing<'a, I>(&mut self, entities: I, scale: &DamageStateScale)
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        for entity in entities {
            for state in scale.states() {
                self.values.entry((entity.clone(), state)).or_insert(0.0);
            }
        }
    }

    /// Re-keys every entry through `group` and sums entries sharing a new key.
    pub fn aggregate<G, F>(&self, mut group: F) -> LossResult<DamageTable<G>>
    where
        G: Ord + Clone,
        F: FnMut(&K) -> LossResult<G>,
    {
        let mut out = DamageTable::new();
        for ((entity, state), value) in &self.values {
            out.add(group(entity)?, *state, *value);
        }
        Ok(out)
    }

}

impl<K: Ord + Clone + Display> DamageTable<K> {
    /// Removes small negative artifacts produced by the damage engine.
    ///
    /// For every entity with a negative entry, the largest negative magnitude is
    /// compared with the entity's total. Beyond `tolerance` the table is rejected;
    /// otherwise negatives become zero and the remaining entries are rescaled so the
    /// entity keeps its total. Returns the cleaned table and the number of entities
    /// that were adjusted.
    pub fn clip_negative(&self, tolerance: f64) -> LossResult<(Self, usize)> {
        let mut out = self.clone();
        let mut clipped = 0;

        for entity in self.entities() {
            let row: Vec<(DamageState, f64)> = self.row(entity).collect();
            let min = row.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
            if min >= 0.0 {
                continue;
            }

            let total: f64 = row.iter().map(|(_, v)| v).sum();
            if total <= 0.0 || min.abs() / total > tolerance {
                return Err(LossError::NegativeBeyondTolerance {
                    asset_id: entity.to_string(),
                    value: min,
                    total,
                    tolerance,
                });
            }

            let positive: f64 = row.iter().filter(|(_, v)| *v > 0.0).map(|(_, v)| v).sum();
            let factor = total / positive;
            for (state, value) in row {
                let cleaned = if value < 0.0 { 0.0 } else { value * factor };
                out.insert(entity.clone(), state, cleaned);
            }
            clipped += 1;
        }

        Ok((out, clipped))
    }
}

impl<K: Ord + Clone> FromIterator<(K, DamageState, f64)> for DamageTable<K> {
    fn from_iter<I: IntoIterator<Item = (K, DamageState, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (k, s, v) in iter {
            table.insert(k, s, v);
        }
        table
    }
}

/// Combines per-branch engine outputs into one table as `Σ value × weight(branch)`.
pub fn combine_logic_tree<K: Ord + Clone>(
    branches: &BTreeMap<u32, DamageTable<K>>,
    weights: &BTreeMap<u32, f64>,
) -> LossResult<DamageTable<K>> {
    let mut combined = DamageTable::new();
    for (realization, table) in branches {
        let weight = weights
            .get(realization)
            .copied()
            .ok_or(LossError::MissingRealizationWeight(*realization))?;
        for (entity, state, value) in table.iter() {
            combined.add(entity.clone(), state, value * weight);
        }
    }
    Ok(combined)
}

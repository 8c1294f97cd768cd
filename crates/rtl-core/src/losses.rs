//! Expected economic and human losses.

use crate::error::LossResult;
use crate::models::{BuildingId, ConsequenceModel, InjuryConsequences, Inventory, OriginalAssetId};
use crate::time_of_day::TimeOfDay;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Expected economic loss per building.
pub type EconomicLosses = BTreeMap<BuildingId, f64>;

/// Expected injuries per entity, one column per severity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanLosses<K: Ord> {
    severities: Vec<String>,
    rows: BTreeMap<K, Vec<f64>>,
}

impl<K: Ord + Clone> HumanLosses<K> {
    /// Creates an empty table for the given severities.
    pub fn new(severities: Vec<String>) -> Self {
        Self {
            severities,
            rows: BTreeMap::new(),
        }
    }

    /// Severity labels, in column order.
    pub fn severities(&self) -> &[String] {
        &self.severities
    }

    /// Adds injuries of one severity column.
    pub fn add(&mut self, entity: K, severity: usize, value: f64) {
        let width = self.severities.len();
        let row = self.rows.entry(entity).or_insert_with(|| vec![0.0; width]);
        row[severity] += value;
    }

    /// Ensures an all-zero row exists for `entity`.
    pub fn touch(&mut self, entity: K) {
        let width = self.severities.len();
        self.rows.entry(entity).or_insert_with(|| vec![0.0; width]);
    }

    /// Injuries of one entity, one value per severity.
    pub fn row(&self, entity: &K) -> Option<&[f64]> {
        self.rows.get(entity).map(Vec::as_slice)
    }

    /// Injuries of one entity and severity, zero when absent.
    pub fn value(&self, entity: &K, severity: usize) -> f64 {
        self.rows
            .get(entity)
            .and_then(|r| r.get(severity))
            .copied()
            .unwrap_or(0.0)
    }

    /// Rows in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[f64])> + '_ {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column totals.
    pub fn totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.severities.len()];
        for row in self.rows.values() {
            for (t, v) in totals.iter_mut().zip(row) {
                *t += v;
            }
        }
        totals
    }

    /// Sum over all entities and severities.
    pub fn total(&self) -> f64 {
        self.totals().iter().sum()
    }
}

/// Expected economic loss per building.
///
/// Each row contributes `ratio(class, state) × replacement_cost`.
pub fn expected_economic_loss(
    inventory: &Inventory,
    model: &ConsequenceModel,
) -> LossResult<EconomicLosses> {
    let mut losses = EconomicLosses::new();
    for asset in inventory {
        let ratio = model.loss_ratio(&asset.building_class, asset.damage_state)?;
        *losses.entry(asset.building_id.clone()).or_insert(0.0) += ratio * asset.replacement_cost;
    }
    Ok(losses)
}

/// Expected injuries per original asset, from the occupants present at `time_of_day`.
pub fn expected_human_loss_per_original_asset(
    inventory: &Inventory,
    time_of_day: TimeOfDay,
    injuries: &InjuryConsequences,
) -> LossResult<HumanLosses<OriginalAssetId>> {
    let mut losses = HumanLosses::new(severity_labels(injuries));
    for asset in inventory {
        losses.touch(asset.original_asset_id.clone());
        let occupants = asset.occupants.get(time_of_day);
        for (i, model) in injuries.models().iter().enumerate() {
            let ratio = model.loss_ratio(&asset.building_class, asset.damage_state)?;
            losses.add(asset.original_asset_id.clone(), i, ratio * occupants);
        }
    }
    Ok(losses)
}

/// Sums per-original-asset injuries up to buildings.
pub fn human_loss_per_building(
    per_original: &HumanLosses<OriginalAssetId>,
    inventory: &Inventory,
) -> HumanLosses<BuildingId> {
    let building_of: HashMap<&OriginalAssetId, &BuildingId> = inventory
        .iter()
        .map(|a| (&a.original_asset_id, &a.building_id))
        .collect();

    let mut out = HumanLosses::new(per_original.severities().to_vec());
    for (original, row) in per_original.iter() {
        let Some(building) = building_of.get(original) else {
            continue;
        };
        out.touch((*building).clone());
        for (i, value) in row.iter().enumerate() {
            out.add((*building).clone(), i, *value);
        }
    }
    out
}

/// Expected injuries per building.
pub fn expected_human_loss(
    inventory: &Inventory,
    time_of_day: TimeOfDay,
    injuries: &InjuryConsequences,
) -> LossResult<HumanLosses<BuildingId>> {
    let per_original = expected_human_loss_per_original_asset(inventory, time_of_day, injuries)?;
    Ok(human_loss_per_building(&per_original, inventory))
}

/// All-zero injuries for every building, used when no event was assessed.
pub fn zero_human_loss(inventory: &Inventory, severities: &[String]) -> HumanLosses<BuildingId> {
    let mut out = HumanLosses::new(severities.to_vec());
    for building in inventory.building_ids() {
        out.touch(building.clone());
    }
    out
}

fn severity_labels(injuries: &InjuryConsequences) -> Vec<String> {
    injuries.severities().into_iter().map(str::to_string).collect()
}

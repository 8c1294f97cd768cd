//! Redistribution of accumulated damage onto inventory rows.
//!
//! Damage targets computed per original asset must be written back onto the rows
//! that currently represent it. Each target is split over the rows in proportion
//! to their prior (merged) value for that damage state, or evenly when no row had
//! any. The resulting rows are regrouped per original asset and damage state,
//! pruned, re-identified and sorted, producing the next inventory snapshot.

use crate::accumulator::AccumulatedDamage;
use crate::damage_state::DamageState;
use crate::damage_table::DamageTable;
use crate::error::{LossError, LossResult};
use crate::models::{Asset, AssetId, Inventory, OriginalAssetId};
use crate::settings::EngineSettings;
use crate::time_of_day::PerPeriod;
use std::collections::BTreeMap;
use tracing::debug;

/// Building count allotted to one prior row in one damage state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    /// Index of the prior row in the previous snapshot.
    pub row: usize,
    pub damage_state: DamageState,
    pub building_count: f64,
}

/// Splits a target over candidate rows in proportion to their prior values.
///
/// Falls back to a uniform split when the prior values sum to less than
/// `weight_epsilon`, so rows that previously carried nothing in a state can still
/// receive newly emerging mass.
pub fn proportional_split(priors: &[f64], target: f64, weight_epsilon: f64) -> Vec<f64> {
    let sum: f64 = priors.iter().sum();
    if sum > weight_epsilon {
        priors.iter().map(|p| p / sum * target).collect()
    } else {
        let share = target / priors.len() as f64;
        vec![share; priors.len()]
    }
}

/// Maps accumulated damage onto rows of the previous snapshot.
pub fn allocate(
    accumulated: &AccumulatedDamage,
    merged: &DamageTable<AssetId>,
    previous: &Inventory,
    weight_epsilon: f64,
) -> LossResult<Vec<Allocation>> {
    let mut allocations = Vec::new();

    match accumulated {
        AccumulatedDamage::PerAsset(table) => {
            let positions: BTreeMap<&AssetId, usize> = previous
                .iter()
                .enumerate()
                .map(|(i, a)| (&a.asset_id, i))
                .collect();
            for (asset_id, state, value) in table.iter() {
                let row = positions
                    .get(asset_id)
                    .copied()
                    .ok_or_else(|| LossError::UnknownAsset(asset_id.to_string()))?;
                allocations.push(Allocation {
                    row,
                    damage_state: state,
                    building_count: value,
                });
            }
        }
        AccumulatedDamage::PerOriginalAsset(targets) => {
            let groups = previous.rows_by_original_asset();
            let assets = previous.assets();
            for (original, state, target) in targets.iter() {
                let rows = groups
                    .get(original)
                    .filter(|rows| !rows.is_empty())
                    .ok_or_else(|| LossError::EmptyRedistributionGroup(original.to_string()))?;
                let priors: Vec<f64> = rows
                    .iter()
                    .map(|&i| merged.value(&assets[i].asset_id, state))
                    .collect();
                for (&row, count) in rows
                    .iter()
                    .zip(proportional_split(&priors, target, weight_epsilon))
                {
                    allocations.push(Allocation {
                        row,
                        damage_state: state,
                        building_count: count,
                    });
                }
            }
        }
    }

    Ok(allocations)
}

#[derive(Debug, Default)]
struct Accumulated {
    building_count: f64,
    replacement_cost: f64,
    census_occupants: f64,
    occupants: PerPeriod,
}

/// Builds the next inventory snapshot.
///
/// `previous` is the snapshot the event was run on, `merged` the per-row damage
/// used as redistribution weights and `undamaged` the reference snapshot from which
/// building, location, occupancy and administrative attributes are re-attached.
pub fn redistribute(
    accumulated: &AccumulatedDamage,
    merged: &DamageTable<AssetId>,
    previous: &Inventory,
    undamaged: &Inventory,
    settings: &EngineSettings,
) -> LossResult<Inventory> {
    let allocations = allocate(accumulated, merged, previous, settings.weight_epsilon)?;
    let references = undamaged.original_asset_references();
    let original_totals = undamaged.building_count_per_original_asset();
    let assets = previous.assets();

    let mut groups: BTreeMap<(OriginalAssetId, String, DamageState), Accumulated> =
        BTreeMap::new();
    for allocation in &allocations {
        let prior = &assets[allocation.row];
        if !references.contains_key(&prior.original_asset_id) {
            return Err(LossError::UnknownOriginalAsset(
                prior.original_asset_id.to_string(),
            ));
        }

        let entry = groups
            .entry((
                prior.original_asset_id.clone(),
                prior.building_class.clone(),
                allocation.damage_state,
            ))
            .or_default();
        entry.building_count += allocation.building_count;

        if prior.building_count > 0.0 {
            let ratio = allocation.building_count / prior.building_count;
            entry.replacement_cost += ratio * prior.replacement_cost;
            entry.census_occupants += ratio * prior.census_occupants;
            entry.occupants = entry.occupants + prior.occupants.scaled(ratio);
        } else {
            let original_count = original_totals
                .get(&prior.original_asset_id)
                .copied()
                .unwrap_or(0.0);
            let ratio = if original_count > 0.0 {
                allocation.building_count / original_count
            } else {
                0.0
            };
            // rows that carried no buildings take attributes from the undamaged state
            let reference_group = undamaged
                .iter()
                .filter(|a| a.original_asset_id == prior.original_asset_id);
            for original in reference_group {
                entry.replacement_cost += ratio * original.replacement_cost;
                entry.census_occupants += ratio * original.census_occupants;
                entry.occupants = entry.occupants + original.occupants.scaled(ratio);
            }
        }
    }

    let before = groups.len();
    let mut rows = Vec::with_capacity(before);
    for ((original, class, state), acc) in groups {
        if acc.building_count < settings.prune_epsilon {
            continue;
        }
        let reference = references
            .get(&original)
            .ok_or_else(|| LossError::UnknownOriginalAsset(original.to_string()))?;

        rows.push(Asset {
            asset_id: AssetId::new(format!("{}{}", settings.asset_id_prefix, rows.len() + 1)),
            building_id: reference.building_id.clone(),
            original_asset_id: original,
            building_class: class,
            damage_state: state,
            building_count: acc.building_count,
            replacement_cost: acc.replacement_cost,
            census_occupants: acc.census_occupants,
            occupants: acc.occupants,
            occupancy_type: reference.occupancy_type.clone(),
            location: reference.location,
            admin: reference.admin.clone(),
        });
    }

    debug!(
        allocations = allocations.len(),
        rows = rows.len(),
        pruned = before - rows.len(),
        "Redistributed damage onto inventory"
    );
    Inventory::new(rows)
}

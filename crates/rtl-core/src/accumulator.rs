//! Accumulation of new damage onto pre-existing damage.

use crate::damage_state::DamageStateScale;
use crate::damage_table::DamageTable;
use crate::error::{LossError, LossResult};
use crate::models::{AssetId, Inventory, OriginalAssetId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Semantics of the fragility model used by the damage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragilityMode {
    /// Engine results already account for the damage carried by each row.
    StateDependent,
    /// Engine results assume an undamaged start and must be combined with the
    /// damage carried by each row.
    StateIndependent,
}

impl FragilityMode {
    /// Maps the configuration flag to a mode.
    pub fn from_flag(state_dependent: bool) -> Self {
        if state_dependent {
            FragilityMode::StateDependent
        } else {
            FragilityMode::StateIndependent
        }
    }
}

/// Damage after accumulation.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatedDamage {
    /// Building counts per inventory row (state-dependent fragilities).
    PerAsset(DamageTable<AssetId>),
    /// Target building counts per original asset (state-independent fragilities).
    PerOriginalAsset(DamageTable<OriginalAssetId>),
}

/// Combines merged damage with the damage carried by the inventory.
pub fn accumulate(
    mode: FragilityMode,
    merged: &DamageTable<AssetId>,
    inventory: &Inventory,
    scale: &DamageStateScale,
) -> LossResult<AccumulatedDamage> {
    match mode {
        FragilityMode::StateDependent => Ok(AccumulatedDamage::PerAsset(merged.clone())),
        FragilityMode::StateIndependent => Ok(AccumulatedDamage::PerOriginalAsset(
            combine_independent(merged, inventory, scale)?,
        )),
    }
}

/// Each row's building count assigned entirely to its current damage state.
pub fn previous_damage(inventory: &Inventory) -> DamageTable<AssetId> {
    inventory
        .iter()
        .map(|a| (a.asset_id.clone(), a.damage_state, a.building_count))
        .collect()
}

/// Non-exceedance probabilities `P(DS <= s)` of a count vector ordered by severity.
///
/// Products of these per state combine independent events; [`exceedance`] turns
/// them into the per-state probability of reaching at least that state.
///
/// Each entry is one minus the occurrence probability of all strictly more severe
/// states, so the most severe state is always 1. An all-zero vector carries no
/// damage information and is read as certainly undamaged.
pub fn non_exceedance(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return vec![1.0; counts.len()];
    }

    let mut out = vec![1.0; counts.len()];
    let mut more_severe = 0.0;
    for i in (0..counts.len()).rev() {
        out[i] = 1.0 - more_severe;
        more_severe += counts[i] / total;
    }
    out
}

/// Cumulative exceedance `P(DS >= s) = 1 - P(DS <= s - 1)`.
///
/// This is the probability that damage reaches at least `s`, the quantity that is 1
/// at no damage and never increases with severity. Inputs in the `P(DS <= s)` form
/// of [`non_exceedance`] are 1 at the most severe state instead.
pub fn exceedance(non_exceedance: &[f64]) -> Vec<f64> {
    (0..non_exceedance.len())
        .map(|i| if i == 0 { 1.0 } else { 1.0 - non_exceedance[i - 1] })
        .collect()
}

/// Occurrence probabilities recovered from non-exceedance probabilities by
/// differencing consecutive exceedance values; the most severe state takes its
/// exceedance directly.
pub fn occurrence_from_non_exceedance(non_exceedance: &[f64]) -> Vec<f64> {
    let e = exceedance(non_exceedance);
    (0..e.len())
        .map(|i| if i + 1 < e.len() { e[i] - e[i + 1] } else { e[i] })
        .collect()
}

/// State-independent combination under the independence assumption.
///
/// Previous and current damage are aggregated per original asset, converted to
/// non-exceedance probabilities and multiplied. The combined occurrence
/// probabilities are scaled by the original asset's total building count.
fn combine_independent(
    merged: &DamageTable<AssetId>,
    inventory: &Inventory,
    scale: &DamageStateScale,
) -> LossResult<DamageTable<OriginalAssetId>> {
    let to_original = |asset_id: &AssetId| -> LossResult<OriginalAssetId> {
        inventory
            .get(asset_id)
            .map(|a| a.original_asset_id.clone())
            .ok_or_else(|| LossError::UnknownAsset(asset_id.to_string()))
    };

    let mut previous = previous_damage(inventory).aggregate(to_original)?;
    let mut current = merged.aggregate(to_original)?;

    let totals = inventory.building_count_per_original_asset();
    previous.fill_missing(totals.keys(), scale);
    current.fill_missing(totals.keys(), scale);

    let states = scale.len();
    let mut combined = DamageTable::new();
    for (original, total) in &totals {
        let prev_f = non_exceedance(&previous.row_vector(original, states));
        let curr_f = non_exceedance(&current.row_vector(original, states));
        let joint: Vec<f64> = prev_f.iter().zip(&curr_f).map(|(p, c)| p * c).collect();

        for (state, p) in scale.states().zip(occurrence_from_non_exceedance(&joint)) {
            combined.insert(original.clone(), state, p * total);
        }
    }

    debug!(
        original_assets = totals.len(),
        "Combined previous and new damage per original asset"
    );
    Ok(combined)
}

//! Post-processing of loss series across events.

use crate::error::{LossError, LossResult};
use crate::losses::HumanLosses;
use crate::models::{BuildingId, BuildingTotals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values per key after each event, in event order.
pub type LossSeries<K> = Vec<(String, BTreeMap<K, f64>)>;

/// Denominator of a loss ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossBasis {
    /// Total replacement cost of the building.
    ReplacementCost,
    /// Total census occupants of the building.
    CensusOccupants,
}

impl LossBasis {
    fn total(self, totals: &BuildingTotals) -> f64 {
        match self {
            LossBasis::ReplacementCost => totals.replacement_cost,
            LossBasis::CensusOccupants => totals.census_occupants,
        }
    }
}

/// Change caused by each event, from values accumulated up to each event.
///
/// The first event keeps its value; keys missing from an event count as 0.
pub fn incremental_from_cumulative<K: Ord + Clone>(cumulative: &LossSeries<K>) -> LossSeries<K> {
    let mut out = Vec::with_capacity(cumulative.len());
    let mut previous: Option<&BTreeMap<K, f64>> = None;
    for (event, values) in cumulative {
        let mut step = values.clone();
        if let Some(prev) = previous {
            for (key, before) in prev {
                *step.entry(key.clone()).or_insert(0.0) -= before;
            }
        }
        out.push((event.clone(), step));
        previous = Some(values);
    }
    out
}

/// Values accumulated up to each event, from the change caused by each event.
pub fn cumulative_from_incremental<K: Ord + Clone>(incremental: &LossSeries<K>) -> LossSeries<K> {
    let mut out: LossSeries<K> = Vec::with_capacity(incremental.len());
    let mut running: BTreeMap<K, f64> = BTreeMap::new();
    for (event, values) in incremental {
        for (key, value) in values {
            *running.entry(key.clone()).or_insert(0.0) += value;
        }
        out.push((event.clone(), running.clone()));
    }
    out
}

/// Losses as a percentage of each building's total.
///
/// Buildings with a zero total get a ratio of 0.
pub fn loss_ratios(
    absolute: &BTreeMap<BuildingId, f64>,
    totals: &BTreeMap<BuildingId, BuildingTotals>,
    basis: LossBasis,
) -> LossResult<BTreeMap<BuildingId, f64>> {
    absolute
        .iter()
        .map(|(building, loss)| {
            let total = totals
                .get(building)
                .map(|t| basis.total(t))
                .ok_or_else(|| LossError::UnknownBuilding(building.to_string()))?;
            Ok((building.clone(), percentage(*loss, total)))
        })
        .collect()
}

/// Injuries as a percentage of each building's census occupants.
pub fn human_loss_ratios(
    absolute: &HumanLosses<BuildingId>,
    totals: &BTreeMap<BuildingId, BuildingTotals>,
) -> LossResult<HumanLosses<BuildingId>> {
    let mut out = HumanLosses::new(absolute.severities().to_vec());
    for (building, row) in absolute.iter() {
        let census = totals
            .get(building)
            .map(|t| t.census_occupants)
            .ok_or_else(|| LossError::UnknownBuilding(building.to_string()))?;
        out.touch(building.clone());
        for (i, value) in row.iter().enumerate() {
            out.add(building.clone(), i, percentage(*value, census));
        }
    }
    Ok(out)
}

fn percentage(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total * 100.0
    } else {
        0.0
    }
}

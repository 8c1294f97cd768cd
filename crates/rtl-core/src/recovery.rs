//! Recovery timelines and occupants available at the time of an event.
//!
//! After every event two families of step functions are recorded:
//!
//! - a repair timeline per damage state, 0 while occupants of buildings in that
//!   state are kept out and 1 once they may return;
//! - an injury timeline per original asset, counting injured occupants who are
//!   still in hospital.
//!
//! Later events combine the whole history: a damage state is only re-occupied when
//! every past event allows it, and injured occupants of every past event are away
//! until discharged.

use crate::damage_state::{DamageState, DamageStateScale};
use crate::error::{LossError, LossResult};
use crate::losses::HumanLosses;
use crate::models::{
    Asset, InjuryRecoveryModel, Inventory, OccupancyRecoveryModel, OriginalAssetId,
};
use crate::step_function::StepFunction;
use crate::time_of_day::{TimeOfDay, TimeOfDayFactors};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Occupancy factor per damage state, indexed by [`DamageState::index`].
pub type OccupancyFactors = Vec<f64>;

/// Day offsets of a timeline: the offsets within `[shortest, longest]` plus both
/// bounds, sorted and distinct.
pub fn timeline_breakpoints(
    offsets: impl IntoIterator<Item = i64>,
    shortest: i64,
    longest: i64,
) -> Vec<i64> {
    let mut days: BTreeSet<i64> = offsets
        .into_iter()
        .filter(|d| *d >= shortest && *d <= longest)
        .collect();
    days.insert(shortest);
    days.insert(longest);
    days.into_iter().collect()
}

fn at_day(event_time: DateTime<Utc>, day: i64) -> DateTime<Utc> {
    event_time + Duration::days(day)
}

/// Repair timeline of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTimeline {
    pub event_time: DateTime<Utc>,
    pub per_state: BTreeMap<DamageState, StepFunction<DateTime<Utc>>>,
}

/// Builds the repair timeline of an event.
///
/// Each damage state gets a step function that is 0 before its return offset and 1
/// from it on, sampled at the union of all offsets within `[0, horizon_days]`.
pub fn repair_recovery_timeline(
    model: &OccupancyRecoveryModel,
    scale: &DamageStateScale,
    horizon_days: i64,
    event_time: DateTime<Utc>,
) -> LossResult<RepairTimeline> {
    let offsets = scale
        .states()
        .map(|s| model.days(s).map(|d| (s, d)))
        .collect::<LossResult<Vec<_>>>()?;
    let breakpoints = timeline_breakpoints(offsets.iter().map(|(_, d)| *d), 0, horizon_days);

    let per_state = offsets
        .into_iter()
        .map(|(state, offset)| {
            let steps = breakpoints.iter().map(|&b| {
                let allowed = if b >= offset { 1.0 } else { 0.0 };
                (at_day(event_time, b), allowed)
            });
            (state, StepFunction::new(steps))
        })
        .collect();

    Ok(RepairTimeline {
        event_time,
        per_state,
    })
}

/// Injury timeline of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryTimeline {
    pub event_time: DateTime<Utc>,
    pub per_original_asset: BTreeMap<OriginalAssetId, StepFunction<DateTime<Utc>>>,
}

/// Builds the injury timeline of an event.
///
/// For every original asset the value at each breakpoint is the number of its
/// injured occupants whose severity keeps them in hospital at that day.
pub fn injury_recovery_timeline(
    injuries: &HumanLosses<OriginalAssetId>,
    model: &InjuryRecoveryModel,
    horizon_days: i64,
    event_time: DateTime<Utc>,
) -> LossResult<InjuryTimeline> {
    let discharge = injuries
        .severities()
        .iter()
        .map(|s| model.days(s))
        .collect::<LossResult<Vec<i64>>>()?;
    let breakpoints = timeline_breakpoints(discharge.iter().copied(), 0, horizon_days);

    let per_original_asset = injuries
        .iter()
        .map(|(original, row)| {
            let steps = breakpoints.iter().map(|&b| {
                let away: f64 = row
                    .iter()
                    .zip(&discharge)
                    .filter(|(_, d)| b < **d)
                    .map(|(n, _)| n)
                    .sum();
                (at_day(event_time, b), away)
            });
            (original.clone(), StepFunction::new(steps))
        })
        .collect();

    Ok(InjuryTimeline {
        event_time,
        per_original_asset,
    })
}

/// Recovery timelines recorded for one past event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub event_id: String,
    pub repair: RepairTimeline,
    pub injuries: InjuryTimeline,
}

/// Recovery timelines of all past events of one sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryHistory {
    records: Vec<RecoveryRecord>,
}

impl RecoveryHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the history extended with one more event.
    pub fn with_record(mut self, record: RecoveryRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Recorded events, oldest first.
    pub fn records(&self) -> &[RecoveryRecord] {
        &self.records
    }

    /// Whether no event has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Share of occupants allowed back per damage state at `time`.
    ///
    /// Factors of all past events are multiplied, so any unresolved event keeps
    /// occupants out. With no history every factor is 1.
    pub fn occupancy_factors(
        &self,
        time: DateTime<Utc>,
        scale: &DamageStateScale,
    ) -> OccupancyFactors {
        scale
            .states()
            .map(|state| {
                self.records
                    .iter()
                    .filter_map(|r| r.repair.per_state.get(&state))
                    .map(|f| f.evaluate(time))
                    .product::<f64>()
            })
            .collect()
    }

    /// Injured occupants still away at `time`, summed over past events, for each of
    /// the given original assets. With no history every value is 0.
    pub fn injured_still_away<'a, I>(
        &self,
        original_assets: I,
        time: DateTime<Utc>,
    ) -> BTreeMap<OriginalAssetId, f64>
    where
        I: IntoIterator<Item = &'a OriginalAssetId>,
    {
        original_assets
            .into_iter()
            .map(|original| {
                let away = self
                    .records
                    .iter()
                    .filter_map(|r| r.injuries.per_original_asset.get(original))
                    .map(|f| f.evaluate(time))
                    .sum::<f64>();
                (original.clone(), away)
            })
            .collect()
    }
}

/// Sets every row's occupants for `period` to the people present at the event.
///
/// `occupants = tod_factor[occupancy][period] × occupancy_factor[state] ×
/// (census − injured still away)`, where the injured of an original asset are
/// shared among its rows in proportion to their census occupants. When no damage
/// state may be occupied every row is set to 0 without consulting the injuries.
pub fn occupants_at_time(
    inventory: &Inventory,
    period: TimeOfDay,
    time_of_day_factors: &TimeOfDayFactors,
    occupancy_factors: &[f64],
    injured_still_away: &BTreeMap<OriginalAssetId, f64>,
) -> LossResult<Inventory> {
    let nobody_back = occupancy_factors.iter().all(|f| *f == 0.0);

    let mut census_per_original: HashMap<&OriginalAssetId, f64> = HashMap::new();
    for asset in inventory {
        *census_per_original.entry(&asset.original_asset_id).or_insert(0.0) +=
            asset.census_occupants;
    }

    let mut rows: Vec<Asset> = Vec::with_capacity(inventory.len());
    for asset in inventory {
        let mut row = asset.clone();
        let present = if nobody_back {
            0.0
        } else {
            let tod = time_of_day_factors.factor(&asset.occupancy_type, period)?;
            let allowed = occupancy_factors
                .get(asset.damage_state.index())
                .copied()
                .ok_or_else(|| LossError::MissingRecoveryEntry(asset.damage_state.to_string()))?;
            let census_total = census_per_original
                .get(&asset.original_asset_id)
                .copied()
                .unwrap_or(0.0);
            let injured = match injured_still_away.get(&asset.original_asset_id) {
                Some(n) if census_total > 0.0 => n * asset.census_occupants / census_total,
                _ => 0.0,
            };
            tod * allowed * (asset.census_occupants - injured).max(0.0)
        };
        row.occupants.set(period, present);
        rows.push(row);
    }

    debug!(
        period = %period,
        nobody_back,
        "Updated occupants at time of event"
    );
    Inventory::new(rows)
}

//! Stochastic event set processing and averaging.
//!
//! Every SES starts from the same inventory snapshot with its own recovery
//! history and runs its earthquakes in chronological order. SES share nothing
//! while running, so they are processed in parallel and only averaged once all of
//! them have finished.

use crate::catalogue::{ForecastCatalogue, SesNumbering};
use crate::engine::DamageEngine;
use crate::error::LossResult;
use crate::event::{DamageSummary, EventOutcome, EventProcessor, SequenceState};
use crate::losses::{zero_human_loss, EconomicLosses, HumanLosses};
use crate::models::BuildingId;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, info_span};

/// Results of one SES.
#[derive(Debug, Clone)]
pub struct RealizationResult {
    pub ses_id: u32,
    /// Damage after the last earthquake.
    pub damage_summary: DamageSummary,
    /// Economic loss of the final inventory.
    pub economic: EconomicLosses,
    /// Injuries summed over all earthquakes.
    pub human: HumanLosses<BuildingId>,
    pub events_processed: usize,
    pub events_skipped: usize,
    pub fallbacks: usize,
    pub clipped_rows: usize,
    /// Inventory and history after the last earthquake.
    pub final_state: SequenceState,
}

/// Averages over all SES.
#[derive(Debug, Clone)]
pub struct AveragedResults {
    pub realizations: usize,
    pub damage_summary: DamageSummary,
    pub economic: EconomicLosses,
    pub human: HumanLosses<BuildingId>,
}

/// Called after every processed earthquake, e.g. to persist intermediate files.
pub trait EventObserver: Sync {
    fn on_event(&self, ses_id: u32, outcome: &EventOutcome) -> LossResult<()>;
}

impl EventObserver for () {
    fn on_event(&self, _ses_id: u32, _outcome: &EventOutcome) -> LossResult<()> {
        Ok(())
    }
}

/// Runs the earthquakes of one SES in order.
///
/// Earthquakes not marked to run leave the state untouched. A SES in which nothing
/// runs reports the damage and economic loss of the starting inventory and zero
/// injuries.
pub fn run_realization(
    processor: &EventProcessor,
    start: &SequenceState,
    ses_id: u32,
    catalogue: &ForecastCatalogue,
    engine: &dyn DamageEngine,
    observer: &dyn EventObserver,
) -> LossResult<RealizationResult> {
    let span = info_span!("realization", ses_id);
    let _enter = span.enter();

    let mut state = start.clone();
    let mut human: Option<HumanLosses<BuildingId>> = None;
    let mut events_processed = 0;
    let mut events_skipped = 0;
    let mut fallbacks = 0;
    let mut clipped_rows = 0;

    for event in catalogue.events_of(ses_id) {
        if !event.to_run {
            events_skipped += 1;
            continue;
        }
        let outcome = processor.process(&state, &event.earthquake, engine, None)?;
        observer.on_event(ses_id, &outcome)?;

        events_processed += 1;
        if outcome.fallback.is_some() {
            fallbacks += 1;
        }
        clipped_rows += outcome.clipped_rows;

        human = Some(match human {
            None => outcome.human.clone(),
            Some(mut sum) => {
                for (building, row) in outcome.human.iter() {
                    for (i, value) in row.iter().enumerate() {
                        sum.add(building.clone(), i, *value);
                    }
                }
                sum
            }
        });
        state = outcome.state;
    }

    let human =
        human.unwrap_or_else(|| zero_human_loss(processor.undamaged(), &processor.severities()));
    let economic = processor.economic_loss(&state.inventory)?;

    debug!(events_processed, events_skipped, "Finished stochastic event set");

    Ok(RealizationResult {
        ses_id,
        damage_summary: state.inventory.damage_summary(),
        economic,
        human,
        events_processed,
        events_skipped,
        fallbacks,
        clipped_rows,
        final_state: state,
    })
}

/// Runs every SES in parallel, returning results in SES order.
pub fn run_forecast(
    processor: &EventProcessor,
    start: &SequenceState,
    catalogue: &ForecastCatalogue,
    numbering: SesNumbering,
    engine: &dyn DamageEngine,
    observer: &dyn EventObserver,
) -> LossResult<Vec<RealizationResult>> {
    let ses_ids = catalogue.ses_ids(numbering);
    info!(realizations = ses_ids.len(), events = catalogue.len(), "Running forecast");

    ses_ids
        .par_iter()
        .map(|ses_id| run_realization(processor, start, *ses_id, catalogue, engine, observer))
        .collect()
}

/// Arithmetic mean over realizations; keys absent from a realization count as 0.
pub fn average(results: &[RealizationResult], severities: &[String]) -> AveragedResults {
    let n = results.len().max(1) as f64;

    let mut damage_summary = DamageSummary::new();
    let mut economic = EconomicLosses::new();
    let mut human_sum: BTreeMap<BuildingId, Vec<f64>> = BTreeMap::new();

    for result in results {
        for (key, value) in &result.damage_summary {
            *damage_summary.entry(key.clone()).or_insert(0.0) += value;
        }
        for (building, value) in &result.economic {
            *economic.entry(building.clone()).or_insert(0.0) += value;
        }
        for (building, row) in result.human.iter() {
            let sum = human_sum
                .entry(building.clone())
                .or_insert_with(|| vec![0.0; severities.len()]);
            for (s, v) in sum.iter_mut().zip(row) {
                *s += v;
            }
        }
    }

    damage_summary.values_mut().for_each(|v| *v /= n);
    economic.values_mut().for_each(|v| *v /= n);
    let mut human = HumanLosses::new(severities.to_vec());
    for (building, row) in human_sum {
        human.touch(building.clone());
        for (i, value) in row.into_iter().enumerate() {
            human.add(building.clone(), i, value / n);
        }
    }

    AveragedResults {
        realizations: results.len(),
        damage_summary,
        economic,
        human,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage_state::DamageState;
    use crate::models::Inventory;

    fn result(ses_id: u32, ds1: f64, loss: f64, injured: Option<f64>) -> RealizationResult {
        let building = BuildingId::new("osm_1");
        let mut damage_summary = DamageSummary::new();
        damage_summary.insert((building.clone(), DamageState::new(1)), ds1);
        let mut human = HumanLosses::new(vec!["1".to_string()]);
        if let Some(n) = injured {
            human.add(building.clone(), 0, n);
        }
        RealizationResult {
            ses_id,
            damage_summary,
            economic: [(building, loss)].into_iter().collect(),
            human,
            events_processed: 1,
            events_skipped: 0,
            fallbacks: 0,
            clipped_rows: 0,
            final_state: SequenceState::initial(Inventory::default()),
        }
    }

    #[test]
    fn test_average_is_arithmetic_mean() {
        let results = vec![
            result(1, 0.4, 1000.0, Some(2.0)),
            result(2, 0.2, 3000.0, Some(4.0)),
        ];
        let averaged = average(&results, &["1".to_string()]);
        let building = BuildingId::new("osm_1");
        assert_eq!(averaged.realizations, 2);
        assert!((averaged.damage_summary[&(building.clone(), DamageState::new(1))] - 0.3).abs() < 1e-12);
        assert!((averaged.economic[&building] - 2000.0).abs() < 1e-9);
        assert!((averaged.human.value(&building, 0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_keys_count_as_zero() {
        let results = vec![
            result(1, 0.4, 1000.0, Some(6.0)),
            result(2, 0.2, 3000.0, None),
            result(3, 0.0, 2000.0, None),
        ];
        let averaged = average(&results, &["1".to_string()]);
        assert!((averaged.human.value(&BuildingId::new("osm_1"), 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_of_nothing_is_empty() {
        let averaged = average(&[], &["1".to_string()]);
        assert_eq!(averaged.realizations, 0);
        assert!(averaged.damage_summary.is_empty());
        assert!(averaged.human.is_empty());
    }
}

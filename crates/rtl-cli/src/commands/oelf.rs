//! Operational earthquake loss forecasting.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use rtl_core::{
    average, run_forecast, AssetId, AveragedResults, DamageEngine, DamageTable, Earthquake,
    EngineFailure, EventObserver, EventOutcome, ForecastCatalogue, Inventory, LossError,
    LossResult, SequenceState, SesNumbering, TimeOfDay,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

use super::run::RunContext;
use crate::engine::PrecomputedEngine;
use crate::io;

const MODE: &str = "oelf";

/// Engine wrapper timing each earthquake from assessment to outcome, and writing
/// intermediate snapshots when requested.
struct ForecastRunner<'a> {
    ctx: &'a RunContext,
    forecast: &'a str,
    engine: PrecomputedEngine,
    started: Mutex<HashMap<String, Instant>>,
}

impl DamageEngine for ForecastRunner<'_> {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn assess(
        &self,
        inventory: &Inventory,
        earthquake: &Earthquake,
        time_of_day: TimeOfDay,
    ) -> Result<DamageTable<AssetId>, EngineFailure> {
        if let Ok(mut started) = self.started.lock() {
            started.insert(earthquake.event_id.clone(), Instant::now());
        }
        self.engine.assess(inventory, earthquake, time_of_day)
    }
}

impl EventObserver for ForecastRunner<'_> {
    fn on_event(&self, ses_id: u32, outcome: &EventOutcome) -> LossResult<()> {
        let started = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.remove(&outcome.event_id));
        self.ctx.metrics.record_event(
            MODE,
            outcome.fallback.is_some(),
            outcome.clipped_rows,
            outcome.state.inventory.len(),
            started.map(|s| s.elapsed()).unwrap_or_default(),
        );

        if self.ctx.config.store_intermediate {
            let path = self
                .ctx
                .layout
                .oelf_intermediate(self.forecast)
                .join(format!("ses_{ses_id}"))
                .join(format!("exposure_model_after_{}.csv", outcome.event_id));
            io::write_inventory(&path, &outcome.state.inventory, self.ctx.processor.scale())
                .map_err(|e| LossError::Observer(format!("{e:#}")))?;
        }
        Ok(())
    }
}

/// Checks the catalogue against the SES numbering and the precomputed damage layout.
fn check_catalogue(catalogue: &ForecastCatalogue, numbering: SesNumbering) -> Result<()> {
    if let SesNumbering::Continuous { first, last } = numbering {
        if let Some(outside) = catalogue
            .events()
            .iter()
            .map(|e| e.ses_id)
            .find(|id| *id < first || *id > last)
        {
            bail!(
                "SES {} of the catalogue is outside the configured ses_range [{}, {}]",
                outside,
                first,
                last
            );
        }
    }

    let mut seen = BTreeSet::new();
    for event in catalogue.events().iter().filter(|e| e.to_run) {
        if !seen.insert(event.earthquake.event_id.as_str()) {
            bail!(
                "Event id '{}' is used by more than one earthquake to run; \
                 precomputed damage needs unique event ids across SES",
                event.earthquake.event_id
            );
        }
    }
    Ok(())
}

/// Runs a forecast from the current state and writes the averaged results.
///
/// The current state is left untouched.
pub fn run_oelf(
    ctx: &RunContext,
    state: &SequenceState,
    forecast: &str,
    mut catalogue: ForecastCatalogue,
) -> Result<AveragedResults> {
    let settings = &ctx.config.oelf;
    let locations = ctx.processor.undamaged().unique_locations();
    let report = catalogue.filter(settings.min_magnitude, settings.max_distance_km, &locations);
    ctx.metrics.record_skipped(MODE, report.total - report.kept);

    let numbering = settings.numbering();
    check_catalogue(&catalogue, numbering)
        .with_context(|| format!("Invalid forecast catalogue '{forecast}'"))?;
    if report.kept == 0 {
        warn!(forecast, "No forecast earthquake passed the filters");
    }

    let scale = ctx.processor.scale();
    let runner = ForecastRunner {
        ctx,
        forecast,
        engine: PrecomputedEngine::new(ctx.layout.oelf_damage(forecast), scale.clone()),
        started: Mutex::new(HashMap::new()),
    };

    let results = run_forecast(&ctx.processor, state, &catalogue, numbering, &runner, &runner)
        .with_context(|| format!("Forecast '{forecast}' failed"))?;
    let averaged = average(&results, &ctx.processor.severities());

    let economic: f64 = averaged.economic.values().sum();
    let injuries = averaged.human.totals();
    ctx.metrics.record_losses(economic, &injuries);

    let output = ctx.layout.output();
    io::write_damage_summary(
        &output.join(format!("damage_states_after_OELF_{forecast}.csv")),
        &averaged.damage_summary,
        scale,
    )?;
    io::write_economic(
        &output.join(format!("losses_economic_after_OELF_{forecast}.csv")),
        &averaged.economic,
    )?;
    io::write_human(
        &output.join(format!("losses_human_after_OELF_{forecast}.csv")),
        &averaged.human,
    )?;

    info!(
        forecast,
        realizations = averaged.realizations,
        kept = report.kept,
        economic,
        "Forecast complete"
    );
    println!(
        "  {} OELF {}: {} SES, {}/{} earthquakes run, mean economic loss {:.0}",
        "✓".green(),
        forecast.cyan(),
        averaged.realizations,
        report.kept,
        report.total,
        economic
    );

    Ok(averaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rtl_core::{ForecastEvent, Location};

    fn event(ses_id: u32, id: &str, day: u32) -> ForecastEvent {
        ForecastEvent::new(
            ses_id,
            Earthquake::new(
                id,
                Utc.with_ymd_and_hms(2009, 4, day, 0, 0, 0).unwrap(),
                4.0,
                Location::new(13.4, 42.3),
            ),
        )
    }

    #[test]
    fn test_catalogue_outside_ses_range_rejected() {
        let catalogue = ForecastCatalogue::new(vec![event(1, "a", 7), event(12, "b", 8)]);
        let numbering = SesNumbering::Continuous { first: 1, last: 10 };
        assert!(check_catalogue(&catalogue, numbering).is_err());
        assert!(check_catalogue(&catalogue, SesNumbering::FromCatalogue).is_ok());
    }

    #[test]
    fn test_duplicate_event_ids_rejected_only_when_run() {
        // blank ids are numbered per SES, so both earthquakes become "1"
        let catalogue = ForecastCatalogue::new(vec![event(1, "", 7), event(2, "", 8)]);
        assert!(check_catalogue(&catalogue, SesNumbering::FromCatalogue).is_err());

        let mut far = event(2, "", 8);
        far.earthquake.epicentre = Location::new(20.0, 50.0);
        let mut catalogue = ForecastCatalogue::new(vec![event(1, "", 7), far]);
        catalogue.filter(3.0, 10.0, &[Location::new(13.4, 42.3)]);
        assert!(check_catalogue(&catalogue, SesNumbering::FromCatalogue).is_ok());
    }
}

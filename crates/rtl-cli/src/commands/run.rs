//! Run command - processes every trigger of `triggering.csv` in order.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use rtl_core::postprocess::{
    cumulative_from_incremental, human_loss_ratios, incremental_from_cumulative, loss_ratios,
    LossBasis, LossSeries,
};
use rtl_core::{BuildingId, EventOutcome, EventProcessor, SequenceState};
use rtl_observability::MetricsCollector;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::oelf::run_oelf;
use super::rla::run_rla;
use crate::config::{AppConfig, Layout};
use crate::io::{
    self, read_earthquake, read_forecast_catalogue, read_inventory, read_triggers, AnalysisType,
    MonitoringResults,
};

/// Everything shared by the RLA and OELF steps of one run.
pub struct RunContext {
    pub run_id: Uuid,
    pub config: AppConfig,
    pub layout: Layout,
    pub processor: EventProcessor,
    pub monitoring: Option<MonitoringResults>,
    pub metrics: MetricsCollector,
}

impl RunContext {
    /// Reads the undamaged inventory and every model, and checks them against each
    /// other.
    pub fn load(config: AppConfig) -> Result<Self> {
        let layout = config.layout();
        let scale = config.damage_scale()?;

        let undamaged = read_inventory(&layout.undamaged_inventory(), &scale)?;
        let economic =
            io::read_consequence_model(&layout.economic_consequences(), "economic", &scale)?;
        let injuries = io::read_injury_consequences(&config.injuries_scale, &scale, |s| {
            layout.injury_consequences(s)
        })?;
        let occupancy_recovery = io::read_occupancy_recovery(&layout.occupancy_recovery(), &scale)?;
        let injury_recovery = io::read_injury_recovery(&layout.injury_recovery())?;

        let monitoring = if layout.monitoring().exists() {
            Some(io::read_monitoring(&layout.monitoring(), &scale)?)
        } else {
            None
        };

        let processor = EventProcessor::new(
            scale,
            undamaged,
            economic,
            injuries,
            occupancy_recovery,
            injury_recovery,
            config.time_of_day_occupancy.clone(),
            config.engine_settings(),
        )
        .context("Inconsistent models")?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            layout,
            processor,
            monitoring,
            metrics: MetricsCollector::new(),
        })
    }
}

/// Counts of a finished run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub rla_events: usize,
    pub forecasts: usize,
}

/// Loss series collected over the RLA steps.
struct RlaSeries {
    economic: LossSeries<BuildingId>,
    human: Vec<LossSeries<BuildingId>>,
}

impl RlaSeries {
    fn new(severities: usize) -> Self {
        Self {
            economic: Vec::new(),
            human: vec![Vec::new(); severities],
        }
    }

    fn push(&mut self, outcome: &EventOutcome) {
        self.economic
            .push((outcome.event_id.clone(), outcome.economic.clone()));
        for (i, series) in self.human.iter_mut().enumerate() {
            let values: BTreeMap<BuildingId, f64> = outcome
                .human
                .iter()
                .map(|(building, row)| (building.clone(), row[i]))
                .collect();
            series.push((outcome.event_id.clone(), values));
        }
    }
}

/// Runs every trigger in order.
///
/// RLA steps update the current inventory and recovery history; OELF steps forecast
/// from the current state without changing it.
pub fn run_triggers(ctx: &RunContext, overwrite: bool) -> Result<RunReport> {
    let layout = &ctx.layout;
    let current = layout.current_inventory();
    if current.exists() && !overwrite {
        bail!(
            "{} already exists; the directory may hold a previous run (use --overwrite)",
            current.display()
        );
    }

    let triggers = read_triggers(&layout.triggers())?;
    let scale = ctx.processor.scale();
    let mut state = SequenceState::initial(ctx.processor.undamaged().clone());
    io::write_inventory(&current, &state.inventory, scale)?;

    let mut report = RunReport::default();
    let mut series = RlaSeries::new(ctx.processor.severities().len());

    for trigger in &triggers {
        let catalogue_path = layout.catalogue(&trigger.catalogue_filename);
        match trigger.type_analysis {
            AnalysisType::Rla => {
                let earthquake = read_earthquake(&catalogue_path)?;
                let outcome = run_rla(ctx, &state, &earthquake)?;
                series.push(&outcome);
                state = outcome.state;
                io::write_inventory(&current, &state.inventory, scale)?;
                report.rla_events += 1;
            }
            AnalysisType::Oelf => {
                let catalogue = read_forecast_catalogue(&catalogue_path)?;
                let forecast = forecast_name(&trigger.catalogue_filename);
                run_oelf(ctx, &state, &forecast, catalogue)?;
                report.forecasts += 1;
            }
        }
    }

    if !series.economic.is_empty() {
        write_rla_series(ctx, &series)?;
    }

    info!(
        rla_events = report.rla_events,
        forecasts = report.forecasts,
        "Finished all triggers"
    );
    Ok(report)
}

fn forecast_name(catalogue_filename: &str) -> String {
    std::path::Path::new(catalogue_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| catalogue_filename.to_string())
}

/// Writes absolute and relative loss series, cumulative and incremental.
///
/// Economic losses of each event are computed on the damage accumulated so far and
/// are therefore cumulative; injuries are caused by each event alone.
fn write_rla_series(ctx: &RunContext, series: &RlaSeries) -> Result<()> {
    let output = ctx.layout.output();
    let totals = ctx.processor.undamaged().totals_per_building();

    let economic_cumulative = &series.economic;
    let economic_incremental = incremental_from_cumulative(economic_cumulative);
    let ratio_of = |s: &LossSeries<BuildingId>, basis: LossBasis| -> Result<LossSeries<BuildingId>> {
        s.iter()
            .map(|(event, values)| Ok((event.clone(), loss_ratios(values, &totals, basis)?)))
            .collect()
    };

    for (kind, absolute) in [
        ("cumulative", economic_cumulative.clone()),
        ("incremental", economic_incremental),
    ] {
        io::write_series(
            &output.join(format!("all_losses_economic_RLA_{kind}.csv")),
            "building_id",
            &absolute,
        )?;
        io::write_series(
            &output.join(format!("all_losses_economic_ratio_RLA_{kind}.csv")),
            "building_id",
            &ratio_of(&absolute, LossBasis::ReplacementCost)?,
        )?;
    }

    for (severity, incremental) in ctx.processor.severities().iter().zip(&series.human) {
        let cumulative = cumulative_from_incremental(incremental);
        for (kind, absolute) in [("incremental", incremental.clone()), ("cumulative", cumulative)] {
            io::write_series(
                &output.join(format!("all_losses_human_severity_{severity}_RLA_{kind}.csv")),
                "building_id",
                &absolute,
            )?;
            io::write_series(
                &output.join(format!(
                    "all_losses_human_ratio_severity_{severity}_RLA_{kind}.csv"
                )),
                "building_id",
                &ratio_of(&absolute, LossBasis::CensusOccupants)?,
            )?;
        }
    }

    // Cumulative injury ratios with every severity side by side.
    let mut cumulative = rtl_core::HumanLosses::new(ctx.processor.severities());
    for (i, incremental) in series.human.iter().enumerate() {
        for (_, values) in incremental {
            for (building, value) in values {
                cumulative.add(building.clone(), i, *value);
            }
        }
    }
    io::write_human(
        &output.join("all_losses_human_ratio_RLA_cumulative.csv"),
        &human_loss_ratios(&cumulative, &totals)?,
    )?;

    println!(
        "  {} Loss series written to {}",
        "✓".green(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn sequence_inputs(root: &Path) {
        write(
            root,
            "triggering.csv",
            "catalogue_filename,type_analysis\nEQ_01.csv,RLA\nforecast_01.csv,OELF\n",
        );
        write(
            root,
            "catalogues/EQ_01.csv",
            "event_id,longitude,latitude,depth,magnitude,datetime\n\
             EQ_01,13.38,42.34,8.8,6.1,2009-04-06T01:32:39\n",
        );
        write(
            root,
            "catalogues/forecast_01.csv",
            "ses_id,event_id,longitude,latitude,depth,magnitude,datetime\n\
             1,F1,13.40,42.35,5,4.5,2009-04-07T00:00:00\n\
             2,F2,13.40,42.35,5,2.0,2009-04-08T00:00:00\n",
        );
        write(
            root,
            "exposure_models/exposure_model_undamaged.csv",
            "id,lon,lat,taxonomy,number,structural,census,day,night,transit,occupancy,building_id\n\
             exp_1,13.40,42.35,CR/LFINF/DS0,1,300000,6,1.8,5.4,3.0,Res,osm_1\n\
             exp_2,13.41,42.36,MUR/LWAL/DS0,20,4000000,80,24,72,40,Res,tile_1\n",
        );
        write(
            root,
            "static/consequences_economic.csv",
            "Taxonomy,DS0,DS1,DS2,DS3,DS4\nCR/LFINF,0,5,15,60,100\nMUR/LWAL,0,10,30,80,100\n",
        );
        write(
            root,
            "static/consequences_injuries_severity_1.csv",
            "Taxonomy,DS0,DS1,DS2,DS3,DS4\nCR/LFINF,0,0,1,5,20\nMUR/LWAL,0,0,2,8,25\n",
        );
        write(
            root,
            "static/consequences_injuries_severity_2.csv",
            "Taxonomy,DS0,DS1,DS2,DS3,DS4\nCR/LFINF,0,0,0.1,1,5\nMUR/LWAL,0,0,0.2,2,8\n",
        );
        write(
            root,
            "static/recovery_damage.csv",
            "dmg_state,N_damage\nDS0,0\nDS1,10\nDS2,30\nDS3,365\nDS4,1095\n",
        );
        write(
            root,
            "static/recovery_injuries.csv",
            "injuries_scale,N_discharged\n1,3\n2,30\n",
        );
        write(
            root,
            "damage_engine/rla/EQ_01_damages.csv",
            "asset_id,dmg_state,value\n\
             exp_1,no_damage,0.5\nexp_1,dmg_1,0.2\nexp_1,dmg_2,0.15\nexp_1,dmg_3,0.1\nexp_1,dmg_4,0.05\n\
             exp_2,no_damage,10\nexp_2,dmg_1,4\nexp_2,dmg_2,3\nexp_2,dmg_3,2\nexp_2,dmg_4,1\n",
        );
    }

    fn config(root: &Path) -> AppConfig {
        AppConfig {
            main_path: root.to_path_buf(),
            injuries_scale: vec!["1".to_string(), "2".to_string()],
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_forecast_name_strips_extension() {
        assert_eq!(forecast_name("forecast_01.csv"), "forecast_01");
        assert_eq!(forecast_name("forecast_01"), "forecast_01");
    }

    #[test]
    fn test_rla_then_forecast() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        sequence_inputs(root);

        let ctx = RunContext::load(config(root)).unwrap();
        let report = run_triggers(&ctx, false).unwrap();
        assert_eq!(report.rla_events, 1);
        assert_eq!(report.forecasts, 1);

        // 300000 x 0.1425 + 4000000 x 0.195 after the RLA event; the forecast adds
        // no damage (F1 has no engine results, F2 is below the magnitude threshold)
        let after_rla = 42_750.0 + 780_000.0;
        let summary = ctx.metrics.summary();
        assert_eq!(summary.events_processed, 2);
        assert_eq!(summary.events_skipped, 1);
        assert_eq!(summary.engine_fallbacks, 1);
        assert!((summary.economic_loss - 2.0 * after_rla).abs() < 1e-6);

        let output = root.join("output");
        for file in [
            "damage_states_after_RLA_EQ_01.csv",
            "losses_economic_after_RLA_EQ_01.csv",
            "losses_human_after_RLA_EQ_01.csv",
            "damage_states_after_OELF_forecast_01.csv",
            "losses_economic_after_OELF_forecast_01.csv",
            "all_losses_economic_RLA_cumulative.csv",
            "all_losses_economic_ratio_RLA_incremental.csv",
            "all_losses_human_severity_2_RLA_cumulative.csv",
            "all_losses_human_ratio_RLA_cumulative.csv",
        ] {
            assert!(output.join(file).is_file(), "{file} not written");
        }

        let current = read_inventory(&ctx.layout.current_inventory(), ctx.processor.scale()).unwrap();
        let total: f64 = current.iter().map(|a| a.building_count).sum();
        assert!((total - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_previous_run_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        sequence_inputs(root);
        write(root, "current/exposure_model_current.csv", "id\n");

        let ctx = RunContext::load(config(root)).unwrap();
        assert!(run_triggers(&ctx, false).is_err());
        assert!(run_triggers(&ctx, true).is_ok());
    }
}

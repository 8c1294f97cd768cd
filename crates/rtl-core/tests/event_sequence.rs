use chrono::{DateTime, Duration, TimeZone, Utc};
use rtl_core::{
    average, run_forecast, ConsequenceModel, DamageEngine, DamageState, DamageStateScale,
    DamageTable, Earthquake, EngineFailure, EngineSettings, EventProcessor, ForecastCatalogue,
    ForecastEvent, InjuryConsequences, InjuryRecoveryModel, Inventory, Location,
    OccupancyRecoveryModel, PerPeriod, SequenceState, SesNumbering, TimeOfDay, TimeOfDayFactors,
};
use rtl_core::{Asset, AssetId, BuildingId};
use std::collections::HashMap;

/// Engine returning a scripted outcome per event id, with fixed probabilities of
/// this event alone applied to each row's building count.
struct ScriptedEngine {
    outcomes: HashMap<String, Result<Vec<f64>, EngineFailure>>,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
        }
    }

    fn with(mut self, event_id: &str, outcome: Result<Vec<f64>, EngineFailure>) -> Self {
        self.outcomes.insert(event_id.to_string(), outcome);
        self
    }
}

impl DamageEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn assess(
        &self,
        inventory: &Inventory,
        earthquake: &Earthquake,
        _time_of_day: TimeOfDay,
    ) -> Result<DamageTable<AssetId>, EngineFailure> {
        let probabilities = self
            .outcomes
            .get(&earthquake.event_id)
            .cloned()
            .unwrap_or(Err(EngineFailure::NoGroundMotion))?;
        let mut table = DamageTable::new();
        for asset in inventory {
            for (i, p) in probabilities.iter().enumerate() {
                table.insert(
                    asset.asset_id.clone(),
                    DamageState::new(i as u8),
                    p * asset.building_count,
                );
            }
        }
        Ok(table)
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 4, 6, 1, 32, 39).unwrap()
}

fn occupants(census: f64) -> PerPeriod {
    PerPeriod {
        day: census * 0.3,
        night: census * 0.9,
        transit: census * 0.5,
    }
}

fn undamaged() -> Inventory {
    Inventory::new(vec![
        Asset::new("exp_1", "osm_1", "CR/LFINF", 1.0)
            .with_replacement_cost(300_000.0)
            .with_occupants(6.0, occupants(6.0))
            .with_location(Location::new(13.40, 42.35)),
        Asset::new("exp_2", "tile_1", "MUR/LWAL", 20.0)
            .with_replacement_cost(4_000_000.0)
            .with_occupants(80.0, occupants(80.0))
            .with_location(Location::new(13.41, 42.36)),
        Asset::new("res_5", "shm_1", "CR/LFINF", 1.0)
            .with_replacement_cost(500_000.0)
            .with_occupants(10.0, occupants(10.0))
            .with_location(Location::new(13.39, 42.34)),
    ])
    .unwrap()
}

fn processor(settings: EngineSettings) -> EventProcessor {
    EventProcessor::new(
        DamageStateScale::five_state(),
        undamaged(),
        ConsequenceModel::new("economic")
            .with_class("CR/LFINF", vec![0.0, 5.0, 15.0, 60.0, 100.0])
            .with_class("MUR/LWAL", vec![0.0, 10.0, 30.0, 80.0, 100.0]),
        InjuryConsequences::new(vec![
            ConsequenceModel::new("1")
                .with_class("CR/LFINF", vec![0.0, 0.0, 1.0, 5.0, 20.0])
                .with_class("MUR/LWAL", vec![0.0, 0.0, 2.0, 8.0, 25.0]),
            ConsequenceModel::new("2")
                .with_class("CR/LFINF", vec![0.0, 0.0, 0.1, 1.0, 5.0])
                .with_class("MUR/LWAL", vec![0.0, 0.0, 0.2, 2.0, 8.0]),
        ]),
        OccupancyRecoveryModel::from_days([0, 10, 30, 365, 1095]),
        InjuryRecoveryModel::default()
            .with_severity("1", 3)
            .with_severity("2", 30),
        TimeOfDayFactors::new().with_occupancy(
            "Res",
            PerPeriod {
                day: 1.0,
                night: 1.0,
                transit: 1.0,
            },
        ),
        settings,
    )
    .unwrap()
}

fn earthquake(id: &str, time: DateTime<Utc>) -> Earthquake {
    Earthquake::new(id, time, 6.1, Location::new(13.38, 42.34))
}

fn building_total(inventory: &Inventory, building: &str) -> f64 {
    inventory
        .iter()
        .filter(|a| a.building_id.as_str() == building)
        .map(|a| a.building_count)
        .sum()
}

#[test]
fn test_sequence_conserves_buildings_and_accumulates_damage() {
    let processor = processor(EngineSettings::default());
    let engine = ScriptedEngine::new()
        .with("EQ_01", Ok(vec![0.5, 0.2, 0.15, 0.1, 0.05]))
        .with("EQ_02", Ok(vec![0.6, 0.2, 0.1, 0.07, 0.03]))
        .with("EQ_03", Err(EngineFailure::NoDamage));

    let mut state = SequenceState::initial(undamaged());
    let mut collapsed = Vec::new();
    for (i, id) in ["EQ_01", "EQ_02", "EQ_03"].iter().enumerate() {
        let time = t0() + Duration::days(i as i64 * 20);
        let outcome = processor
            .process(&state, &earthquake(id, time), &engine, None)
            .unwrap();
        for building in ["osm_1", "tile_1", "shm_1"] {
            let expected = building_total(&undamaged(), building);
            let updated = building_total(&outcome.state.inventory, building);
            assert!((updated - expected).abs() < 1e-9);
        }
        collapsed.push(outcome.damage_summary[&(BuildingId::new("tile_1"), DamageState::new(4))]);
        state = outcome.state;
    }

    // P(DS4) after two independent events: 1 - (1 - 0.05)(1 - 0.03)
    assert!((collapsed[0] - 20.0 * 0.05).abs() < 1e-9);
    assert!((collapsed[1] - 20.0 * (1.0 - 0.95 * 0.97)).abs() < 1e-9);
    assert!((collapsed[2] - collapsed[1]).abs() < 1e-9);
    assert_eq!(state.history.records().len(), 3);
}

#[test]
fn test_state_dependent_results_replace_damage() {
    let settings = EngineSettings {
        state_dependent: true,
        ..Default::default()
    };
    let processor = processor(settings);
    let engine = ScriptedEngine::new().with("EQ_01", Ok(vec![0.5, 0.2, 0.15, 0.1, 0.05]));

    let start = SequenceState::initial(undamaged());
    let outcome = processor
        .process(&start, &earthquake("EQ_01", t0()), &engine, None)
        .unwrap();
    let summary = &outcome.damage_summary;
    assert!((summary[&(BuildingId::new("tile_1"), DamageState::new(2))] - 3.0).abs() < 1e-9);
    assert!((summary[&(BuildingId::new("osm_1"), DamageState::new(0))] - 0.5).abs() < 1e-9);
}

#[test]
fn test_monitoring_overrides_engine_damage() {
    let processor = processor(EngineSettings::default());
    let engine = ScriptedEngine::new().with("EQ_01", Ok(vec![0.5, 0.2, 0.15, 0.1, 0.05]));

    let monitoring: DamageTable<BuildingId> = [0.2, 0.4, 0.1, 0.03, 0.27]
        .iter()
        .enumerate()
        .map(|(i, p)| (BuildingId::new("shm_1"), DamageState::new(i as u8), *p))
        .collect();

    let outcome = processor
        .process(
            &SequenceState::initial(undamaged()),
            &earthquake("EQ_01", t0()),
            &engine,
            Some(&monitoring),
        )
        .unwrap();

    let res_5 = AssetId::new("res_5");
    assert_eq!(
        outcome.merged_damage.row_vector(&res_5, 5),
        vec![0.2, 0.4, 0.1, 0.03, 0.27]
    );
    assert_eq!(
        outcome.engine_damage.row_vector(&res_5, 5),
        vec![0.5, 0.2, 0.15, 0.1, 0.05]
    );
    let dmg_4 = outcome.damage_summary[&(BuildingId::new("shm_1"), DamageState::new(4))];
    assert!((dmg_4 - 0.27).abs() < 1e-9);
}

#[test]
fn test_occupants_return_after_repair_offset() {
    let processor = processor(EngineSettings::default());
    let engine = ScriptedEngine::new().with("EQ_01", Ok(vec![0.0, 1.0, 0.0, 0.0, 0.0]));

    let start = SequenceState::initial(undamaged());
    let first = processor
        .process(&start, &earthquake("EQ_01", t0()), &engine, None)
        .unwrap();

    // every building is in DS1, which may be re-occupied 10 days after the event
    let present = |days: i64| -> f64 {
        let exposure = processor
            .exposure_at_event(&first.state, &earthquake("later", t0() + Duration::days(days)))
            .unwrap();
        exposure.iter().map(|a| a.occupants.get(TimeOfDay::Night)).sum()
    };

    assert_eq!(present(9), 0.0);
    assert!((present(10) - 96.0).abs() < 1e-9);
    assert!((present(365) - 96.0).abs() < 1e-9);
}

#[test]
fn test_forecast_averages_over_all_ses() {
    let processor = processor(EngineSettings::default());
    let engine = ScriptedEngine::new().with("1", Ok(vec![0.0, 0.0, 0.0, 0.0, 1.0]));

    let mut catalogue = ForecastCatalogue::new(vec![
        ForecastEvent::new(1, earthquake("", t0())),
        ForecastEvent::new(3, {
            let mut small = earthquake("", t0());
            small.magnitude = 2.0;
            small
        }),
    ]);
    catalogue.filter(3.0, 100.0, &processor.undamaged().unique_locations());

    let start = SequenceState::initial(undamaged());
    let results = run_forecast(
        &processor,
        &start,
        &catalogue,
        SesNumbering::Continuous { first: 1, last: 4 },
        &engine,
        &(),
    )
    .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].events_processed, 1);
    assert_eq!(results[2].events_skipped, 1);
    assert_eq!(results[3].events_processed, 0);

    let averaged = average(&results, &processor.severities());
    // one SES of four collapses everything
    let tile = BuildingId::new("tile_1");
    assert!((averaged.damage_summary[&(tile.clone(), DamageState::new(4))] - 5.0).abs() < 1e-9);
    assert!((averaged.damage_summary[&(tile.clone(), DamageState::new(0))] - 15.0).abs() < 1e-9);
    assert!((averaged.economic[&tile] - 1_000_000.0).abs() < 1e-6);

    // 80 occupants at 25% and 8%, averaged over four SES
    assert!((averaged.human.value(&tile, 0) - 80.0 * 0.25 / 4.0).abs() < 1e-9);
    assert!((averaged.human.value(&tile, 1) - 80.0 * 0.08 / 4.0).abs() < 1e-9);
}

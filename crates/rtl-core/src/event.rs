//! Processing of one earthquake against one inventory snapshot.
//!
//! [`EventProcessor::process`] is a pure function from a [`SequenceState`] (the
//! current inventory plus the recovery history of past events) and one earthquake
//! to an [`EventOutcome`] carrying the next state and the losses of the event:
//!
//! 1. occupants present at the event are derived from the recovery history;
//! 2. the damage engine is run, falling back to the existing damage when it
//!    reports no ground motion or no damage;
//! 3. small negative engine values are clipped;
//! 4. monitoring damage overrides engine damage where available;
//! 5. damage is accumulated and redistributed onto a new snapshot;
//! 6. economic and human losses are computed on the new snapshot;
//! 7. repair and injury timelines of the event are appended to the history.

use crate::accumulator::{accumulate, AccumulatedDamage, FragilityMode};
use crate::damage_state::{DamageState, DamageStateScale};
use crate::damage_table::DamageTable;
use crate::engine::{existing_damage, DamageEngine, EngineFailure};
use crate::error::{LossError, LossResult};
use crate::losses::{
    expected_economic_loss, expected_human_loss_per_original_asset, human_loss_per_building,
    EconomicLosses, HumanLosses,
};
use crate::merger::merge_monitoring;
use crate::models::{
    AssetId, BuildingId, ConsequenceModel, Earthquake, InjuryConsequences, InjuryRecoveryModel,
    Inventory, OccupancyRecoveryModel, OriginalAssetId,
};
use crate::recovery::{
    injury_recovery_timeline, occupants_at_time, repair_recovery_timeline, RecoveryHistory,
    RecoveryRecord,
};
use crate::redistributor::redistribute;
use crate::settings::EngineSettings;
use crate::time_of_day::{TimeOfDay, TimeOfDayFactors};
use chrono::FixedOffset;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, info_span, warn};

/// Building count per building and damage state.
pub type DamageSummary = BTreeMap<(BuildingId, DamageState), f64>;

/// Inventory and recovery history carried from one event to the next.
#[derive(Debug, Clone)]
pub struct SequenceState {
    pub inventory: Inventory,
    pub history: RecoveryHistory,
}

impl SequenceState {
    /// State before the first event of a sequence.
    pub fn initial(inventory: Inventory) -> Self {
        Self {
            inventory,
            history: RecoveryHistory::new(),
        }
    }
}

/// Result of processing one earthquake.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub event_id: String,
    pub time_of_day: TimeOfDay,
    /// Recoverable engine outcome replaced by the existing damage, if any.
    pub fallback: Option<EngineFailure>,
    /// Rows whose negative engine values were clipped.
    pub clipped_rows: usize,
    /// Engine damage after clipping, before monitoring was merged.
    pub engine_damage: DamageTable<AssetId>,
    /// Damage after merging monitoring values.
    pub merged_damage: DamageTable<AssetId>,
    pub damage_summary: DamageSummary,
    pub economic: EconomicLosses,
    pub human_per_original_asset: HumanLosses<OriginalAssetId>,
    pub human: HumanLosses<BuildingId>,
    /// State after the event.
    pub state: SequenceState,
}

/// Static inputs shared by every event of a run.
#[derive(Debug, Clone)]
pub struct EventProcessor {
    scale: DamageStateScale,
    undamaged: Inventory,
    economic: ConsequenceModel,
    injuries: InjuryConsequences,
    occupancy_recovery: OccupancyRecoveryModel,
    injury_recovery: InjuryRecoveryModel,
    time_of_day_factors: TimeOfDayFactors,
    settings: EngineSettings,
    utc_offset: FixedOffset,
}

impl EventProcessor {
    /// Creates a processor and checks every model against the undamaged inventory.
    ///
    /// Missing consequence, time-of-day or recovery entries are rejected here so a
    /// run never fails halfway through a sequence on a configuration gap.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scale: DamageStateScale,
        undamaged: Inventory,
        economic: ConsequenceModel,
        injuries: InjuryConsequences,
        occupancy_recovery: OccupancyRecoveryModel,
        injury_recovery: InjuryRecoveryModel,
        time_of_day_factors: TimeOfDayFactors,
        settings: EngineSettings,
    ) -> LossResult<Self> {
        settings.validate()?;
        let utc_offset = settings.utc_offset()?;

        let classes = undamaged.building_classes();
        if let Some(class) = economic
            .missing_classes(classes.iter().copied(), scale.len())
            .into_iter()
            .next()
        {
            return Err(LossError::MissingConsequence {
                building_class: class,
                model: economic.name.clone(),
            });
        }
        for model in injuries.models() {
            if let Some(class) = model
                .missing_classes(classes.iter().copied(), scale.len())
                .into_iter()
                .next()
            {
                return Err(LossError::MissingConsequence {
                    building_class: class,
                    model: model.name.clone(),
                });
            }
        }

        let occupancies: BTreeSet<&str> = undamaged
            .iter()
            .map(|a| a.occupancy_type.as_str())
            .collect();
        if let Some(missing) = occupancies
            .into_iter()
            .find(|o| !time_of_day_factors.contains(o))
        {
            return Err(LossError::MissingTimeOfDayFactor(missing.to_string()));
        }

        for state in scale.states() {
            occupancy_recovery.days(state)?;
        }
        for severity in injuries.severities() {
            injury_recovery.days(severity)?;
        }

        Ok(Self {
            scale,
            undamaged,
            economic,
            injuries,
            occupancy_recovery,
            injury_recovery,
            time_of_day_factors,
            settings,
            utc_offset,
        })
    }

    /// Damage-state scale.
    pub fn scale(&self) -> &DamageStateScale {
        &self.scale
    }

    /// Undamaged reference inventory.
    pub fn undamaged(&self) -> &Inventory {
        &self.undamaged
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Injury severity labels.
    pub fn severities(&self) -> Vec<String> {
        self.injuries
            .severities()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Period of the day of an earthquake in local time.
    pub fn time_of_day(&self, earthquake: &Earthquake) -> TimeOfDay {
        TimeOfDay::from_utc(earthquake.time, self.utc_offset)
    }

    /// Inventory with occupants for the event's period set to the people present.
    pub fn exposure_at_event(
        &self,
        state: &SequenceState,
        earthquake: &Earthquake,
    ) -> LossResult<Inventory> {
        let period = self.time_of_day(earthquake);
        let factors = state
            .history
            .occupancy_factors(earthquake.time, &self.scale);

        let injured = if factors.iter().all(|f| *f == 0.0) {
            BTreeMap::new()
        } else {
            let originals: BTreeSet<&OriginalAssetId> = state
                .inventory
                .iter()
                .map(|a| &a.original_asset_id)
                .collect();
            state
                .history
                .injured_still_away(originals, earthquake.time)
        };

        occupants_at_time(
            &state.inventory,
            period,
            &self.time_of_day_factors,
            &factors,
            &injured,
        )
    }

    /// Runs the full per-event pipeline.
    pub fn process(
        &self,
        state: &SequenceState,
        earthquake: &Earthquake,
        engine: &dyn DamageEngine,
        monitoring: Option<&DamageTable<BuildingId>>,
    ) -> LossResult<EventOutcome> {
        let span = info_span!("event", event_id = %earthquake.event_id);
        let _enter = span.enter();

        let time_of_day = self.time_of_day(earthquake);
        let exposure = self.exposure_at_event(state, earthquake)?;

        let (raw, fallback) = match engine.assess(&exposure, earthquake, time_of_day) {
            Ok(table) => (table, None),
            Err(failure) if failure.is_recoverable() => {
                info!(
                    engine = engine.name(),
                    reason = %failure,
                    "Engine produced no damage, keeping existing damage"
                );
                (existing_damage(&exposure, &self.scale), Some(failure))
            }
            Err(failure) => return Err(LossError::Engine(failure)),
        };

        let (engine_damage, clipped_rows) = raw.clip_negative(self.settings.negative_tolerance)?;
        if clipped_rows > 0 {
            warn!(clipped_rows, "Clipped negative engine values");
        }

        let merged_damage = merge_monitoring(&engine_damage, monitoring, &exposure)?;

        // The fallback table already is the cumulative damage of every row.
        let accumulated = if fallback.is_some() {
            AccumulatedDamage::PerAsset(merged_damage.clone())
        } else {
            accumulate(
                self.settings.fragility_mode(),
                &merged_damage,
                &exposure,
                &self.scale,
            )?
        };

        let inventory = redistribute(
            &accumulated,
            &merged_damage,
            &exposure,
            &self.undamaged,
            &self.settings,
        )?;

        let damage_summary = inventory.damage_summary();
        let economic = expected_economic_loss(&inventory, &self.economic)?;
        let human_per_original_asset =
            expected_human_loss_per_original_asset(&inventory, time_of_day, &self.injuries)?;
        let human = human_loss_per_building(&human_per_original_asset, &inventory);

        let horizon = self.settings.recovery_horizon_days;
        let record = RecoveryRecord {
            event_id: earthquake.event_id.clone(),
            repair: repair_recovery_timeline(
                &self.occupancy_recovery,
                &self.scale,
                horizon,
                earthquake.time,
            )?,
            injuries: injury_recovery_timeline(
                &human_per_original_asset,
                &self.injury_recovery,
                horizon,
                earthquake.time,
            )?,
        };
        let history = state.history.clone().with_record(record);

        debug!(
            time_of_day = %time_of_day,
            mode = ?self.settings.fragility_mode(),
            rows = inventory.len(),
            economic_loss = economic.values().sum::<f64>(),
            injuries = human.total(),
            "Processed event"
        );

        Ok(EventOutcome {
            event_id: earthquake.event_id.clone(),
            time_of_day,
            fallback,
            clipped_rows,
            engine_damage,
            merged_damage,
            damage_summary,
            economic,
            human_per_original_asset,
            human,
            state: SequenceState { inventory, history },
        })
    }

    /// Economic loss of an inventory under the configured consequence model.
    pub fn economic_loss(&self, inventory: &Inventory) -> LossResult<EconomicLosses> {
        expected_economic_loss(inventory, &self.economic)
    }

    /// Fragility semantics in use.
    pub fn fragility_mode(&self) -> FragilityMode {
        self.settings.fragility_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, Location};
    use crate::time_of_day::PerPeriod;
    use chrono::{TimeZone, Utc};

    struct FixedEngine {
        probabilities: Vec<f64>,
    }

    impl DamageEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        fn assess(
            &self,
            inventory: &Inventory,
            _earthquake: &Earthquake,
            _time_of_day: TimeOfDay,
        ) -> Result<DamageTable<AssetId>, EngineFailure> {
            let mut table = DamageTable::new();
            for asset in inventory {
                for (i, p) in self.probabilities.iter().enumerate() {
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

    struct FailingEngine(EngineFailure);

    impl DamageEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn assess(
            &self,
            _inventory: &Inventory,
            _earthquake: &Earthquake,
            _time_of_day: TimeOfDay,
        ) -> Result<DamageTable<AssetId>, EngineFailure> {
            Err(self.0.clone())
        }
    }

    fn processor() -> EventProcessor {
        let undamaged = Inventory::new(vec![Asset::new("exp_1", "osm_1", "CR", 10.0)
            .with_replacement_cost(1_000_000.0)
            .with_occupants(
                100.0,
                PerPeriod {
                    day: 30.0,
                    night: 90.0,
                    transit: 50.0,
                },
            )
            .with_location(Location::new(13.4, 42.35))])
        .unwrap();

        EventProcessor::new(
            DamageStateScale::five_state(),
            undamaged,
            ConsequenceModel::new("economic").with_class("CR", vec![0.0, 5.0, 15.0, 60.0, 100.0]),
            InjuryConsequences::new(vec![ConsequenceModel::new("1")
                .with_class("CR", vec![0.0, 0.0, 1.0, 5.0, 20.0])]),
            OccupancyRecoveryModel::from_days([0, 5, 30, 365, 1095]),
            InjuryRecoveryModel::default().with_severity("1", 7),
            TimeOfDayFactors::new().with_occupancy(
                "Res",
                PerPeriod {
                    day: 0.3,
                    night: 0.9,
                    transit: 0.5,
                },
            ),
            EngineSettings::default(),
        )
        .unwrap()
    }

    fn earthquake(id: &str, day: u32) -> Earthquake {
        Earthquake::new(
            id,
            Utc.with_ymd_and_hms(2009, 4, day, 1, 32, 0).unwrap(),
            6.1,
            Location::new(13.38, 42.34),
        )
    }

    #[test]
    fn test_first_event_on_undamaged_inventory() {
        let processor = processor();
        let state = SequenceState::initial(processor.undamaged().clone());
        let engine = FixedEngine {
            probabilities: vec![0.5, 0.2, 0.15, 0.1, 0.05],
        };

        let outcome = processor
            .process(&state, &earthquake("EQ_01", 6), &engine, None)
            .unwrap();

        assert_eq!(outcome.time_of_day, TimeOfDay::Night);
        assert!(outcome.fallback.is_none());
        let building = BuildingId::new("osm_1");
        let expected = [5.0, 2.0, 1.5, 1.0, 0.5];
        for (i, e) in expected.iter().enumerate() {
            let value = outcome.damage_summary[&(building.clone(), DamageState::new(i as u8))];
            assert!((value - e).abs() < 1e-9);
        }
        assert!((outcome.economic[&building] - 142_500.0).abs() < 1e-6);

        // 90 occupants at night: 15% in DS2 at 1%, 10% in DS3 at 5%, 5% in DS4 at 20%
        let injured = outcome.human.value(&building, 0);
        assert!((injured - (13.5 * 0.01 + 9.0 * 0.05 + 4.5 * 0.2)).abs() < 1e-9);
        assert_eq!(outcome.state.history.records().len(), 1);
        assert_eq!(outcome.state.inventory.len(), 5);
    }

    #[test]
    fn test_recoverable_failure_keeps_existing_damage() {
        let processor = processor();
        let state = SequenceState::initial(processor.undamaged().clone());
        let engine = FixedEngine {
            probabilities: vec![0.5, 0.2, 0.15, 0.1, 0.05],
        };
        let first = processor
            .process(&state, &earthquake("EQ_01", 6), &engine, None)
            .unwrap();

        let quiet = FailingEngine(EngineFailure::NoGroundMotion);
        let second = processor
            .process(&first.state, &earthquake("EQ_02", 7), &quiet, None)
            .unwrap();

        assert_eq!(second.fallback, Some(EngineFailure::NoGroundMotion));
        for (key, value) in &first.damage_summary {
            assert!((second.damage_summary[key] - value).abs() < 1e-9);
        }
        assert_eq!(second.state.history.records().len(), 2);
    }

    #[test]
    fn test_unrecoverable_failure_propagates() {
        let processor = processor();
        let state = SequenceState::initial(processor.undamaged().clone());
        let broken = FailingEngine(EngineFailure::Failed("segfault".to_string()));
        let result = processor.process(&state, &earthquake("EQ_01", 6), &broken, None);
        assert!(matches!(result, Err(LossError::Engine(EngineFailure::Failed(_)))));
    }

    #[test]
    fn test_occupants_kept_out_after_damage() {
        let processor = processor();
        let state = SequenceState::initial(processor.undamaged().clone());
        let engine = FixedEngine {
            probabilities: vec![0.5, 0.2, 0.15, 0.1, 0.05],
        };
        let first = processor
            .process(&state, &earthquake("EQ_01", 6), &engine, None)
            .unwrap();

        // one day later only undamaged buildings may be occupied
        let exposure = processor
            .exposure_at_event(&first.state, &earthquake("EQ_02", 7))
            .unwrap();
        for asset in &exposure {
            if asset.damage_state == DamageState::UNDAMAGED {
                assert!(asset.occupants.night > 0.0);
            } else {
                assert_eq!(asset.occupants.night, 0.0);
            }
        }
    }

    #[test]
    fn test_missing_consequence_rejected_at_setup() {
        let undamaged =
            Inventory::new(vec![Asset::new("exp_1", "osm_1", "MUR", 1.0)]).unwrap();
        let result = EventProcessor::new(
            DamageStateScale::five_state(),
            undamaged,
            ConsequenceModel::new("economic").with_class("CR", vec![0.0; 5]),
            InjuryConsequences::default(),
            OccupancyRecoveryModel::from_days([0, 5, 30, 365, 1095]),
            InjuryRecoveryModel::default(),
            TimeOfDayFactors::new().with_occupancy("Res", PerPeriod::default()),
            EngineSettings::default(),
        );
        assert!(matches!(
            result,
            Err(LossError::MissingConsequence { building_class, .. }) if building_class == "MUR"
        ));
    }
}

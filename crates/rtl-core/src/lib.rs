//! # rtl-core
//!
//! Damage propagation and loss aggregation for real-time earthquake loss
//! assessment.
//!
//! This crate turns the damage produced by an external hazard and damage engine
//! for one earthquake into an updated building inventory, expected economic and
//! human losses, and recovery timelines that determine who is indoors when the
//! next earthquake strikes. It performs no I/O: every event is processed as a
//! pure function from the previous [`SequenceState`] to the next one.

pub mod accumulator;
pub mod catalogue;
pub mod damage_state;
pub mod damage_table;
pub mod engine;
pub mod error;
pub mod event;
pub mod losses;
pub mod merger;
pub mod models;
pub mod postprocess;
pub mod realization;
pub mod recovery;
pub mod redistributor;
pub mod settings;
pub mod step_function;
pub mod time_of_day;

pub use accumulator::{accumulate, AccumulatedDamage, FragilityMode};
pub use catalogue::{ForecastCatalogue, ForecastEvent, SesNumbering};
pub use damage_state::{DamageState, DamageStateLabels, DamageStateScale};
pub use damage_table::{combine_logic_tree, DamageTable};
pub use engine::{existing_damage, DamageEngine, EngineFailure};
pub use error::{LossError, LossResult};
pub use event::{DamageSummary, EventOutcome, EventProcessor, SequenceState};
pub use losses::{EconomicLosses, HumanLosses};
pub use merger::merge_monitoring;
pub use models::{
    Asset, AssetId, BuildingId, BuildingTotals, ConsequenceModel, Earthquake,
    InjuryConsequences, InjuryRecoveryModel, Inventory, Location, OccupancyRecoveryModel,
    OriginalAssetId,
};
pub use realization::{
    average, run_forecast, run_realization, AveragedResults, EventObserver, RealizationResult,
};
pub use recovery::{RecoveryHistory, RecoveryRecord};
pub use redistributor::redistribute;
pub use settings::EngineSettings;
pub use step_function::StepFunction;
pub use time_of_day::{PerPeriod, TimeOfDay, TimeOfDayFactors};

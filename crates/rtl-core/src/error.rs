//! Error types for the damage and loss engine.

use crate::engine::EngineFailure;
use thiserror::Error;

/// Errors raised while propagating damage and computing losses.
///
/// Numerical noise is corrected locally (see
/// [`DamageTable::clip_negative`](crate::DamageTable::clip_negative)); everything
/// that reaches this type indicates malformed input or configuration and halts the
/// affected run.
#[derive(Debug, Error)]
pub enum LossError {
    /// A damage-state label is not part of the configured scale.
    #[error("Unknown damage state: {0}")]
    UnknownDamageState(String),

    /// A damage-state label appears more than once in the scale.
    #[error("Duplicate damage state label: {0}")]
    DuplicateDamageState(String),

    /// The damage-state scale has no entries.
    #[error("Damage state scale is empty")]
    EmptyDamageScale,

    /// A building class string carries no damage-state token.
    #[error("Building class '{0}' has no damage state suffix")]
    MalformedBuildingClass(String),

    /// An engine value is more negative than the tolerance allows.
    #[error(
        "Negative value {value} for asset {asset_id} exceeds tolerance {tolerance} \
         of the row total {total}"
    )]
    NegativeBeyondTolerance {
        asset_id: String,
        value: f64,
        total: f64,
        tolerance: f64,
    },

    /// The same asset id is associated with more than one original asset.
    #[error("Asset {asset_id} is mapped to more than one original asset")]
    InconsistentOriginalAsset { asset_id: String },

    /// Rows of one original asset point at different buildings.
    #[error("Original asset {original_asset_id} spans buildings {first} and {second}")]
    OriginalAssetSpansBuildings {
        original_asset_id: String,
        first: String,
        second: String,
    },

    /// The same asset id appears twice in one inventory snapshot.
    #[error("Duplicate asset id in inventory: {0}")]
    DuplicateAsset(String),

    /// A damage table references an asset absent from the inventory.
    #[error("Asset {0} is not part of the inventory")]
    UnknownAsset(String),

    /// A building has no totals to compute ratios against.
    #[error("Building {0} has no replacement cost or occupant totals")]
    UnknownBuilding(String),

    /// An original asset is absent from the undamaged reference inventory.
    #[error("Original asset {0} is not part of the undamaged inventory")]
    UnknownOriginalAsset(String),

    /// Redistribution was asked to spread a target over no rows.
    #[error("No inventory rows to redistribute original asset {0} over")]
    EmptyRedistributionGroup(String),

    /// A consequence model has no loss ratios for a building class.
    #[error("Consequence model '{model}' has no entry for building class '{building_class}'")]
    MissingConsequence {
        building_class: String,
        model: String,
    },

    /// No time-of-day factors exist for an occupancy type.
    #[error("No time-of-day factors for occupancy type '{0}'")]
    MissingTimeOfDayFactor(String),

    /// A recovery model lacks an entry.
    #[error("Recovery model has no entry for '{0}'")]
    MissingRecoveryEntry(String),

    /// A logic-tree realization has no weight.
    #[error("No weight for realization {0}")]
    MissingRealizationWeight(u32),

    /// The external damage engine failed in a non-recoverable way.
    #[error("Damage engine failed: {0}")]
    Engine(#[from] EngineFailure),

    /// An [`EventObserver`](crate::EventObserver) could not handle an outcome.
    #[error("Event observer failed: {0}")]
    Observer(String),

    /// Settings failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for engine operations.
pub type LossResult<T> = Result<T, LossError>;

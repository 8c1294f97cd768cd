//! Data models for inventories, consequence and recovery models, and earthquakes.

pub mod asset;
pub mod consequence;
pub mod earthquake;
pub mod ids;
pub mod inventory;
pub mod recovery;

pub use asset::{Asset, Location};
pub use consequence::{ConsequenceModel, InjuryConsequences};
pub use earthquake::Earthquake;
pub use ids::{AssetId, BuildingId, OriginalAssetId};
pub use inventory::{BuildingTotals, Inventory};
pub use recovery::{InjuryRecoveryModel, OccupancyRecoveryModel};

//! Interface to the external hazard and damage engine.

use crate::damage_state::DamageStateScale;
use crate::damage_table::DamageTable;
use crate::models::{AssetId, Earthquake, Inventory};
use crate::time_of_day::TimeOfDay;
use thiserror::Error;

/// Outcomes of an engine run that produced no damage table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFailure {
    /// No ground-motion fields were generated for the event.
    #[error("No ground motion fields were generated")]
    NoGroundMotion,

    /// Ground motion was computed but produced no damage.
    #[error("No damage was produced")]
    NoDamage,

    /// Any other failure; not recoverable.
    #[error("{0}")]
    Failed(String),
}

impl EngineFailure {
    /// Whether the outcome maps to the canonical no-additional-damage result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineFailure::NoGroundMotion | EngineFailure::NoDamage)
    }
}

/// Damage engine evaluated once per event.
///
/// Implementations return, for every row of `inventory`, the number of buildings
/// (or the probability) per damage state.
pub trait DamageEngine: Send + Sync {
    /// Name of the engine for logging.
    fn name(&self) -> &str;

    /// Runs the engine for one earthquake.
    fn assess(
        &self,
        inventory: &Inventory,
        earthquake: &Earthquake,
        time_of_day: TimeOfDay,
    ) -> Result<DamageTable<AssetId>, EngineFailure>;
}

/// Each row's building count in its current damage state and zero elsewhere.
///
/// Substituted for the engine output when the engine reports no ground motion or no
/// damage, and for events that are not assessed at all.
pub fn existing_damage(inventory: &Inventory, scale: &DamageStateScale) -> DamageTable<AssetId> {
    let mut table = DamageTable::new();
    for asset in inventory {
        for state in scale.states() {
            let value = if state == asset.damage_state {
                asset.building_count
            } else {
                0.0
            };
            table.insert(asset.asset_id.clone(), state, value);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage_state::DamageState;
    use crate::models::Asset;

    #[test]
    fn test_existing_damage_is_one_hot() {
        let inventory = Inventory::new(vec![
            Asset::new("exp_1", "osm_1", "CR", 0.7),
            Asset::new("exp_2", "osm_1", "MUR", 0.3).with_damage_state(DamageState::new(2)),
            Asset::new("exp_3", "tile_1", "CR", 90.0),
            Asset::new("exp_4", "tile_1", "MUR", 10.0).with_damage_state(DamageState::new(4)),
            Asset::new("exp_5", "osm_2", "CR", 1.0).with_damage_state(DamageState::new(1)),
        ])
        .unwrap();

        let table = existing_damage(&inventory, &DamageStateScale::five_state());
        assert_eq!(table.len(), 25);
        assert_eq!(table.row_vector(&AssetId::new("exp_1"), 5), vec![0.7, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(table.row_vector(&AssetId::new("exp_2"), 5), vec![0.0, 0.0, 0.3, 0.0, 0.0]);
        assert_eq!(table.row_vector(&AssetId::new("exp_3"), 5), vec![90.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(table.row_vector(&AssetId::new("exp_4"), 5), vec![0.0, 0.0, 0.0, 0.0, 10.0]);
        assert_eq!(table.row_vector(&AssetId::new("exp_5"), 5), vec![0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_recoverable_outcomes() {
        assert!(EngineFailure::NoGroundMotion.is_recoverable());
        assert!(EngineFailure::NoDamage.is_recoverable());
        assert!(!EngineFailure::Failed("crash".into()).is_recoverable());
    }
}

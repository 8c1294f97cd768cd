//! Damage engine replaying precomputed results from disk.

use crate::io::{read_engine_damage, read_realization_weights};
use rtl_core::{
    combine_logic_tree, AssetId, DamageEngine, DamageStateScale, DamageTable, Earthquake,
    EngineFailure, Inventory, TimeOfDay,
};
use std::path::PathBuf;
use tracing::debug;

const WEIGHTS_FILE: &str = "realizations.csv";

/// Reads `{event_id}_damages.csv` from a directory.
///
/// A missing file means no ground motion was generated for the event, an empty one
/// that no damage was produced. Files with an `rlz` column are combined with the
/// weights of `realizations.csv` in the same directory.
pub struct PrecomputedEngine {
    directory: PathBuf,
    scale: DamageStateScale,
}

impl PrecomputedEngine {
    pub fn new(directory: impl Into<PathBuf>, scale: DamageStateScale) -> Self {
        Self {
            directory: directory.into(),
            scale,
        }
    }

    fn path_of(&self, event_id: &str) -> PathBuf {
        self.directory.join(format!("{event_id}_damages.csv"))
    }
}

impl DamageEngine for PrecomputedEngine {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn assess(
        &self,
        _inventory: &Inventory,
        earthquake: &Earthquake,
        time_of_day: TimeOfDay,
    ) -> Result<DamageTable<AssetId>, EngineFailure> {
        let path = self.path_of(&earthquake.event_id);
        if !path.exists() {
            return Err(EngineFailure::NoGroundMotion);
        }
        debug!(path = %path.display(), time_of_day = time_of_day.as_str(), "Reading engine damage");

        let rows = read_engine_damage(&path, &self.scale)
            .map_err(|e| EngineFailure::Failed(format!("{e:#}")))?;
        if rows.branches.is_empty() {
            return Err(EngineFailure::NoDamage);
        }

        if rows.branches.len() == 1 && rows.branches.contains_key(&0) {
            return Ok(rows.branches.into_values().next().unwrap_or_default());
        }

        let weights = read_realization_weights(&self.directory.join(WEIGHTS_FILE))
            .map_err(|e| EngineFailure::Failed(format!("{e:#}")))?;
        combine_logic_tree(&rows.branches, &weights).map_err(|e| EngineFailure::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rtl_core::{DamageState, Location};
    use tempfile::TempDir;

    fn earthquake(id: &str) -> Earthquake {
        Earthquake::new(id, Utc::now(), 5.0, Location::new(13.4, 42.3))
    }

    fn empty_inventory() -> Inventory {
        Inventory::new(Vec::new()).unwrap()
    }

    #[test]
    fn test_missing_and_empty_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("EQ_02_damages.csv"),
            "asset_id,dmg_state,value\n",
        )
        .unwrap();
        let engine = PrecomputedEngine::new(dir.path(), DamageStateScale::five_state());

        let missing = engine.assess(&empty_inventory(), &earthquake("EQ_01"), TimeOfDay::Day);
        assert_eq!(missing, Err(EngineFailure::NoGroundMotion));
        let empty = engine.assess(&empty_inventory(), &earthquake("EQ_02"), TimeOfDay::Day);
        assert_eq!(empty, Err(EngineFailure::NoDamage));
    }

    #[test]
    fn test_malformed_file_is_not_recoverable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("EQ_01_damages.csv"),
            "asset_id,dmg_state,value\nres_1,collapse,1.0\n",
        )
        .unwrap();
        let engine = PrecomputedEngine::new(dir.path(), DamageStateScale::five_state());

        let result = engine.assess(&empty_inventory(), &earthquake("EQ_01"), TimeOfDay::Night);
        assert!(matches!(result, Err(ref e) if !e.is_recoverable()));
    }

    #[test]
    fn test_realizations_are_weighted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("EQ_01_damages.csv"),
            "rlz,asset_id,dmg_state,value\n\
             0,res_1,no_damage,1.0\n\
             1,res_1,no_damage,0.5\n\
             1,res_1,dmg_4,0.5\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(WEIGHTS_FILE), "rlz,weight\n0,0.6\n1,0.4\n").unwrap();
        let engine = PrecomputedEngine::new(dir.path(), DamageStateScale::five_state());

        let table = engine
            .assess(&empty_inventory(), &earthquake("EQ_01"), TimeOfDay::Transit)
            .unwrap();
        let res_1 = AssetId::new("res_1");
        assert!((table.value(&res_1, DamageState::UNDAMAGED) - 0.8).abs() < 1e-12);
        assert!((table.value(&res_1, DamageState::new(4)) - 0.2).abs() < 1e-12);
    }
}

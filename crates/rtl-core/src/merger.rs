//! Merging engine damage with monitoring-derived damage.
//!
//! Structural health monitoring (SHM) reports damage per building, treating the
//! building as a single unit. A building is usually represented by several
//! inventory rows (one per class and damage state), so a monitored value is spread
//! evenly over the rows that currently represent its building.

use crate::damage_table::DamageTable;
use crate::error::LossResult;
use crate::models::{AssetId, BuildingId, Inventory};
use tracing::debug;

/// Overrides engine values with monitoring values wherever a building is monitored.
///
/// Every row of a monitored building receives, for every damage state reported by
/// monitoring, the monitored value divided by the number of rows sharing that
/// building. Rows of unmonitored buildings keep their engine values. With no
/// monitoring table the engine table is returned as is.
pub fn merge_monitoring(
    engine: &DamageTable<AssetId>,
    monitoring: Option<&DamageTable<BuildingId>>,
    inventory: &Inventory,
) -> LossResult<DamageTable<AssetId>> {
    let monitoring = match monitoring {
        Some(m) if !m.is_empty() => m,
        _ => return Ok(engine.clone()),
    };

    let monitored = monitoring.entities();
    let states = monitoring.damage_states();
    let rows_per_building = inventory.rows_per_building();

    let mut merged = engine.clone();
    let mut overridden = 0usize;
    for asset in inventory {
        if !monitored.contains(&asset.building_id) {
            continue;
        }
        let rows = rows_per_building
            .get(&asset.building_id)
            .copied()
            .unwrap_or(1) as f64;
        for &state in &states {
            let value = monitoring.value(&asset.building_id, state) / rows;
            merged.insert(asset.asset_id.clone(), state, value);
        }
        overridden += 1;
    }

    debug!(
        monitored_buildings = monitored.len(),
        overridden_assets = overridden,
        "Merged monitoring damage"
    );
    Ok(merged)
}

//! Inventory row model.

use super::ids::{AssetId, BuildingId, OriginalAssetId};
use crate::damage_state::DamageState;
use crate::time_of_day::PerPeriod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    /// Creates a location.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// One inventory row: a building, a building class and a damage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Row identifier, unique within the snapshot.
    pub asset_id: AssetId,
    /// Physical building or aggregation tile the row belongs to.
    pub building_id: BuildingId,
    /// Undamaged building-by-class grouping the row descends from.
    pub original_asset_id: OriginalAssetId,
    /// Building class without the damage-state token.
    pub building_class: String,
    /// Current damage state of all buildings of the row.
    pub damage_state: DamageState,
    /// Number of buildings (or probability for a single building).
    pub building_count: f64,
    /// Replacement cost of all buildings of the row.
    pub replacement_cost: f64,
    /// Occupants irrespective of the time of day.
    pub census_occupants: f64,
    /// Occupants per period of the day.
    pub occupants: PerPeriod,
    /// Occupancy type (e.g. `Res`, `Com`, `Ind`).
    pub occupancy_type: String,
    pub location: Location,
    /// Administrative unit columns (`id_1`, `name_1`, ...).
    #[serde(default)]
    pub admin: BTreeMap<String, String>,
}

impl Asset {
    /// Creates an undamaged asset that is its own original asset.
    pub fn new(
        asset_id: impl Into<AssetId>,
        building_id: impl Into<BuildingId>,
        building_class: impl Into<String>,
        building_count: f64,
    ) -> Self {
        let asset_id = asset_id.into();
        Self {
            original_asset_id: OriginalAssetId::new(asset_id.as_str()),
            asset_id,
            building_id: building_id.into(),
            building_class: building_class.into(),
            damage_state: DamageState::UNDAMAGED,
            building_count,
            replacement_cost: 0.0,
            census_occupants: 0.0,
            occupants: PerPeriod::default(),
            occupancy_type: "Res".to_string(),
            location: Location::default(),
            admin: BTreeMap::new(),
        }
    }

    /// Sets the original asset.
    pub fn with_original_asset(mut self, id: impl Into<OriginalAssetId>) -> Self {
        self.original_asset_id = id.into();
        self
    }

    /// Sets the damage state.
    pub fn with_damage_state(mut self, state: DamageState) -> Self {
        self.damage_state = state;
        self
    }

    /// Sets the replacement cost.
    pub fn with_replacement_cost(mut self, cost: f64) -> Self {
        self.replacement_cost = cost;
        self
    }

    /// Sets census occupants and the per-period occupants.
    pub fn with_occupants(mut self, census: f64, occupants: PerPeriod) -> Self {
        self.census_occupants = census;
        self.occupants = occupants;
        self
    }

    /// Sets the occupancy type.
    pub fn with_occupancy_type(mut self, occupancy: impl Into<String>) -> Self {
        self.occupancy_type = occupancy.into();
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Adds an administrative attribute.
    pub fn with_admin(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.admin.insert(key.into(), value.into());
        self
    }
}

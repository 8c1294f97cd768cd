//! Inventory snapshots.
//!
//! An [`Inventory`] is an immutable, validated list of [`Asset`] rows. Every event
//! consumes one snapshot and produces a new one; buildings and original assets are
//! never stored separately but derived by grouping rows.

use super::asset::{Asset, Location};
use super::ids::{AssetId, BuildingId, OriginalAssetId};
use crate::damage_state::DamageState;
use crate::error::{LossError, LossResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Total replacement cost and census occupants of a building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingTotals {
    pub replacement_cost: f64,
    pub census_occupants: f64,
}

/// Validated inventory snapshot.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    assets: Vec<Asset>,
    index: HashMap<AssetId, usize>,
}

impl Inventory {
    /// Validates and wraps a list of rows.
    ///
    /// Asset ids must be unique and all rows of an original asset must belong to the
    /// same building.
    pub fn new(assets: Vec<Asset>) -> LossResult<Self> {
        let mut index = HashMap::with_capacity(assets.len());
        let mut building_of: HashMap<&OriginalAssetId, &BuildingId> = HashMap::new();

        for (i, asset) in assets.iter().enumerate() {
            if let Some(previous) = index.insert(asset.asset_id.clone(), i) {
                let earlier = &assets[previous];
                if earlier.original_asset_id != asset.original_asset_id {
                    return Err(LossError::InconsistentOriginalAsset {
                        asset_id: asset.asset_id.to_string(),
                    });
                }
                return Err(LossError::DuplicateAsset(asset.asset_id.to_string()));
            }

            let building = building_of
                .entry(&asset.original_asset_id)
                .or_insert(&asset.building_id);
            if *building != &asset.building_id {
                return Err(LossError::OriginalAssetSpansBuildings {
                    original_asset_id: asset.original_asset_id.to_string(),
                    first: building.to_string(),
                    second: asset.building_id.to_string(),
                });
            }
        }

        Ok(Self { assets, index })
    }

    /// Rows in snapshot order.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Iterates over rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Asset> {
        self.assets.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the snapshot has no rows.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Looks up a row.
    pub fn get(&self, asset_id: &AssetId) -> Option<&Asset> {
        self.index.get(asset_id).map(|&i| &self.assets[i])
    }

    /// Looks up a row, failing when it is absent.
    pub fn require(&self, asset_id: &AssetId) -> LossResult<&Asset> {
        self.get(asset_id)
            .ok_or_else(|| LossError::UnknownAsset(asset_id.to_string()))
    }

    /// Number of rows per building.
    pub fn rows_per_building(&self) -> HashMap<&BuildingId, usize> {
        let mut counts = HashMap::new();
        for asset in &self.assets {
            *counts.entry(&asset.building_id).or_insert(0) += 1;
        }
        counts
    }

    /// Row indices grouped by original asset.
    pub fn rows_by_original_asset(&self) -> BTreeMap<&OriginalAssetId, Vec<usize>> {
        let mut groups: BTreeMap<&OriginalAssetId, Vec<usize>> = BTreeMap::new();
        for (i, asset) in self.assets.iter().enumerate() {
            groups.entry(&asset.original_asset_id).or_default().push(i);
        }
        groups
    }

    /// First row of each original asset, used as the reference for attributes that
    /// only depend on the original asset.
    pub fn original_asset_references(&self) -> HashMap<&OriginalAssetId, &Asset> {
        let mut refs = HashMap::new();
        for asset in &self.assets {
            refs.entry(&asset.original_asset_id).or_insert(asset);
        }
        refs
    }

    /// Building count per original asset.
    pub fn building_count_per_original_asset(&self) -> BTreeMap<OriginalAssetId, f64> {
        let mut totals = BTreeMap::new();
        for asset in &self.assets {
            *totals.entry(asset.original_asset_id.clone()).or_insert(0.0) += asset.building_count;
        }
        totals
    }

    /// Building count per building and damage state.
    pub fn damage_summary(&self) -> BTreeMap<(BuildingId, DamageState), f64> {
        let mut summary = BTreeMap::new();
        for asset in &self.assets {
            *summary
                .entry((asset.building_id.clone(), asset.damage_state))
                .or_insert(0.0) += asset.building_count;
        }
        summary
    }

    /// Replacement cost and census occupants per building.
    pub fn totals_per_building(&self) -> BTreeMap<BuildingId, BuildingTotals> {
        let mut totals: BTreeMap<BuildingId, BuildingTotals> = BTreeMap::new();
        for asset in &self.assets {
            let entry = totals.entry(asset.building_id.clone()).or_default();
            entry.replacement_cost += asset.replacement_cost;
            entry.census_occupants += asset.census_occupants;
        }
        totals
    }

    /// Distinct building ids.
    pub fn building_ids(&self) -> BTreeSet<&BuildingId> {
        self.assets.iter().map(|a| &a.building_id).collect()
    }

    /// Distinct building classes.
    pub fn building_classes(&self) -> BTreeSet<&str> {
        self.assets.iter().map(|a| a.building_class.as_str()).collect()
    }

    /// Distinct locations, in first-seen order.
    pub fn unique_locations(&self) -> Vec<Location> {
        let mut seen = BTreeSet::new();
        self.assets
            .iter()
            .filter(|a| seen.insert((a.location.longitude.to_bits(), a.location.latitude.to_bits())))
            .map(|a| a.location)
            .collect()
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a Asset;
    type IntoIter = std::slice::Iter<'a, Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.assets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, building: &str, original: &str, count: f64) -> Asset {
        Asset::new(id, building, "CR/LFINF", count).with_original_asset(original)
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let result = Inventory::new(vec![
            asset("res_1", "osm_1", "exp_1", 1.0),
            asset("res_1", "osm_1", "exp_1", 2.0),
        ]);
        assert!(matches!(result, Err(LossError::DuplicateAsset(id)) if id == "res_1"));
    }

    #[test]
    fn test_asset_with_two_original_assets_rejected() {
        let result = Inventory::new(vec![
            asset("res_1", "osm_1", "exp_1", 1.0),
            asset("res_1", "osm_1", "exp_2", 2.0),
        ]);
        assert!(matches!(
            result,
            Err(LossError::InconsistentOriginalAsset { asset_id }) if asset_id == "res_1"
        ));
    }

    #[test]
    fn test_original_asset_spanning_buildings_rejected() {
        let result = Inventory::new(vec![
            asset("res_1", "osm_1", "exp_1", 1.0),
            asset("res_2", "osm_2", "exp_1", 2.0),
        ]);
        assert!(matches!(
            result,
            Err(LossError::OriginalAssetSpansBuildings { .. })
        ));
    }

    #[test]
    fn test_grouping_helpers() {
        let inventory = Inventory::new(vec![
            asset("res_1", "osm_1", "exp_1", 0.7)
                .with_replacement_cost(70.0)
                .with_location(Location::new(13.4, 42.35)),
            asset("res_2", "osm_1", "exp_1", 0.3)
                .with_damage_state(DamageState::new(2))
                .with_replacement_cost(30.0)
                .with_location(Location::new(13.4, 42.35)),
            asset("res_3", "tile_8", "exp_3", 90.0).with_location(Location::new(13.5, 42.4)),
        ])
        .unwrap();

        let per_building = inventory.rows_per_building();
        assert_eq!(per_building[&BuildingId::new("osm_1")], 2);

        let totals = inventory.building_count_per_original_asset();
        assert!((totals[&OriginalAssetId::new("exp_1")] - 1.0).abs() < 1e-12);

        let summary = inventory.damage_summary();
        assert!((summary[&(BuildingId::new("osm_1"), DamageState::new(2))] - 0.3).abs() < 1e-12);

        let costs = inventory.totals_per_building();
        assert!((costs[&BuildingId::new("osm_1")].replacement_cost - 100.0).abs() < 1e-9);

        assert_eq!(inventory.unique_locations().len(), 2);
        assert!(inventory.require(&AssetId::new("res_9")).is_err());
    }
}

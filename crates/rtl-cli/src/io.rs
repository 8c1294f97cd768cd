//! CSV readers and writers for inventories, models, catalogues and results.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use rtl_core::postprocess::LossSeries;
use rtl_core::{
    Asset, AssetId, BuildingId, ConsequenceModel, DamageState, DamageStateScale, DamageSummary,
    DamageTable, EconomicLosses, Earthquake, ForecastCatalogue, ForecastEvent, HumanLosses,
    InjuryConsequences, InjuryRecoveryModel, Inventory, Location, OccupancyRecoveryModel, PerPeriod,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use std::path::Path;

/// Monitoring damage per event id.
pub type MonitoringResults = BTreeMap<String, DamageTable<BuildingId>>;

/// Header positions of a CSV file.
struct Columns {
    path: String,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(path: &Path, headers: &StringRecord) -> Self {
        Self {
            path: path.display().to_string(),
            index: headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_string(), i))
                .collect(),
        }
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Column '{}' missing from {}", name, self.path))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn text<'r>(&self, record: &'r StringRecord, index: usize) -> &'r str {
        record.get(index).unwrap_or("").trim()
    }

    fn number(&self, record: &StringRecord, index: usize) -> Result<f64> {
        let value = self.text(record, index);
        value.parse::<f64>().with_context(|| {
            format!(
                "Invalid number '{}' on line {} of {}",
                value,
                line_of(record),
                self.path
            )
        })
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn create(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

fn records(path: &Path) -> Result<(Columns, Vec<StringRecord>)> {
    let mut reader = open(path)?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((Columns::new(path, &headers), rows))
}

fn deserialize<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    open(path)?
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parses RFC 3339 timestamps, or naive ones interpreted as UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(time.and_utc());
        }
    }
    bail!("Invalid datetime '{}'", value)
}

fn is_admin_column(name: &str) -> bool {
    name.starts_with("id_") || name.starts_with("name_")
}

fn resolve_state(scale: &DamageStateScale, label: &str) -> Result<DamageState> {
    scale
        .from_fragility_label(label)
        .or_else(|_| scale.from_engine_label(label))
        .map_err(Into::into)
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

const INVENTORY_COLUMNS: [&str; 13] = [
    "id",
    "lon",
    "lat",
    "taxonomy",
    "number",
    "structural",
    "census",
    "day",
    "night",
    "transit",
    "occupancy",
    "building_id",
    "original_asset_id",
];

/// Reads an inventory snapshot.
///
/// `taxonomy` carries the building class followed by the damage-state token
/// (`CR/LFINF/H:1/DS2`). `original_asset_id` defaults to the row id, and every
/// `id_*`/`name_*` column is kept as an administrative attribute.
pub fn read_inventory(path: &Path, scale: &DamageStateScale) -> Result<Inventory> {
    let (columns, rows) = records(path)?;
    let id = columns.require("id")?;
    let lon = columns.require("lon")?;
    let lat = columns.require("lat")?;
    let taxonomy = columns.require("taxonomy")?;
    let number = columns.require("number")?;
    let structural = columns.require("structural")?;
    let census = columns.require("census")?;
    let day = columns.require("day")?;
    let night = columns.require("night")?;
    let transit = columns.require("transit")?;
    let occupancy = columns.require("occupancy")?;
    let building_id = columns.require("building_id")?;
    let original_asset_id = columns.optional("original_asset_id");

    let mut admin: Vec<(&String, usize)> = columns
        .index
        .iter()
        .filter(|(name, _)| is_admin_column(name))
        .map(|(name, i)| (name, *i))
        .collect();
    admin.sort();

    let mut assets = Vec::with_capacity(rows.len());
    for record in &rows {
        let (class, state) = scale
            .parse_building_class(columns.text(record, taxonomy))
            .with_context(|| format!("Line {} of {}", line_of(record), path.display()))?;

        let mut asset = Asset::new(
            columns.text(record, id),
            columns.text(record, building_id),
            class,
            columns.number(record, number)?,
        )
        .with_damage_state(state)
        .with_replacement_cost(columns.number(record, structural)?)
        .with_occupants(
            columns.number(record, census)?,
            PerPeriod {
                day: columns.number(record, day)?,
                night: columns.number(record, night)?,
                transit: columns.number(record, transit)?,
            },
        )
        .with_occupancy_type(columns.text(record, occupancy))
        .with_location(Location::new(
            columns.number(record, lon)?,
            columns.number(record, lat)?,
        ));

        if let Some(index) = original_asset_id {
            let original = columns.text(record, index);
            if !original.is_empty() {
                asset = asset.with_original_asset(original);
            }
        }
        for (name, index) in &admin {
            asset = asset.with_admin(name.as_str(), columns.text(record, *index));
        }
        assets.push(asset);
    }

    Inventory::new(assets).with_context(|| format!("Invalid inventory {}", path.display()))
}

/// Writes an inventory snapshot in the format read by [`read_inventory`].
pub fn write_inventory(path: &Path, inventory: &Inventory, scale: &DamageStateScale) -> Result<()> {
    let admin: BTreeSet<&String> = inventory.iter().flat_map(|a| a.admin.keys()).collect();

    let mut writer = create(path)?;
    let mut header: Vec<&str> = INVENTORY_COLUMNS.to_vec();
    header.extend(admin.iter().map(|s| s.as_str()));
    writer.write_record(&header)?;

    for asset in inventory {
        let mut row = vec![
            asset.asset_id.to_string(),
            asset.location.longitude.to_string(),
            asset.location.latitude.to_string(),
            scale.format_building_class(&asset.building_class, asset.damage_state),
            asset.building_count.to_string(),
            asset.replacement_cost.to_string(),
            asset.census_occupants.to_string(),
            asset.occupants.day.to_string(),
            asset.occupants.night.to_string(),
            asset.occupants.transit.to_string(),
            asset.occupancy_type.clone(),
            asset.building_id.to_string(),
            asset.original_asset_id.to_string(),
        ];
        for key in &admin {
            row.push(asset.admin.get(*key).cloned().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ---------------------------------------------------------------------------
// Consequence and recovery models
// ---------------------------------------------------------------------------

/// Reads loss ratios (percentages) per building class, one column per damage state.
pub fn read_consequence_model(
    path: &Path,
    name: &str,
    scale: &DamageStateScale,
) -> Result<ConsequenceModel> {
    let (columns, rows) = records(path)?;
    let taxonomy = columns.require("Taxonomy")?;
    let per_state = scale
        .labels()
        .iter()
        .map(|labels| {
            columns
                .optional(&labels.fragility)
                .or_else(|| columns.optional(&labels.engine))
                .ok_or_else(|| {
                    anyhow!(
                        "No column for damage state '{}' in {}",
                        labels.fragility,
                        path.display()
                    )
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut model = ConsequenceModel::new(name);
    for record in &rows {
        let ratios = per_state
            .iter()
            .map(|i| columns.number(record, *i))
            .collect::<Result<Vec<_>>>()?;
        model.insert(columns.text(record, taxonomy), ratios);
    }
    Ok(model)
}

/// Reads one injury consequence model per severity level.
pub fn read_injury_consequences<F>(
    severities: &[String],
    scale: &DamageStateScale,
    path_of: F,
) -> Result<InjuryConsequences>
where
    F: Fn(&str) -> std::path::PathBuf,
{
    let models = severities
        .iter()
        .map(|severity| read_consequence_model(&path_of(severity), severity, scale))
        .collect::<Result<Vec<_>>>()?;
    Ok(InjuryConsequences::new(models))
}

#[derive(Debug, Deserialize)]
struct OccupancyRecoveryRecord {
    dmg_state: String,
    #[serde(rename = "N_inspection", default)]
    inspection: Option<i64>,
    #[serde(rename = "N_repair", default)]
    repair: Option<i64>,
    #[serde(rename = "N_damage", default)]
    total: Option<i64>,
}

impl OccupancyRecoveryRecord {
    /// Days before re-occupancy: inspection plus repair, unless `N_damage` is given.
    fn days(&self) -> Result<i64> {
        match (self.total, self.inspection, self.repair) {
            (Some(total), _, _) => Ok(total),
            (None, Some(inspection), Some(repair)) => Ok(inspection + repair),
            _ => bail!(
                "Damage state '{}' needs N_inspection and N_repair, or N_damage",
                self.dmg_state
            ),
        }
    }
}

/// Reads days before re-occupancy per damage state.
pub fn read_occupancy_recovery(
    path: &Path,
    scale: &DamageStateScale,
) -> Result<OccupancyRecoveryModel> {
    let days = deserialize::<OccupancyRecoveryRecord>(path)?
        .into_iter()
        .map(|r| Ok((resolve_state(scale, &r.dmg_state)?, r.days()?)))
        .collect::<Result<BTreeMap<_, _>>>()
        .with_context(|| format!("Invalid recovery model {}", path.display()))?;
    Ok(OccupancyRecoveryModel::new(days))
}

#[derive(Debug, Deserialize)]
struct InjuryRecoveryRecord {
    injuries_scale: String,
    #[serde(rename = "N_discharged")]
    days: i64,
}

/// Reads days before discharge per injury severity.
pub fn read_injury_recovery(path: &Path) -> Result<InjuryRecoveryModel> {
    let days = deserialize::<InjuryRecoveryRecord>(path)?
        .into_iter()
        .map(|r| (r.injuries_scale, r.days))
        .collect();
    Ok(InjuryRecoveryModel::new(days))
}

// ---------------------------------------------------------------------------
// Damage tables
// ---------------------------------------------------------------------------

/// Reads structural health monitoring damage: `building_id`, `dmg_state`, then one
/// column of probabilities per event id.
pub fn read_monitoring(path: &Path, scale: &DamageStateScale) -> Result<MonitoringResults> {
    let (columns, rows) = records(path)?;
    let building_id = columns.require("building_id")?;
    let dmg_state = columns.require("dmg_state")?;
    let events: Vec<(&String, usize)> = columns
        .index
        .iter()
        .filter(|(_, i)| **i != building_id && **i != dmg_state)
        .map(|(name, i)| (name, *i))
        .collect();

    let mut results = MonitoringResults::new();
    for record in &rows {
        let building = BuildingId::new(columns.text(record, building_id));
        let state = resolve_state(scale, columns.text(record, dmg_state))?;
        for (event_id, index) in &events {
            let value = columns.number(record, *index)?;
            results
                .entry(event_id.to_string())
                .or_default()
                .insert(building.clone(), state, value);
        }
    }
    Ok(results)
}

/// Engine damage rows, optionally split by logic-tree realization.
pub struct EngineRows {
    pub branches: BTreeMap<u32, DamageTable<AssetId>>,
}

/// Reads engine damage: `asset_id`, `dmg_state` (engine label), `value` and an
/// optional `rlz` column.
pub fn read_engine_damage(path: &Path, scale: &DamageStateScale) -> Result<EngineRows> {
    let (columns, rows) = records(path)?;
    let asset_id = columns.require("asset_id")?;
    let dmg_state = columns.require("dmg_state")?;
    let value = columns.require("value")?;
    let rlz = columns.optional("rlz");

    let mut branches: BTreeMap<u32, DamageTable<AssetId>> = BTreeMap::new();
    for record in &rows {
        let branch = match rlz {
            Some(i) => columns.text(record, i).parse::<u32>().with_context(|| {
                format!("Invalid realization on line {} of {}", line_of(record), path.display())
            })?,
            None => 0,
        };
        let state = scale.from_engine_label(columns.text(record, dmg_state))?;
        branches.entry(branch).or_default().add(
            AssetId::new(columns.text(record, asset_id)),
            state,
            columns.number(record, value)?,
        );
    }
    Ok(EngineRows { branches })
}

#[derive(Debug, Deserialize)]
struct WeightRecord {
    rlz: u32,
    weight: f64,
}

/// Reads logic-tree weights per realization.
pub fn read_realization_weights(path: &Path) -> Result<BTreeMap<u32, f64>> {
    Ok(deserialize::<WeightRecord>(path)?
        .into_iter()
        .map(|r| (r.rlz, r.weight))
        .collect())
}

/// Writes an asset damage table with engine labels.
pub fn write_damage_table(
    path: &Path,
    table: &DamageTable<AssetId>,
    scale: &DamageStateScale,
) -> Result<()> {
    let mut writer = create(path)?;
    writer.write_record(["asset_id", "dmg_state", "value"])?;
    for (asset, state, value) in table.iter() {
        writer.write_record([
            asset.to_string(),
            scale.engine_label(state).to_string(),
            value.to_string(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ---------------------------------------------------------------------------
// Triggers and catalogues
// ---------------------------------------------------------------------------

/// Kind of calculation requested by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AnalysisType {
    #[serde(rename = "RLA")]
    Rla,
    #[serde(rename = "OELF")]
    Oelf,
}

/// One line of the triggering file.
#[derive(Debug, Clone, Deserialize)]
pub struct Trigger {
    pub catalogue_filename: String,
    pub type_analysis: AnalysisType,
}

/// Reads the ordered triggers.
pub fn read_triggers(path: &Path) -> Result<Vec<Trigger>> {
    deserialize(path)
}

#[derive(Debug, Deserialize)]
struct EarthquakeRecord {
    #[serde(default)]
    ses_id: Option<u32>,
    #[serde(default)]
    event_id: String,
    datetime: String,
    magnitude: f64,
    longitude: f64,
    latitude: f64,
    #[serde(default)]
    depth: Option<f64>,
}

impl EarthquakeRecord {
    fn into_earthquake(self) -> Result<Earthquake> {
        let mut earthquake = Earthquake::new(
            self.event_id,
            parse_datetime(&self.datetime)?,
            self.magnitude,
            Location::new(self.longitude, self.latitude),
        );
        earthquake.depth_km = self.depth;
        Ok(earthquake)
    }
}

/// Reads the earthquake of a rapid loss assessment (first row of the file).
pub fn read_earthquake(path: &Path) -> Result<Earthquake> {
    let record = deserialize::<EarthquakeRecord>(path)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No earthquake in {}", path.display()))?;
    if record.event_id.is_empty() {
        bail!("Earthquake in {} has no event_id", path.display());
    }
    record
        .into_earthquake()
        .with_context(|| format!("Invalid earthquake in {}", path.display()))
}

/// Reads a forecast catalogue.
pub fn read_forecast_catalogue(path: &Path) -> Result<ForecastCatalogue> {
    let events = deserialize::<EarthquakeRecord>(path)?
        .into_iter()
        .map(|record| {
            let ses_id = record
                .ses_id
                .ok_or_else(|| anyhow!("Forecast earthquake without ses_id"))?;
            Ok(ForecastEvent::new(ses_id, record.into_earthquake()?))
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Invalid forecast catalogue {}", path.display()))?;
    Ok(ForecastCatalogue::new(events))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Writes building counts per building and damage state.
pub fn write_damage_summary(
    path: &Path,
    summary: &DamageSummary,
    scale: &DamageStateScale,
) -> Result<()> {
    let mut writer = create(path)?;
    writer.write_record(["building_id", "damage_state", "number"])?;
    for ((building, state), number) in summary {
        writer.write_record([
            building.to_string(),
            scale.fragility_label(*state).to_string(),
            number.to_string(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes economic loss per building.
pub fn write_economic(path: &Path, economic: &EconomicLosses) -> Result<()> {
    let mut writer = create(path)?;
    writer.write_record(["building_id", "loss"])?;
    for (building, loss) in economic {
        writer.write_record([building.to_string(), loss.to_string()])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes injuries per entity, one column per severity.
pub fn write_human<K: Ord + Clone + Display>(path: &Path, human: &HumanLosses<K>) -> Result<()> {
    let mut writer = create(path)?;
    let mut header = vec!["building_id".to_string()];
    header.extend(human.severities().iter().map(|s| format!("injuries_{s}")));
    writer.write_record(&header)?;
    for (entity, row) in human.iter() {
        let mut line = vec![entity.to_string()];
        line.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&line)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes a loss series with one column per event.
pub fn write_series<K: Ord + Clone + Display>(
    path: &Path,
    key_header: &str,
    series: &LossSeries<K>,
) -> Result<()> {
    let keys: BTreeSet<&K> = series.iter().flat_map(|(_, values)| values.keys()).collect();

    let mut writer = create(path)?;
    let mut header = vec![key_header.to_string()];
    header.extend(series.iter().map(|(label, _)| label.clone()));
    writer.write_record(&header)?;
    for key in keys {
        let mut line = vec![key.to_string()];
        line.extend(
            series
                .iter()
                .map(|(_, values)| values.get(key).copied().unwrap_or(0.0).to_string()),
        );
        writer.write_record(&line)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

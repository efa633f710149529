//! Immutable game-data tables loaded once from a directory of JSON files.
//!
//! The registry is constructed explicitly and shared by reference (usually
//! behind an `Arc`); nothing in the kernel re-reads configuration after load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ResourceKind, HOME_BASE_TYPE};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::progression::{clamped_at_level, value_at_index, CostTable};
use crate::templates::{CombatantTemplate, HeroTemplate, OfficialTemplate};

pub const BUILDING_TYPES_FILE: &str = "fiefdom_building_types.json";
pub const WALL_CONFIG_FILE: &str = "wall_config.json";
pub const COMBATANTS_FILE: &str = "player_combatants.json";
pub const HEROES_FILE: &str = "heroes.json";
pub const OFFICIALS_FILE: &str = "fiefdom_officials.json";

pub const DEFAULT_MAX_WALL_COUNT: i64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid entry in {file}: {reason}")]
    Invalid { file: String, reason: String },
    #[error("{kind} '{key}' is not configured")]
    NotFound { kind: &'static str, key: String },
}

impl ConfigError {
    fn invalid(file: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            file: file.to_string(),
            reason: reason.into(),
        }
    }

    fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Building types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MoraleEffectMode {
    /// Bonus counted once per building instance.
    #[default]
    Add,
    /// Bonus counted once however many instances exist.
    Max,
    /// Bonus compounded once per building instance.
    Multiply,
}

impl MoraleEffectMode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "max" => Self::Max,
            "multiply" => Self::Multiply,
            _ => Self::Add,
        }
    }
}

fn one_f64() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProductionDescriptor {
    pub amount: f64,
    #[serde(default = "one_f64")]
    pub amount_multiplier: f64,
    /// Hours per production cycle.
    pub periodicity: f64,
    /// Loaded and served with the config only. Catch-up holds the cycle
    /// length at `periodicity` for the whole window.
    #[serde(default = "one_f64")]
    pub periodicity_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingType {
    pub key: String,
    pub display_name: Option<String>,
    pub width: i64,
    pub height: i64,
    pub max_level: u32,
    /// Loaded and served with the config only. Placement accepts any spot
    /// inside the bounds whatever this says.
    pub can_build_outside_wall: bool,
    pub construction_times: Vec<f64>,
    pub costs: CostTable,
    pub production: BTreeMap<ResourceKind, ProductionDescriptor>,
    pub morale_boost: f64,
    pub morale_effect_mode: MoraleEffectMode,
}

impl BuildingType {
    pub fn dimensions(&self) -> (i64, i64) {
        (self.width, self.height)
    }

    pub fn is_home_base(&self) -> bool {
        self.key == HOME_BASE_TYPE
    }
}

fn one_i64() -> i64 {
    1
}

fn one_u32() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawBuildingType {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default = "one_i64")]
    width: i64,
    #[serde(default = "one_i64")]
    height: i64,
    #[serde(default = "one_u32")]
    max_level: u32,
    #[serde(default)]
    can_build_outside_wall: bool,
    #[serde(default)]
    construction_times: Vec<f64>,
    #[serde(default)]
    morale_boost: Option<f64>,
    #[serde(default)]
    morale_effect_mode: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Wall generations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WallGeneration {
    pub generation: u32,
    pub width: i64,
    pub length: i64,
    pub thickness: i64,
    pub hp: Vec<i64>,
    pub costs: CostTable,
    pub morale_boost: Vec<f64>,
    pub construction_times: Vec<f64>,
}

impl WallGeneration {
    /// A generation levels up once per configured HP entry.
    pub fn max_level(&self) -> u32 {
        self.hp.len() as u32
    }

    pub fn hp_at(&self, level: u32) -> i64 {
        value_at_index(&self.hp, level.max(1) as usize - 1).unwrap_or(0)
    }

    pub fn morale_at(&self, level: u32) -> f64 {
        clamped_at_level(&self.morale_boost, level)
    }
}

#[derive(Debug, Deserialize)]
struct RawWallConfig {
    #[serde(default)]
    max_wall_count: Option<i64>,
    #[serde(default)]
    walls: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawWallGeneration {
    width: i64,
    length: i64,
    thickness: i64,
    #[serde(default)]
    hp: Vec<i64>,
    #[serde(default)]
    morale_boost: Vec<f64>,
    #[serde(default)]
    construction_times: Vec<f64>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    buildings: BTreeMap<String, BuildingType>,
    walls: BTreeMap<u32, WallGeneration>,
    max_wall_count: Option<i64>,
    combatants: BTreeMap<String, CombatantTemplate>,
    heroes: BTreeMap<String, HeroTemplate>,
    officials: BTreeMap<String, OfficialTemplate>,
}

impl ConfigRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every table from `dir`. Building and wall files are required;
    /// personnel templates are optional.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let mut registry = Self::empty()
            .with_building_types(&read_json(dir, BUILDING_TYPES_FILE)?)?
            .with_walls(&read_json(dir, WALL_CONFIG_FILE)?)?;

        if let Some(value) = read_optional_json(dir, COMBATANTS_FILE)? {
            registry = registry.with_combatants(&value)?;
        }
        if let Some(value) = read_optional_json(dir, HEROES_FILE)? {
            registry = registry.with_heroes(&value)?;
        }
        if let Some(value) = read_optional_json(dir, OFFICIALS_FILE)? {
            registry = registry.with_officials(&value)?;
        }

        debug!(
            dir = %dir.display(),
            buildings = registry.buildings.len(),
            walls = registry.walls.len(),
            combatants = registry.combatants.len(),
            heroes = registry.heroes.len(),
            officials = registry.officials.len(),
            "loaded game config"
        );
        Ok(registry)
    }

    /// Accepts either `{key: {...}}` or `[{key: {...}}, ...]`.
    pub fn with_building_types(mut self, value: &Value) -> Result<Self, ConfigError> {
        let file = BUILDING_TYPES_FILE;
        let entries: Vec<(&String, &Value)> = match value {
            Value::Object(map) => map.iter().collect(),
            Value::Array(items) => {
                let mut entries = Vec::new();
                for item in items {
                    let Value::Object(map) = item else {
                        return Err(ConfigError::invalid(file, "array entries must be objects"));
                    };
                    entries.extend(map.iter());
                }
                entries
            }
            _ => return Err(ConfigError::invalid(file, "expected an object or array")),
        };

        for (key, raw) in entries {
            let building = parse_building_type(key, raw)?;
            if self.buildings.insert(key.clone(), building).is_some() {
                warn!(building_type = %key, "duplicate building type, keeping the last one");
            }
        }
        Ok(self)
    }

    pub fn with_walls(mut self, value: &Value) -> Result<Self, ConfigError> {
        let file = WALL_CONFIG_FILE;
        let raw: RawWallConfig =
            serde_json::from_value(value.clone()).map_err(|source| ConfigError::Parse {
                file: file.to_string(),
                source,
            })?;
        self.max_wall_count = raw.max_wall_count;

        for (key, entry) in raw.walls {
            let generation = key
                .parse::<u32>()
                .ok()
                .filter(|generation| *generation > 0)
                .ok_or_else(|| ConfigError::invalid(file, format!("bad generation key '{key}'")))?;
            let parsed: RawWallGeneration =
                serde_json::from_value(entry).map_err(|source| ConfigError::Parse {
                    file: file.to_string(),
                    source,
                })?;
            let costs = cost_columns(file, &key, &parsed.extra)?;
            self.walls.insert(
                generation,
                WallGeneration {
                    generation,
                    width: parsed.width,
                    length: parsed.length,
                    thickness: parsed.thickness,
                    hp: parsed.hp,
                    costs,
                    morale_boost: parsed.morale_boost,
                    construction_times: parsed.construction_times,
                },
            );
        }
        Ok(self)
    }

    pub fn with_combatants(mut self, value: &Value) -> Result<Self, ConfigError> {
        self.combatants = parse_templates(COMBATANTS_FILE, value)?;
        Ok(self)
    }

    pub fn with_heroes(mut self, value: &Value) -> Result<Self, ConfigError> {
        self.heroes = parse_templates(HEROES_FILE, value)?;
        Ok(self)
    }

    pub fn with_officials(mut self, value: &Value) -> Result<Self, ConfigError> {
        self.officials = parse_templates(OFFICIALS_FILE, value)?;
        Ok(self)
    }

    pub fn building(&self, key: &str) -> Result<&BuildingType, ConfigError> {
        self.buildings
            .get(key)
            .ok_or_else(|| ConfigError::not_found("building type", key))
    }

    /// Footprint of a building type; unresolvable types occupy a single cell.
    pub fn building_dimensions(&self, key: &str) -> (i64, i64) {
        self.buildings
            .get(key)
            .map(BuildingType::dimensions)
            .unwrap_or((1, 1))
    }

    pub fn wall_generation(&self, generation: u32) -> Result<&WallGeneration, ConfigError> {
        self.walls
            .get(&generation)
            .ok_or_else(|| ConfigError::not_found("wall generation", generation))
    }

    pub fn max_wall_count(&self) -> i64 {
        self.max_wall_count.unwrap_or(DEFAULT_MAX_WALL_COUNT)
    }

    pub fn combatant(&self, key: &str) -> Result<&CombatantTemplate, ConfigError> {
        self.combatants
            .get(key)
            .ok_or_else(|| ConfigError::not_found("combatant", key))
    }

    pub fn hero(&self, key: &str) -> Result<&HeroTemplate, ConfigError> {
        self.heroes
            .get(key)
            .ok_or_else(|| ConfigError::not_found("hero", key))
    }

    pub fn official(&self, key: &str) -> Result<&OfficialTemplate, ConfigError> {
        self.officials
            .get(key)
            .ok_or_else(|| ConfigError::not_found("official", key))
    }

    pub fn building_types(&self) -> impl Iterator<Item = &BuildingType> {
        self.buildings.values()
    }

    pub fn wall_generations(&self) -> impl Iterator<Item = &WallGeneration> {
        self.walls.values()
    }

    pub fn combatants(&self) -> impl Iterator<Item = (&String, &CombatantTemplate)> {
        self.combatants.iter()
    }

    pub fn heroes(&self) -> impl Iterator<Item = (&String, &HeroTemplate)> {
        self.heroes.iter()
    }

    pub fn officials(&self) -> impl Iterator<Item = (&String, &OfficialTemplate)> {
        self.officials.iter()
    }
}

fn read_json(dir: &Path, file: &str) -> Result<Value, ConfigError> {
    let path = dir.join(file);
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        file: file.to_string(),
        source,
    })
}

fn read_optional_json(dir: &Path, file: &str) -> Result<Option<Value>, ConfigError> {
    if !dir.join(file).exists() {
        debug!(file, "optional config file absent");
        return Ok(None);
    }
    read_json(dir, file).map(Some)
}

fn parse_building_type(key: &str, raw: &Value) -> Result<BuildingType, ConfigError> {
    let file = BUILDING_TYPES_FILE;
    let parsed: RawBuildingType =
        serde_json::from_value(raw.clone()).map_err(|source| ConfigError::Parse {
            file: file.to_string(),
            source,
        })?;
    if parsed.width <= 0 || parsed.height <= 0 {
        return Err(ConfigError::invalid(
            file,
            format!("{key} has a non-positive footprint"),
        ));
    }

    let costs = cost_columns(file, key, &parsed.extra)?;
    let mut production = BTreeMap::new();
    for kind in ResourceKind::ALL {
        let Some(entry) = parsed.extra.get(kind.as_str()) else {
            continue;
        };
        let descriptor: ProductionDescriptor = serde_json::from_value(entry.clone()).map_err(
            |source| ConfigError::Invalid {
                file: file.to_string(),
                reason: format!("{key}.{kind}: {source}"),
            },
        )?;
        production.insert(kind, descriptor);
    }

    Ok(BuildingType {
        key: key.to_string(),
        display_name: parsed.display_name,
        width: parsed.width,
        height: parsed.height,
        max_level: parsed.max_level,
        can_build_outside_wall: parsed.can_build_outside_wall,
        construction_times: parsed.construction_times,
        costs,
        production,
        morale_boost: parsed.morale_boost.unwrap_or(0.0),
        morale_effect_mode: parsed
            .morale_effect_mode
            .as_deref()
            .map(MoraleEffectMode::parse)
            .unwrap_or_default(),
    })
}

fn cost_columns(
    file: &str,
    owner: &str,
    extra: &BTreeMap<String, Value>,
) -> Result<CostTable, ConfigError> {
    let mut columns = BTreeMap::new();
    for kind in ResourceKind::COSTED {
        let field = format!("{kind}_cost");
        let Some(entry) = extra.get(&field) else {
            continue;
        };
        let Value::Array(items) = entry else {
            return Err(ConfigError::invalid(file, format!("{owner}.{field} must be an array")));
        };
        let values = items
            .iter()
            .map(|item| {
                item.as_i64()
                    .or_else(|| item.as_f64().map(|value| value as i64))
                    .ok_or_else(|| {
                        ConfigError::invalid(file, format!("{owner}.{field} holds a non-number"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        columns.insert(kind, values);
    }
    Ok(CostTable::new(columns))
}

fn parse_templates<T>(file: &str, value: &Value) -> Result<BTreeMap<String, T>, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value.clone()).map_err(|source| ConfigError::Parse {
        file: file.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn building_types() -> Value {
        json!([
            {"home_base": {
                "display_name": "Manor House",
                "width": 4, "height": 4,
                "gold_cost": [0],
                "construction_times": [0],
                "gold": {"amount": 10, "periodicity": 1},
                "morale_boost": 5,
                "icon": "manor.png"
            }},
            {"farm": {
                "width": 2, "height": 3, "max_level": 3,
                "gold_cost": [100, 150.9, 200], "wood_cost": [20, 30, 40],
                "grain": {"amount": 10, "amount_multiplier": 1.2, "periodicity": 60},
                "morale_effect_mode": "multiply", "morale_boost": 1.1
            }}
        ])
    }

    #[test]
    fn array_building_config_flattens_costs_and_production() {
        let registry = ConfigRegistry::empty()
            .with_building_types(&building_types())
            .expect("buildings");

        let farm = registry.building("farm").expect("farm");
        assert_eq!(farm.dimensions(), (2, 3));
        assert_eq!(farm.costs.column(ResourceKind::Gold), Some(&[100, 150, 200][..]));
        assert_eq!(farm.morale_effect_mode, MoraleEffectMode::Multiply);
        let grain = farm.production[&ResourceKind::Grain];
        assert_eq!(grain.amount_multiplier, 1.2);
        assert_eq!(grain.periodicity_multiplier, 1.0);

        let manor = registry.building(HOME_BASE_TYPE).expect("home base");
        assert!(manor.is_home_base());
        assert_eq!(manor.max_level, 1);
        assert_eq!(manor.display_name.as_deref(), Some("Manor House"));
    }

    #[test]
    fn object_building_config_is_accepted() {
        let registry = ConfigRegistry::empty()
            .with_building_types(&json!({"hut": {"gold_cost": [5]}}))
            .expect("buildings");
        assert_eq!(registry.building_dimensions("hut"), (1, 1));
        assert_eq!(registry.building_dimensions("missing"), (1, 1));
    }

    #[test]
    fn lookups_report_missing_keys() {
        let registry = ConfigRegistry::empty();
        let err = registry.building("castle").expect_err("missing building");
        assert!(matches!(err, ConfigError::NotFound { kind: "building type", .. }));
        assert!(registry.wall_generation(1).is_err());
        assert!(registry.hero("ghost").is_err());
        assert_eq!(registry.max_wall_count(), DEFAULT_MAX_WALL_COUNT);
    }

    #[test]
    fn walls_parse_generation_keys_and_hp_levels() {
        let registry = ConfigRegistry::empty()
            .with_walls(&json!({
                "max_wall_count": 3,
                "walls": {
                    "1": {
                        "width": 40, "length": 40, "thickness": 2,
                        "hp": [100, 150], "gold_cost": [50, 75], "stone_cost": [20, 30],
                        "morale_boost": [2.0, 3.0], "construction_times": [600, 1200]
                    }
                }
            }))
            .expect("walls");

        let wall = registry.wall_generation(1).expect("generation 1");
        assert_eq!(wall.max_level(), 2);
        assert_eq!(wall.hp_at(1), 100);
        assert_eq!(wall.hp_at(2), 150);
        assert_eq!(wall.morale_at(5), 3.0);
        assert_eq!(registry.max_wall_count(), 3);
    }

    #[test]
    fn bad_wall_generation_key_is_rejected() {
        let err = ConfigRegistry::empty()
            .with_walls(&json!({"walls": {"first": {"width": 1, "length": 1, "thickness": 1}}}))
            .expect_err("bad key");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_production_descriptor_is_rejected() {
        let err = ConfigRegistry::empty()
            .with_building_types(&json!({"mill": {"grain": {"amount": 5}}}))
            .expect_err("missing periodicity");
        assert!(err.to_string().contains("mill.grain"));
    }

    #[test]
    fn load_dir_requires_core_files_and_tolerates_missing_templates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = ConfigRegistry::load_dir(dir.path()).expect_err("no files yet");
        assert!(matches!(missing, ConfigError::Io { .. }));

        fs::write(
            dir.path().join(BUILDING_TYPES_FILE),
            building_types().to_string(),
        )
        .expect("write buildings");
        fs::write(dir.path().join(WALL_CONFIG_FILE), r#"{"walls": {}}"#).expect("write walls");
        fs::write(
            dir.path().join(HEROES_FILE),
            r#"{"warden": {"name": "Warden", "morale_boost": [1.0]}}"#,
        )
        .expect("write heroes");

        let registry = ConfigRegistry::load_dir(dir.path()).expect("load");
        assert!(registry.building("farm").is_ok());
        assert!(registry.hero("warden").is_ok());
        assert_eq!(registry.combatants().count(), 0);
    }
}

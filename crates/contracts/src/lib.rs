//! v1 cross-boundary contracts for the fiefdom kernel, its store, and its façades.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Symmetric coordinate bound on both axes of a fiefdom's local grid.
pub const PLACEMENT_BOUND: i64 = 1000;
pub const MORALE_MIN: f64 = -1000.0;
pub const MORALE_MAX: f64 = 1000.0;
pub const HOME_BASE_TYPE: &str = "home_base";

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Peasants,
    Gold,
    Grain,
    Wood,
    Steel,
    Bronze,
    Stone,
    Leather,
    Mana,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Peasants,
        ResourceKind::Gold,
        ResourceKind::Grain,
        ResourceKind::Wood,
        ResourceKind::Steel,
        ResourceKind::Bronze,
        ResourceKind::Stone,
        ResourceKind::Leather,
        ResourceKind::Mana,
    ];

    /// Resources that may appear as `<resource>_cost` arrays in structure configs.
    pub const COSTED: [ResourceKind; 8] = [
        ResourceKind::Gold,
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Steel,
        ResourceKind::Bronze,
        ResourceKind::Grain,
        ResourceKind::Leather,
        ResourceKind::Mana,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Peasants => "peasants",
            Self::Gold => "gold",
            Self::Grain => "grain",
            Self::Wood => "wood",
            Self::Steel => "steel",
            Self::Bronze => "bronze",
            Self::Stone => "stone",
            Self::Leather => "leather",
            Self::Mana => "mana",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sparse per-resource amounts. Absent keys mean zero.
pub type ResourceAmounts = BTreeMap<ResourceKind, i64>;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(rename = "build", alias = "create")]
    Create,
    Demolish,
    Move,
    BuildWall,
    Upgrade,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Create,
        ActionKind::Demolish,
        ActionKind::Move,
        ActionKind::BuildWall,
        ActionKind::Upgrade,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "build",
            Self::Demolish => "demolish",
            Self::Move => "move",
            Self::BuildWall => "build_wall",
            Self::Upgrade => "upgrade",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            other => Self::ALL.into_iter().find(|kind| kind.as_str() == other),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    FiefdomIdRequired,
    BuildingTypeRequired,
    BuildingIdRequired,
    CoordinatesRequired,
    WallGenerationRequired,
    UpgradeIdRequired,
    UpgradeTargetAmbiguous,
    NotOwner,
    BuildingNotFound,
    WallNotFound,
    UnknownBuilding,
    InvalidConfig,
    HomeBaseExists,
    HomeBaseRequired,
    HomeBaseWrongLocation,
    InvalidLocation,
    HomeBaseImmutable,
    CannotMoveUnderConstruction,
    MoveLocationInvalid,
    GenerationInvalid,
    GenerationSequenceRequired,
    GenerationExists,
    MaxWallCountReached,
    InsufficientResources,
    UpgradeInProgress,
    MaxLevelReached,
    UnknownAction,
    DatabaseError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FiefdomIdRequired => "fiefdom_id_required",
            Self::BuildingTypeRequired => "building_type_required",
            Self::BuildingIdRequired => "building_id_required",
            Self::CoordinatesRequired => "coordinates_required",
            Self::WallGenerationRequired => "wall_generation_required",
            Self::UpgradeIdRequired => "upgrade_id_required",
            Self::UpgradeTargetAmbiguous => "upgrade_target_ambiguous",
            Self::NotOwner => "not_owner",
            Self::BuildingNotFound => "building_not_found",
            Self::WallNotFound => "wall_not_found",
            Self::UnknownBuilding => "unknown_building",
            Self::InvalidConfig => "invalid_config",
            Self::HomeBaseExists => "home_base_exists",
            Self::HomeBaseRequired => "home_base_required",
            Self::HomeBaseWrongLocation => "home_base_wrong_location",
            Self::InvalidLocation => "invalid_location",
            Self::HomeBaseImmutable => "home_base_immutable",
            Self::CannotMoveUnderConstruction => "cannot_move_under_construction",
            Self::MoveLocationInvalid => "move_location_invalid",
            Self::GenerationInvalid => "generation_invalid",
            Self::GenerationSequenceRequired => "generation_sequence_required",
            Self::GenerationExists => "generation_exists",
            Self::MaxWallCountReached => "max_wall_count_reached",
            Self::InsufficientResources => "insufficient_resources",
            Self::UpgradeInProgress => "upgrade_in_progress",
            Self::MaxLevelReached => "max_level_reached",
            Self::UnknownAction => "unknown_action",
            Self::DatabaseError => "database_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One before/after record of a single field change caused by an action or catch-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffValue {
    pub field: String,
    pub source_type: String,
    pub source_id: i64,
    pub entity_key: String,
    pub from_value: Value,
    pub to_value: Value,
}

impl DiffValue {
    pub fn new(
        field: impl Into<String>,
        source_type: impl Into<String>,
        source_id: i64,
        entity_key: impl Into<String>,
        from_value: impl Into<Value>,
        to_value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            source_type: source_type.into(),
            source_id,
            entity_key: entity_key.into(),
            from_value: from_value.into(),
            to_value: to_value.into(),
        }
    }

    pub fn fiefdom_field(
        fiefdom_id: i64,
        field: impl Into<String>,
        from_value: impl Into<Value>,
        to_value: impl Into<Value>,
    ) -> Self {
        Self::new(field, "fiefdom", fiefdom_id, "fiefdom_id", from_value, to_value)
    }

    pub fn fiefdom_resource(fiefdom_id: i64, kind: ResourceKind, from: i64, to: i64) -> Self {
        Self::fiefdom_field(fiefdom_id, kind.as_str(), from, to)
    }

    pub fn building_field(
        building_id: i64,
        field: impl Into<String>,
        from_value: impl Into<Value>,
        to_value: impl Into<Value>,
    ) -> Self {
        Self::new(field, "building", building_id, "building_id", from_value, to_value)
    }

    pub fn wall_field(
        wall_id: i64,
        field: impl Into<String>,
        from_value: impl Into<Value>,
        to_value: impl Into<Value>,
    ) -> Self {
        Self::new(field, "wall", wall_id, "wall_id", from_value, to_value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub schema_version: String,
    pub action: String,
    pub status: ActionStatus,
    pub error_code: Option<ErrorCode>,
    pub message: String,
    #[serde(default)]
    pub diffs: Vec<DiffValue>,
    #[serde(default)]
    pub result: Map<String, Value>,
    pub action_timestamp: i64,
}

impl ActionResult {
    pub fn ok(
        action: impl Into<String>,
        message: impl Into<String>,
        diffs: Vec<DiffValue>,
        result: Map<String, Value>,
        action_timestamp: i64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            action: action.into(),
            status: ActionStatus::Ok,
            error_code: None,
            message: message.into(),
            diffs,
            result,
            action_timestamp,
        }
    }

    pub fn fail(
        action: impl Into<String>,
        error_code: ErrorCode,
        message: impl Into<String>,
        action_timestamp: i64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            action: action.into(),
            status: ActionStatus::Fail,
            error_code: Some(error_code),
            message: message.into(),
            diffs: Vec::new(),
            result: Map::new(),
            action_timestamp,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ActionStatus::Ok
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code {
            Some(code) => write!(f, "{} FAIL {}: {}", self.action, code, self.message),
            None => write!(
                f,
                "{} OK: {} ({} diffs)",
                self.action,
                self.message,
                self.diffs.len()
            ),
        }
    }
}

/// Identity of the caller, already authenticated by the façade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionContext {
    pub requesting_character_id: i64,
    pub requesting_fiefdom_id: Option<i64>,
}

impl ActionContext {
    pub fn new(requesting_character_id: i64) -> Self {
        Self {
            requesting_character_id,
            requesting_fiefdom_id: None,
        }
    }

    pub fn with_fiefdom(mut self, fiefdom_id: i64) -> Self {
        self.requesting_fiefdom_id = Some(fiefdom_id);
        self
    }
}

/// Loosely-typed field bag shared by every action kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiefdom_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_generation: Option<u32>,
}

impl ActionPayload {
    pub fn build(fiefdom_id: i64, building_type: impl Into<String>, x: i64, y: i64) -> Self {
        Self {
            fiefdom_id: Some(fiefdom_id),
            building_type: Some(building_type.into()),
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn demolish(building_id: i64) -> Self {
        Self {
            building_id: Some(building_id),
            ..Self::default()
        }
    }

    pub fn relocate(building_id: i64, x: i64, y: i64) -> Self {
        Self {
            building_id: Some(building_id),
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn build_wall(fiefdom_id: i64, generation: u32) -> Self {
        Self {
            fiefdom_id: Some(fiefdom_id),
            wall_generation: Some(generation),
            ..Self::default()
        }
    }

    pub fn upgrade_building(building_id: i64) -> Self {
        Self {
            building_id: Some(building_id),
            ..Self::default()
        }
    }

    pub fn upgrade_wall(wall_id: i64) -> Self {
        Self {
            wall_id: Some(wall_id),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Time catch-up
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Building,
    Wall,
}

impl StructureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Wall => "wall",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionUpdate {
    pub fiefdom_id: i64,
    pub building_id: i64,
    pub building_type: String,
    pub resource: ResourceKind,
    pub cycles: u64,
    /// Exact closed-form total for the elapsed window.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionEvent {
    pub fiefdom_id: i64,
    pub source_type: StructureKind,
    pub source_id: i64,
    pub name: String,
    pub new_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoraleChange {
    pub fiefdom_id: i64,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeUpdateResult {
    pub new_timestamp: i64,
    pub hours_elapsed: f64,
    #[serde(default)]
    pub productions_applied: Vec<ProductionUpdate>,
    #[serde(default)]
    pub completions: Vec<CompletionEvent>,
    #[serde(default)]
    pub morale_changes: Vec<MoraleChange>,
    pub fiefdoms_updated: usize,
    #[serde(default)]
    pub failed_fiefdoms: Vec<i64>,
}

impl TimeUpdateResult {
    pub fn unchanged(new_timestamp: i64, hours_elapsed: f64) -> Self {
        Self {
            new_timestamp,
            hours_elapsed,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: TimeUpdateResult) {
        self.new_timestamp = self.new_timestamp.max(other.new_timestamp);
        self.hours_elapsed = self.hours_elapsed.max(other.hours_elapsed);
        self.productions_applied.extend(other.productions_applied);
        self.completions.extend(other.completions);
        self.morale_changes.extend(other.morale_changes);
        self.fiefdoms_updated += other.fiefdoms_updated;
        self.failed_fiefdoms.extend(other.failed_fiefdoms);
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfficialRole {
    Bailiff,
    Wizard,
    Architect,
    Steward,
    Reeve,
    Beadle,
    Constable,
    Forester,
}

impl OfficialRole {
    pub const ALL: [OfficialRole; 8] = [
        OfficialRole::Bailiff,
        OfficialRole::Wizard,
        OfficialRole::Architect,
        OfficialRole::Steward,
        OfficialRole::Reeve,
        OfficialRole::Beadle,
        OfficialRole::Constable,
        OfficialRole::Forester,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bailiff => "bailiff",
            Self::Wizard => "wizard",
            Self::Architect => "architect",
            Self::Steward => "steward",
            Self::Reeve => "reeve",
            Self::Beadle => "beadle",
            Self::Constable => "constable",
            Self::Forester => "forester",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == raw)
    }
}

impl fmt::Display for OfficialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildingSnapshot {
    pub id: i64,
    pub fiefdom_id: i64,
    pub building_type: String,
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub construction_start_ts: i64,
    pub action_start_ts: i64,
    pub action_tag: Option<String>,
}

impl BuildingSnapshot {
    pub fn is_complete(&self) -> bool {
        self.level > 0
    }

    pub fn is_under_construction(&self) -> bool {
        self.construction_start_ts > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WallSnapshot {
    pub id: i64,
    pub fiefdom_id: i64,
    pub generation: u32,
    pub level: u32,
    pub hp: i64,
    pub width: i64,
    pub length: i64,
    pub thickness: i64,
    pub construction_start_ts: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfficialStats {
    pub intelligence: i64,
    pub charisma: i64,
    pub wisdom: i64,
    pub diligence: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfficialSnapshot {
    pub id: i64,
    pub fiefdom_id: i64,
    pub role: OfficialRole,
    pub template_id: String,
    pub portrait_id: i64,
    pub name: String,
    pub level: u32,
    pub stats: OfficialStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeroSkillSnapshot {
    pub skill_id: String,
    pub name: String,
    pub damage: i64,
    pub defense: i64,
    pub healing: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeroSnapshot {
    pub id: i64,
    pub fiefdom_id: i64,
    pub template_id: String,
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub equipment_slots: BTreeMap<String, i64>,
    #[serde(default)]
    pub skills: Vec<HeroSkillSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DamageProfile {
    #[serde(default)]
    pub melee: i64,
    #[serde(default)]
    pub ranged: i64,
    #[serde(default)]
    pub magical: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatantSnapshot {
    pub id: i64,
    pub fiefdom_id: i64,
    pub template_id: String,
    pub name: String,
    pub level: u32,
    pub damage: DamageProfile,
    pub defense: Option<DamageProfile>,
    pub movement_speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FiefdomSnapshot {
    pub schema_version: String,
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub resources: ResourceAmounts,
    pub wall_count: i64,
    /// Morale as last persisted by catch-up.
    pub morale: f64,
    /// Morale recomputed from the structures and personnel in this snapshot.
    pub live_morale: f64,
    pub last_update_time: i64,
    #[serde(default)]
    pub buildings: Vec<BuildingSnapshot>,
    #[serde(default)]
    pub walls: Vec<WallSnapshot>,
    #[serde(default)]
    pub officials: Vec<OfficialSnapshot>,
    #[serde(default)]
    pub heroes: Vec<HeroSnapshot>,
    #[serde(default)]
    pub combatants: Vec<CombatantSnapshot>,
}

impl FiefdomSnapshot {
    pub fn resource(&self, kind: ResourceKind) -> i64 {
        self.resources.get(&kind).copied().unwrap_or(0)
    }

    pub fn home_base(&self) -> Option<&BuildingSnapshot> {
        self.buildings
            .iter()
            .find(|building| building.building_type == HOME_BASE_TYPE)
    }
}

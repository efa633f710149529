use contracts::{
    ActionContext, ActionKind, ActionPayload, BuildingSnapshot, DiffValue, ErrorCode,
    ResourceAmounts, StructureKind, WallSnapshot,
};
use kernel_core::economy::next_level_cost;
use kernel_core::FiefdomLedger;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use super::{
    amounts_value, commit_ledger, ensure_affordable, insufficient, object, owned_fiefdom, reject,
    ActionEnv, ActionError, ActionHandler, Applied,
};
use crate::persistence;

pub(crate) struct UpgradeStructure;

enum Target {
    Building(BuildingSnapshot),
    Wall(WallSnapshot),
}

impl Target {
    fn kind(&self) -> StructureKind {
        match self {
            Self::Building(_) => StructureKind::Building,
            Self::Wall(_) => StructureKind::Wall,
        }
    }

    fn id(&self) -> i64 {
        match self {
            Self::Building(building) => building.id,
            Self::Wall(wall) => wall.id,
        }
    }

    fn fiefdom_id(&self) -> i64 {
        match self {
            Self::Building(building) => building.fiefdom_id,
            Self::Wall(wall) => wall.fiefdom_id,
        }
    }

    fn level(&self) -> u32 {
        match self {
            Self::Building(building) => building.level,
            Self::Wall(wall) => wall.level,
        }
    }

    fn construction_start_ts(&self) -> i64 {
        match self {
            Self::Building(building) => building.construction_start_ts,
            Self::Wall(wall) => wall.construction_start_ts,
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Building(building) => building.building_type.clone(),
            Self::Wall(wall) => format!("wall generation {}", wall.generation),
        }
    }
}

pub(crate) struct UpgradePlan {
    ledger: FiefdomLedger,
    target: Target,
    max_level: u32,
    /// Hit points for the next level; walls only.
    next_hp: i64,
    cost: ResourceAmounts,
}

fn load_target(
    conn: &Connection,
    env: &ActionEnv<'_>,
    payload: &ActionPayload,
) -> Result<Target, ActionError> {
    match (payload.building_id, payload.wall_id) {
        (None, None) => Err(reject(
            ErrorCode::UpgradeIdRequired,
            "either building_id or wall_id is required",
        )),
        (Some(_), Some(_)) => Err(reject(
            ErrorCode::UpgradeTargetAmbiguous,
            "supply building_id or wall_id, not both",
        )),
        (Some(building_id), None) => persistence::load_building(conn, env.config, building_id)?
            .map(Target::Building)
            .ok_or_else(|| {
                reject(
                    ErrorCode::BuildingNotFound,
                    format!("building {building_id} not found"),
                )
            }),
        (None, Some(wall_id)) => persistence::load_wall(conn, env.config, wall_id)?
            .map(Target::Wall)
            .ok_or_else(|| reject(ErrorCode::WallNotFound, format!("wall {wall_id} not found"))),
    }
}

impl ActionHandler for UpgradeStructure {
    type Plan = UpgradePlan;

    const KIND: ActionKind = ActionKind::Upgrade;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<UpgradePlan, ActionError> {
        let target = load_target(conn, env, payload)?;
        let fiefdom_id = target.fiefdom_id();
        if let Some(requested) = payload.fiefdom_id.filter(|requested| *requested != fiefdom_id) {
            return Err(reject(
                ErrorCode::NotOwner,
                format!(
                    "{} {} does not belong to fiefdom {requested}",
                    target.kind().as_str(),
                    target.id()
                ),
            ));
        }
        let fiefdom = owned_fiefdom(conn, ctx, fiefdom_id)?;

        let level = target.level();
        if level == 0 || target.construction_start_ts() > 0 {
            return Err(reject(
                ErrorCode::UpgradeInProgress,
                format!("{} is already under construction", target.name()),
            ));
        }

        let (costs, max_level, next_hp) = match &target {
            Target::Building(building) => {
                let config = env
                    .config
                    .building(&building.building_type)
                    .map_err(|err| reject(ErrorCode::InvalidConfig, err.to_string()))?;
                (&config.costs, config.max_level, 0)
            }
            Target::Wall(wall) => {
                let config = env
                    .config
                    .wall_generation(wall.generation)
                    .map_err(|err| reject(ErrorCode::InvalidConfig, err.to_string()))?;
                (&config.costs, config.max_level(), config.hp_at(level + 1))
            }
        };
        if level >= max_level {
            return Err(reject(
                ErrorCode::MaxLevelReached,
                format!("{} is already at max level {max_level}", target.name()),
            ));
        }

        let cost = next_level_cost(costs, level);
        let ledger = FiefdomLedger::new(fiefdom.id, fiefdom.resources);
        ensure_affordable(&ledger, &cost)?;

        Ok(UpgradePlan {
            ledger,
            target,
            max_level,
            next_hp,
            cost,
        })
    }

    fn preview(&self, plan: &UpgradePlan) -> Map<String, Value> {
        let level = plan.target.level();
        let mut result = object(json!({
            "fiefdom_id": plan.target.fiefdom_id(),
            "target_type": plan.target.kind().as_str(),
            "current_level": level,
            "target_level": level + 1,
            "max_level": plan.max_level,
            "cost": amounts_value(&plan.cost),
        }));
        let id_key = match plan.target.kind() {
            StructureKind::Building => "building_id",
            StructureKind::Wall => "wall_id",
        };
        result.insert(id_key.to_string(), Value::from(plan.target.id()));
        result
    }

    fn apply(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        plan: UpgradePlan,
    ) -> Result<Applied, ActionError> {
        let mut result = self.preview(&plan);
        let UpgradePlan {
            mut ledger,
            target,
            next_hp,
            cost,
            ..
        } = plan;

        ledger.deduct(&cost).map_err(insufficient)?;
        let mut diffs = commit_ledger(conn, ledger)?;
        let level = target.level();

        match &target {
            // Buildings keep their level until catch-up completes the work.
            Target::Building(building) => {
                persistence::set_building_construction(conn, building.id, level, env.now, env.now)?;
                diffs.push(DiffValue::building_field(
                    building.id,
                    "construction_start_ts",
                    building.construction_start_ts,
                    env.now,
                ));
            }
            // Walls gain the level and its hit points at once.
            Target::Wall(wall) => {
                persistence::update_wall(conn, wall.id, level + 1, next_hp, env.now, env.now)?;
                diffs.push(DiffValue::wall_field(wall.id, "level", level, level + 1));
                diffs.push(DiffValue::wall_field(wall.id, "hp", wall.hp, next_hp));
                diffs.push(DiffValue::wall_field(
                    wall.id,
                    "construction_start_ts",
                    wall.construction_start_ts,
                    env.now,
                ));
                result.insert("hp".to_string(), Value::from(next_hp));
            }
        }

        Ok(Applied {
            message: format!("{} upgrade to level {} started", target.name(), level + 1),
            diffs,
            result,
        })
    }
}

use contracts::{
    ActionContext, ActionKind, ActionPayload, BuildingSnapshot, DiffValue, ErrorCode,
    ResourceAmounts, HOME_BASE_TYPE,
};
use kernel_core::economy::move_cost;
use kernel_core::{check_placement, FiefdomLedger, PlacementRequest};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use super::{
    amounts_value, commit_ledger, ensure_affordable, insufficient, object, owned_fiefdom, reject,
    required_building_id, required_coordinates, ActionEnv, ActionError, ActionHandler, Applied,
};
use crate::persistence;

pub(crate) struct MoveBuilding;

pub(crate) struct MovePlan {
    ledger: FiefdomLedger,
    building: BuildingSnapshot,
    x: i64,
    y: i64,
    cost: ResourceAmounts,
}

impl ActionHandler for MoveBuilding {
    type Plan = MovePlan;

    const KIND: ActionKind = ActionKind::Move;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<MovePlan, ActionError> {
        let building_id = required_building_id(payload)?;
        let (x, y) = required_coordinates(payload)?;
        let building = persistence::load_building(conn, env.config, building_id)?.ok_or_else(|| {
            reject(
                ErrorCode::BuildingNotFound,
                format!("building {building_id} not found"),
            )
        })?;
        let fiefdom = owned_fiefdom(conn, ctx, building.fiefdom_id)?;
        if building.building_type == HOME_BASE_TYPE {
            return Err(reject(
                ErrorCode::HomeBaseImmutable,
                "the home base cannot be moved",
            ));
        }
        if !building.is_complete() {
            return Err(reject(
                ErrorCode::CannotMoveUnderConstruction,
                "buildings under construction cannot be moved",
            ));
        }
        let config = env
            .config
            .building(&building.building_type)
            .map_err(|err| reject(ErrorCode::InvalidConfig, err.to_string()))?;

        let existing = persistence::load_buildings(conn, env.config, building.fiefdom_id)?;
        let request = PlacementRequest::new(&building.building_type, x, y).excluding(building.id);
        let placement = check_placement(env.config, &existing, &request);
        if !placement.valid {
            return Err(reject(ErrorCode::MoveLocationInvalid, placement.message));
        }

        let cost = move_cost(&config.costs, building.level);
        let ledger = FiefdomLedger::new(fiefdom.id, fiefdom.resources);
        ensure_affordable(&ledger, &cost)?;

        Ok(MovePlan {
            ledger,
            building,
            x,
            y,
            cost,
        })
    }

    fn preview(&self, plan: &MovePlan) -> Map<String, Value> {
        object(json!({
            "fiefdom_id": plan.building.fiefdom_id,
            "building_id": plan.building.id,
            "building_type": plan.building.building_type,
            "from": {"x": plan.building.x, "y": plan.building.y},
            "to": {"x": plan.x, "y": plan.y},
            "cost": amounts_value(&plan.cost),
        }))
    }

    fn apply(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        plan: MovePlan,
    ) -> Result<Applied, ActionError> {
        let result = self.preview(&plan);
        let MovePlan {
            mut ledger,
            building,
            x,
            y,
            cost,
        } = plan;

        ledger.deduct(&cost).map_err(insufficient)?;
        let mut diffs = commit_ledger(conn, ledger)?;
        persistence::move_building(conn, building.id, x, y, env.now)?;
        diffs.push(DiffValue::building_field(building.id, "x", building.x, x));
        diffs.push(DiffValue::building_field(building.id, "y", building.y, y));

        Ok(Applied {
            message: format!("{} moved to ({x}, {y})", building.building_type),
            diffs,
            result,
        })
    }
}

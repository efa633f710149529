use contracts::{
    ActionContext, ActionKind, ActionPayload, DiffValue, ErrorCode, ResourceAmounts,
    HOME_BASE_TYPE,
};
use kernel_core::economy::next_level_cost;
use kernel_core::{check_placement, FiefdomLedger, PlacementRejection, PlacementRequest};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    amounts_value, commit_ledger, ensure_affordable, insufficient, object, owned_fiefdom, reject,
    required_coordinates, resolve_fiefdom_id, ActionEnv, ActionError, ActionHandler, Applied,
};
use crate::persistence;

pub(crate) struct CreateBuilding;

pub(crate) struct CreatePlan {
    ledger: FiefdomLedger,
    building_type: String,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    cost: ResourceAmounts,
}

impl ActionHandler for CreateBuilding {
    type Plan = CreatePlan;

    const KIND: ActionKind = ActionKind::Create;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<CreatePlan, ActionError> {
        let fiefdom_id = resolve_fiefdom_id(ctx, payload)?;
        let building_type = payload
            .building_type
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| reject(ErrorCode::BuildingTypeRequired, "building_type is required"))?;
        let (x, y) = required_coordinates(payload)?;
        let fiefdom = owned_fiefdom(conn, ctx, fiefdom_id)?;
        let config = env.config.building(building_type).map_err(|_| {
            reject(
                ErrorCode::UnknownBuilding,
                format!("unknown building type '{building_type}'"),
            )
        })?;

        let is_home_base = config.is_home_base();
        if is_home_base {
            if persistence::has_home_base(conn, fiefdom_id, false)? {
                return Err(reject(
                    ErrorCode::HomeBaseExists,
                    "this fiefdom already has a home base",
                ));
            }
        } else if !persistence::has_home_base(conn, fiefdom_id, true)? {
            return Err(reject(
                ErrorCode::HomeBaseRequired,
                "a completed home base is required before other buildings",
            ));
        }

        let existing = persistence::load_buildings(conn, env.config, fiefdom_id)?;
        let mut request = PlacementRequest::new(building_type, x, y);
        if is_home_base {
            request = request.enforcing_home_base_origin();
        }
        let placement = check_placement(env.config, &existing, &request);
        if let Some(rejection) = placement.rejection {
            let code = match rejection {
                PlacementRejection::HomeBaseOrigin => ErrorCode::HomeBaseWrongLocation,
                PlacementRejection::UnknownType => ErrorCode::UnknownBuilding,
                PlacementRejection::OutOfBounds | PlacementRejection::Overlap => {
                    ErrorCode::InvalidLocation
                }
            };
            return Err(reject(code, placement.message));
        }

        let cost = next_level_cost(&config.costs, 0);
        let ledger = FiefdomLedger::new(fiefdom_id, fiefdom.resources);
        ensure_affordable(&ledger, &cost)?;

        let (width, height) = config.dimensions();
        Ok(CreatePlan {
            ledger,
            building_type: building_type.to_string(),
            x,
            y,
            width,
            height,
            cost,
        })
    }

    fn preview(&self, plan: &CreatePlan) -> Map<String, Value> {
        object(json!({
            "fiefdom_id": plan.ledger.fiefdom_id(),
            "building_type": plan.building_type,
            "x": plan.x,
            "y": plan.y,
            "width": plan.width,
            "height": plan.height,
            "cost": amounts_value(&plan.cost),
        }))
    }

    fn apply(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        plan: CreatePlan,
    ) -> Result<Applied, ActionError> {
        let mut result = self.preview(&plan);
        let CreatePlan {
            mut ledger,
            building_type,
            x,
            y,
            cost,
            ..
        } = plan;
        let fiefdom_id = ledger.fiefdom_id();

        ledger.deduct(&cost).map_err(insufficient)?;
        let mut diffs = commit_ledger(conn, ledger)?;
        let building_id =
            persistence::insert_building(conn, fiefdom_id, &building_type, x, y, env.now)?;
        diffs.push(DiffValue::building_field(building_id, "level", Value::Null, 0));
        diffs.push(DiffValue::building_field(
            building_id,
            "construction_start_ts",
            Value::Null,
            env.now,
        ));
        debug!(fiefdom_id, building_id, %building_type, x, y, "building placed");

        result.insert("building_id".to_string(), Value::from(building_id));
        result.insert("level".to_string(), Value::from(0));
        result.insert("construction_start_ts".to_string(), Value::from(env.now));
        let message = if building_type == HOME_BASE_TYPE {
            "home base construction started".to_string()
        } else {
            format!("{building_type} construction started")
        };
        Ok(Applied {
            message,
            diffs,
            result,
        })
    }
}

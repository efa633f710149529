use contracts::{
    ActionContext, ActionKind, ActionPayload, BuildingSnapshot, DiffValue, ErrorCode,
    ResourceAmounts,
};
use kernel_core::economy::{demolish_refund, levels_paid, next_level_cost};
use kernel_core::placement::buildings_under_wall;
use kernel_core::FiefdomLedger;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::info;

use super::demolish::remove_with_refund;
use super::{
    amounts_value, commit_ledger, ensure_affordable, insufficient, object, owned_fiefdom, reject,
    resolve_fiefdom_id, ActionEnv, ActionError, ActionHandler, Applied,
};
use crate::persistence;

pub(crate) struct BuildWall;

pub(crate) struct WallPlan {
    ledger: FiefdomLedger,
    wall_count: i64,
    generation: u32,
    hp: i64,
    dimensions: (i64, i64, i64),
    cost: ResourceAmounts,
    swept: Vec<(BuildingSnapshot, ResourceAmounts)>,
}

impl ActionHandler for BuildWall {
    type Plan = WallPlan;

    const KIND: ActionKind = ActionKind::BuildWall;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<WallPlan, ActionError> {
        let fiefdom_id = resolve_fiefdom_id(ctx, payload)?;
        let generation = payload.wall_generation.ok_or_else(|| {
            reject(ErrorCode::WallGenerationRequired, "wall_generation is required")
        })?;
        let fiefdom = owned_fiefdom(conn, ctx, fiefdom_id)?;
        let config = env.config.wall_generation(generation).map_err(|_| {
            reject(
                ErrorCode::GenerationInvalid,
                format!("wall generation {generation} is not configured"),
            )
        })?;

        let max_walls = env.config.max_wall_count();
        if fiefdom.wall_count >= max_walls {
            return Err(reject(
                ErrorCode::MaxWallCountReached,
                format!("this fiefdom already has the maximum of {max_walls} walls"),
            ));
        }
        if generation > 1 && !persistence::wall_generation_exists(conn, fiefdom_id, generation - 1)? {
            return Err(reject(
                ErrorCode::GenerationSequenceRequired,
                format!(
                    "wall generation {} must be built before generation {generation}",
                    generation - 1
                ),
            ));
        }
        if persistence::wall_generation_exists(conn, fiefdom_id, generation)? {
            return Err(reject(
                ErrorCode::GenerationExists,
                format!("wall generation {generation} already exists"),
            ));
        }

        let cost = next_level_cost(&config.costs, 0);
        let ledger = FiefdomLedger::new(fiefdom_id, fiefdom.resources);
        ensure_affordable(&ledger, &cost)?;

        let buildings = persistence::load_buildings(conn, env.config, fiefdom_id)?;
        let swept = buildings_under_wall(env.config, config, &buildings)
            .into_iter()
            .map(|building| {
                let refund = env
                    .config
                    .building(&building.building_type)
                    .map(|building_type| {
                        let paid = levels_paid(building.level, building.construction_start_ts);
                        demolish_refund(&building_type.costs, paid)
                    })
                    .unwrap_or_default();
                (building.clone(), refund)
            })
            .collect();

        Ok(WallPlan {
            ledger,
            wall_count: fiefdom.wall_count,
            generation,
            hp: config.hp_at(1),
            dimensions: (config.width, config.length, config.thickness),
            cost,
            swept,
        })
    }

    fn preview(&self, plan: &WallPlan) -> Map<String, Value> {
        let (width, length, thickness) = plan.dimensions;
        let demolished = plan
            .swept
            .iter()
            .map(|(building, refund)| {
                json!({
                    "building_id": building.id,
                    "building_type": building.building_type,
                    "x": building.x,
                    "y": building.y,
                    "refund": amounts_value(refund),
                })
            })
            .collect::<Vec<_>>();
        object(json!({
            "fiefdom_id": plan.ledger.fiefdom_id(),
            "generation": plan.generation,
            "level": 1,
            "hp": plan.hp,
            "width": width,
            "length": length,
            "thickness": thickness,
            "cost": amounts_value(&plan.cost),
            "demolished_buildings": demolished,
        }))
    }

    fn apply(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        plan: WallPlan,
    ) -> Result<Applied, ActionError> {
        let mut result = self.preview(&plan);
        let WallPlan {
            mut ledger,
            wall_count,
            generation,
            hp,
            cost,
            swept,
            ..
        } = plan;
        let fiefdom_id = ledger.fiefdom_id();

        ledger.deduct(&cost).map_err(insufficient)?;
        let mut structural = Vec::new();
        for (building, refund) in &swept {
            structural.extend(remove_with_refund(conn, &mut ledger, building, refund)?);
        }
        let mut diffs = commit_ledger(conn, ledger)?;
        diffs.append(&mut structural);

        let wall_id = persistence::insert_wall(conn, fiefdom_id, generation, hp, env.now)?;
        persistence::set_wall_count(conn, fiefdom_id, wall_count + 1)?;
        diffs.push(DiffValue::wall_field(wall_id, "level", Value::Null, 1));
        diffs.push(DiffValue::wall_field(wall_id, "hp", Value::Null, hp));
        diffs.push(DiffValue::fiefdom_field(
            fiefdom_id,
            "wall_count",
            wall_count,
            wall_count + 1,
        ));
        if !swept.is_empty() {
            info!(
                fiefdom_id,
                generation,
                demolished = swept.len(),
                "new wall cleared buildings from its perimeter"
            );
        }

        result.insert("wall_id".to_string(), Value::from(wall_id));
        Ok(Applied {
            message: format!("wall generation {generation} built"),
            diffs,
            result,
        })
    }
}

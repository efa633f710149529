use contracts::{
    ActionContext, ActionKind, ActionPayload, BuildingSnapshot, DiffValue, ErrorCode,
    ResourceAmounts, HOME_BASE_TYPE,
};
use kernel_core::economy::{demolish_refund, levels_paid};
use kernel_core::FiefdomLedger;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    amounts_value, commit_ledger, object, owned_fiefdom, reject, required_building_id, ActionEnv,
    ActionError, ActionHandler, Applied,
};
use crate::persistence;

pub(crate) struct DemolishBuilding;

pub(crate) struct DemolishPlan {
    ledger: FiefdomLedger,
    building: BuildingSnapshot,
    refund: ResourceAmounts,
}

impl ActionHandler for DemolishBuilding {
    type Plan = DemolishPlan;

    const KIND: ActionKind = ActionKind::Demolish;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<DemolishPlan, ActionError> {
        let building_id = required_building_id(payload)?;
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
                "the home base cannot be demolished",
            ));
        }
        let config = env.config.building(&building.building_type).map_err(|err| {
            reject(ErrorCode::InvalidConfig, err.to_string())
        })?;

        let paid = levels_paid(building.level, building.construction_start_ts);
        let refund = demolish_refund(&config.costs, paid);
        Ok(DemolishPlan {
            ledger: FiefdomLedger::new(fiefdom.id, fiefdom.resources),
            building,
            refund,
        })
    }

    fn preview(&self, plan: &DemolishPlan) -> Map<String, Value> {
        object(json!({
            "fiefdom_id": plan.building.fiefdom_id,
            "building_id": plan.building.id,
            "building_type": plan.building.building_type,
            "level": plan.building.level,
            "refund": amounts_value(&plan.refund),
        }))
    }

    fn apply(
        &self,
        conn: &Connection,
        _env: &ActionEnv<'_>,
        plan: DemolishPlan,
    ) -> Result<Applied, ActionError> {
        let result = self.preview(&plan);
        let DemolishPlan {
            mut ledger,
            building,
            refund,
        } = plan;

        let mut diffs = remove_with_refund(conn, &mut ledger, &building, &refund)?;
        let mut ledger_diffs = commit_ledger(conn, ledger)?;
        ledger_diffs.append(&mut diffs);

        Ok(Applied {
            message: format!("{} demolished", building.building_type),
            diffs: ledger_diffs,
            result,
        })
    }
}

/// Deletes the building row and credits its refund to `ledger`. The caller
/// persists the ledger.
pub(super) fn remove_with_refund(
    conn: &Connection,
    ledger: &mut FiefdomLedger,
    building: &BuildingSnapshot,
    refund: &ResourceAmounts,
) -> Result<Vec<DiffValue>, ActionError> {
    persistence::delete_building(conn, building.id)?;
    ledger
        .credit(refund)
        .map_err(|err| reject(ErrorCode::InvalidConfig, err.to_string()))?;
    debug!(
        fiefdom_id = building.fiefdom_id,
        building_id = building.id,
        building_type = %building.building_type,
        "building removed"
    );
    Ok(vec![DiffValue::building_field(
        building.id,
        "level",
        building.level,
        Value::Null,
    )])
}

//! Player actions against a fiefdom.
//!
//! Each kind validates against the committed store and then applies its plan.
//! [`execute`] always validates again inside the write transaction it mutates,
//! so a plan never outlives the snapshot it was computed from.

mod create;
mod demolish;
mod relocate;
mod upgrade;
mod wall;

use contracts::{
    ActionContext, ActionKind, ActionPayload, ActionResult, DiffValue, ErrorCode, ResourceAmounts,
};
use kernel_core::{ConfigRegistry, EconomyError, FiefdomLedger};
use rusqlite::Connection;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::persistence::{self, FiefdomRow, PersistenceError, SqliteGameStore};

/// Inputs shared by every handler for one request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActionEnv<'a> {
    pub config: &'a ConfigRegistry,
    pub now: i64,
}

#[derive(Debug, Error)]
pub(crate) enum ActionError {
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },
    #[error(transparent)]
    Store(#[from] PersistenceError),
}

impl From<rusqlite::Error> for ActionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(PersistenceError::from(err))
    }
}

pub(crate) fn reject(code: ErrorCode, message: impl Into<String>) -> ActionError {
    ActionError::Rejected {
        code,
        message: message.into(),
    }
}

/// What a successful apply reports back.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub message: String,
    pub diffs: Vec<DiffValue>,
    pub result: Map<String, Value>,
}

pub(crate) trait ActionHandler {
    type Plan;

    const KIND: ActionKind;

    fn validate(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> Result<Self::Plan, ActionError>;

    /// Result fields reported by a dry-run validation.
    fn preview(&self, plan: &Self::Plan) -> Map<String, Value>;

    fn apply(
        &self,
        conn: &Connection,
        env: &ActionEnv<'_>,
        plan: Self::Plan,
    ) -> Result<Applied, ActionError>;
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub(crate) fn validate_only(
    conn: &Connection,
    env: &ActionEnv<'_>,
    kind: ActionKind,
    ctx: &ActionContext,
    payload: &ActionPayload,
) -> ActionResult {
    match kind {
        ActionKind::Create => dry_run(&create::CreateBuilding, conn, env, ctx, payload),
        ActionKind::Demolish => dry_run(&demolish::DemolishBuilding, conn, env, ctx, payload),
        ActionKind::Move => dry_run(&relocate::MoveBuilding, conn, env, ctx, payload),
        ActionKind::BuildWall => dry_run(&wall::BuildWall, conn, env, ctx, payload),
        ActionKind::Upgrade => dry_run(&upgrade::UpgradeStructure, conn, env, ctx, payload),
    }
}

pub(crate) fn execute(
    store: &mut SqliteGameStore,
    env: &ActionEnv<'_>,
    kind: ActionKind,
    ctx: &ActionContext,
    payload: &ActionPayload,
) -> ActionResult {
    match kind {
        ActionKind::Create => run(&create::CreateBuilding, store, env, ctx, payload),
        ActionKind::Demolish => run(&demolish::DemolishBuilding, store, env, ctx, payload),
        ActionKind::Move => run(&relocate::MoveBuilding, store, env, ctx, payload),
        ActionKind::BuildWall => run(&wall::BuildWall, store, env, ctx, payload),
        ActionKind::Upgrade => run(&upgrade::UpgradeStructure, store, env, ctx, payload),
    }
}

pub(crate) fn unknown_action(raw: &str, now: i64) -> ActionResult {
    warn!(action = raw, "rejected unknown action");
    ActionResult::fail(
        raw,
        ErrorCode::UnknownAction,
        format!("unknown action '{raw}'"),
        now,
    )
}

fn dry_run<H: ActionHandler>(
    handler: &H,
    conn: &Connection,
    env: &ActionEnv<'_>,
    ctx: &ActionContext,
    payload: &ActionPayload,
) -> ActionResult {
    let outcome = handler.validate(conn, env, ctx, payload).map(|plan| Applied {
        message: "validation passed".to_string(),
        diffs: Vec::new(),
        result: handler.preview(&plan),
    });
    finish(H::KIND, env.now, outcome)
}

fn run<H: ActionHandler>(
    handler: &H,
    store: &mut SqliteGameStore,
    env: &ActionEnv<'_>,
    ctx: &ActionContext,
    payload: &ActionPayload,
) -> ActionResult {
    let outcome = transact(handler, store, env, ctx, payload);
    finish(H::KIND, env.now, outcome)
}

/// Validate and apply inside one immediate transaction. Returning early drops
/// the transaction, which rolls back everything written so far.
fn transact<H: ActionHandler>(
    handler: &H,
    store: &mut SqliteGameStore,
    env: &ActionEnv<'_>,
    ctx: &ActionContext,
    payload: &ActionPayload,
) -> Result<Applied, ActionError> {
    let tx = store.begin_write()?;
    let plan = handler.validate(&tx, env, ctx, payload)?;
    let applied = handler.apply(&tx, env, plan)?;
    tx.commit()?;
    Ok(applied)
}

fn finish(kind: ActionKind, now: i64, outcome: Result<Applied, ActionError>) -> ActionResult {
    match outcome {
        Ok(applied) => {
            info!(action = %kind, diffs = applied.diffs.len(), "action succeeded");
            ActionResult::ok(kind.as_str(), applied.message, applied.diffs, applied.result, now)
        }
        Err(ActionError::Rejected { code, message }) => {
            info!(action = %kind, code = %code, %message, "action rejected");
            ActionResult::fail(kind.as_str(), code, message, now)
        }
        Err(ActionError::Store(err)) => {
            warn!(action = %kind, error = %err, "action rolled back");
            ActionResult::fail(kind.as_str(), ErrorCode::DatabaseError, err.to_string(), now)
        }
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

fn resolve_fiefdom_id(ctx: &ActionContext, payload: &ActionPayload) -> Result<i64, ActionError> {
    payload
        .fiefdom_id
        .or(ctx.requesting_fiefdom_id)
        .ok_or_else(|| reject(ErrorCode::FiefdomIdRequired, "fiefdom_id is required"))
}

fn required_building_id(payload: &ActionPayload) -> Result<i64, ActionError> {
    payload
        .building_id
        .ok_or_else(|| reject(ErrorCode::BuildingIdRequired, "building_id is required"))
}

fn required_coordinates(payload: &ActionPayload) -> Result<(i64, i64), ActionError> {
    match (payload.x, payload.y) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(reject(ErrorCode::CoordinatesRequired, "x and y are required")),
    }
}

/// A missing fiefdom and someone else's fiefdom are indistinguishable to the caller.
fn owned_fiefdom(
    conn: &Connection,
    ctx: &ActionContext,
    fiefdom_id: i64,
) -> Result<FiefdomRow, ActionError> {
    match persistence::load_fiefdom(conn, fiefdom_id)? {
        Some(row) if row.owner_id == ctx.requesting_character_id => Ok(row),
        _ => Err(reject(
            ErrorCode::NotOwner,
            format!("fiefdom {fiefdom_id} is not owned by the requesting character"),
        )),
    }
}

fn ensure_affordable(ledger: &FiefdomLedger, cost: &ResourceAmounts) -> Result<(), ActionError> {
    match ledger.shortfall(cost) {
        Some(err) => Err(insufficient(err)),
        None => Ok(()),
    }
}

fn insufficient(err: EconomyError) -> ActionError {
    reject(ErrorCode::InsufficientResources, err.to_string())
}

/// Persists the ledger's balances and hands back its resource diffs.
fn commit_ledger(conn: &Connection, ledger: FiefdomLedger) -> Result<Vec<DiffValue>, ActionError> {
    let fiefdom_id = ledger.fiefdom_id();
    let (balances, diffs) = ledger.into_parts();
    persistence::write_resources(conn, fiefdom_id, &balances)?;
    Ok(diffs)
}

fn amounts_value(amounts: &ResourceAmounts) -> Value {
    Value::Object(
        amounts
            .iter()
            .map(|(kind, amount)| (kind.as_str().to_string(), Value::from(*amount)))
            .collect(),
    )
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

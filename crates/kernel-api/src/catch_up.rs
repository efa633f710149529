//! Applies elapsed-time effects to stored fiefdoms.
//!
//! Plans are computed from committed snapshots, in parallel when a worker
//! pool is available. Each fiefdom is then written in its own immediate
//! transaction; if its rows changed after the snapshot was taken, the plan is
//! recomputed inside that transaction before anything is written.
//!
//! A batch request names a start time, but a fiefdom whose own clock is later
//! (because an action or an earlier catch-up already advanced it) only owes
//! the time since that clock.

use contracts::TimeUpdateResult;
use kernel_core::production::{apply_deltas, hours_between};
use kernel_core::{plan_catch_up, CatchUpPlan, ConfigRegistry, FiefdomState};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::persistence::{self, PersistenceError, SqliteGameStore};

pub(crate) struct CatchUpRequest {
    pub last_update_time: i64,
    pub fiefdom_filter: Option<i64>,
    pub now: i64,
    pub min_hours: f64,
}

pub(crate) fn advance_state(
    store: &mut SqliteGameStore,
    config: &ConfigRegistry,
    pool: Option<&ThreadPool>,
    request: &CatchUpRequest,
) -> Result<TimeUpdateResult, PersistenceError> {
    let hours = hours_between(request.last_update_time, request.now);
    if hours < request.min_hours {
        return Ok(TimeUpdateResult::unchanged(request.last_update_time, hours));
    }

    let fiefdom_ids = match request.fiefdom_filter {
        Some(fiefdom_id) => vec![fiefdom_id],
        None => persistence::list_fiefdom_ids(store.connection())?,
    };
    let mut states = Vec::with_capacity(fiefdom_ids.len());
    for fiefdom_id in fiefdom_ids {
        let Some(state) = persistence::load_state(store.connection(), config, fiefdom_id)? else {
            continue;
        };
        let window = window_hours(request, &state);
        if window < request.min_hours {
            debug!(fiefdom_id, window, "fiefdom already caught up");
            continue;
        }
        states.push(state);
    }

    let plans = plan_all(config, pool, &states, request);

    let mut result = TimeUpdateResult::unchanged(request.now, hours);
    for (state, plan) in states.iter().zip(plans) {
        match apply_fiefdom(store, config, state, plan, request) {
            Ok(Some(plan)) => {
                result.fiefdoms_updated += 1;
                result.productions_applied.extend(plan.productions);
                result.completions.extend(plan.completions);
                result.morale_changes.extend(plan.morale);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    fiefdom_id = state.fiefdom_id,
                    error = %err,
                    "catch-up rolled back for fiefdom"
                );
                result.failed_fiefdoms.push(state.fiefdom_id);
            }
        }
    }

    info!(
        hours_elapsed = hours,
        fiefdoms_updated = result.fiefdoms_updated,
        productions = result.productions_applied.len(),
        completions = result.completions.len(),
        failed = result.failed_fiefdoms.len(),
        "catch-up finished"
    );
    Ok(result)
}

/// Brings one fiefdom up to `now` from its own stored `last_update_time`.
/// A fiefdom that has never been stamped is stamped without producing.
pub(crate) fn catch_up_fiefdom(
    store: &mut SqliteGameStore,
    config: &ConfigRegistry,
    fiefdom_id: i64,
    now: i64,
    min_hours: f64,
) -> Result<Option<TimeUpdateResult>, PersistenceError> {
    let Some(row) = persistence::load_fiefdom(store.connection(), fiefdom_id)? else {
        return Ok(None);
    };
    if row.last_update_time == 0 {
        let tx = store.begin_write()?;
        persistence::set_last_update_time(&tx, fiefdom_id, now)?;
        tx.commit()?;
        debug!(fiefdom_id, now, "stamped fiefdom clock");
        return Ok(Some(TimeUpdateResult::unchanged(now, 0.0)));
    }

    let request = CatchUpRequest {
        last_update_time: row.last_update_time,
        fiefdom_filter: Some(fiefdom_id),
        now,
        min_hours,
    };
    advance_state(store, config, None, &request).map(Some)
}

/// Hours a fiefdom still owes: from the later of the requested start and its
/// own stored clock, up to `now`.
fn window_hours(request: &CatchUpRequest, state: &FiefdomState) -> f64 {
    let start = request.last_update_time.max(state.last_update_time);
    hours_between(start, request.now)
}

fn plan_all(
    config: &ConfigRegistry,
    pool: Option<&ThreadPool>,
    states: &[FiefdomState],
    request: &CatchUpRequest,
) -> Vec<CatchUpPlan> {
    let plan_one = |state: &FiefdomState| {
        plan_catch_up(config, state, request.now, window_hours(request, state))
    };
    match pool {
        Some(pool) if states.len() > 1 => pool.install(|| states.par_iter().map(plan_one).collect()),
        _ => states.iter().map(plan_one).collect(),
    }
}

fn apply_fiefdom(
    store: &mut SqliteGameStore,
    config: &ConfigRegistry,
    snapshot: &FiefdomState,
    plan: CatchUpPlan,
    request: &CatchUpRequest,
) -> Result<Option<CatchUpPlan>, PersistenceError> {
    let tx = store.begin_write()?;
    let Some(current) = persistence::load_state(&tx, config, snapshot.fiefdom_id)? else {
        return Ok(None);
    };
    let plan = if current == *snapshot {
        plan
    } else {
        let hours = window_hours(request, &current);
        if hours < request.min_hours {
            debug!(fiefdom_id = current.fiefdom_id, "fiefdom caught up concurrently");
            return Ok(None);
        }
        debug!(fiefdom_id = snapshot.fiefdom_id, "fiefdom changed since snapshot; replanning");
        plan_catch_up(config, &current, request.now, hours)
    };

    for completion in &plan.building_completions {
        persistence::set_building_construction(
            &tx,
            completion.building_id,
            completion.new_level,
            0,
            plan.now,
        )?;
    }
    for completion in &plan.wall_completions {
        persistence::update_wall(
            &tx,
            completion.wall_id,
            completion.new_level,
            completion.hp,
            0,
            plan.now,
        )?;
    }
    if !plan.resource_deltas.is_empty() {
        let resources = apply_deltas(&current.resources, &plan.resource_deltas);
        persistence::write_resources(&tx, current.fiefdom_id, &resources)?;
    }
    if let Some(change) = &plan.morale {
        persistence::set_morale(&tx, current.fiefdom_id, change.to)?;
    }
    persistence::set_last_update_time(&tx, current.fiefdom_id, plan.now)?;
    tx.commit()?;

    Ok(Some(plan))
}

//! In-process fiefdom engine: player actions, lazy time catch-up, read models
//! and seeding over a SQLite store.

mod actions;
mod catch_up;
mod clock;
mod persistence;

use std::path::Path;
use std::sync::Arc;

use contracts::{
    ActionContext, ActionKind, ActionPayload, ActionResult, CombatantSnapshot, ErrorCode,
    FiefdomSnapshot, HeroSkillSnapshot, HeroSnapshot, OfficialSnapshot, OfficialStats,
    OfficialRole, ResourceAmounts, TimeUpdateResult, SCHEMA_VERSION_V1,
};
use kernel_core::production::MIN_CATCH_UP_HOURS;
use kernel_core::{aggregate_morale, ConfigError, ConfigRegistry};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{info, warn};

use actions::ActionEnv;
use catch_up::CatchUpRequest;
pub use clock::{Clock, ManualClock, SystemClock};
pub use persistence::{FiefdomRow, NewFiefdom, PersistenceError, SqliteGameStore};
use persistence::{PersonnelRow, PersonnelTable};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fiefdom {0} not found")]
    FiefdomNotFound(i64),
    #[error("unknown official role '{0}'")]
    UnknownRole(String),
    #[error("official template '{template_id}' cannot serve as {role}")]
    IneligibleOfficial { template_id: String, role: String },
    #[error("level must be at least 1")]
    InvalidLevel,
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(PersistenceError::from(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Worker threads used to plan batch catch-up; 0 or 1 plans sequentially.
    pub catch_up_worker_threads: usize,
    /// Catch-up windows shorter than this many hours are skipped.
    pub min_catch_up_hours: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            catch_up_worker_threads: 4,
            min_catch_up_hours: MIN_CATCH_UP_HOURS,
        }
    }
}

#[derive(Debug)]
pub struct FiefdomEngine {
    store: SqliteGameStore,
    config: Arc<ConfigRegistry>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    pool: Option<rayon::ThreadPool>,
}

impl FiefdomEngine {
    pub fn open(
        path: impl AsRef<Path>,
        config: Arc<ConfigRegistry>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let store = SqliteGameStore::open(path)?;
        Ok(Self::from_parts(store, config, Arc::new(SystemClock), settings))
    }

    pub fn in_memory(config: Arc<ConfigRegistry>, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let store = SqliteGameStore::open_in_memory()?;
        Ok(Self::from_parts(store, config, clock, EngineSettings::default()))
    }

    pub fn from_parts(
        store: SqliteGameStore,
        config: Arc<ConfigRegistry>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let pool = if settings.catch_up_worker_threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(settings.catch_up_worker_threads)
                .build()
                .ok()
        } else {
            None
        };
        Self {
            store,
            config,
            clock,
            settings,
            pool,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn connection(&self) -> &Connection {
        self.store.connection()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Runs the action named `kind` (`build`/`create`, `demolish`, `move`,
    /// `build_wall`, `upgrade`).
    pub fn submit_action(
        &mut self,
        kind: &str,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> ActionResult {
        match ActionKind::parse(kind) {
            Some(kind) => self.submit(kind, ctx, payload),
            None => actions::unknown_action(kind, self.clock.now()),
        }
    }

    /// Catches the target fiefdom up, then validates and applies the action in
    /// one transaction. Failures leave the store untouched.
    pub fn submit(
        &mut self,
        kind: ActionKind,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> ActionResult {
        let now = self.clock.now();
        if let Err(err) = self.catch_up_target(ctx, payload, now) {
            warn!(action = %kind, error = %err, "catch-up before action failed");
            return ActionResult::fail(kind.as_str(), ErrorCode::DatabaseError, err.to_string(), now);
        }
        let env = ActionEnv {
            config: &self.config,
            now,
        };
        actions::execute(&mut self.store, &env, kind, ctx, payload)
    }

    /// Runs validation only, outside any transaction.
    pub fn validate_action(
        &self,
        kind: &str,
        ctx: &ActionContext,
        payload: &ActionPayload,
    ) -> ActionResult {
        let now = self.clock.now();
        let Some(kind) = ActionKind::parse(kind) else {
            return actions::unknown_action(kind, now);
        };
        let env = ActionEnv {
            config: &self.config,
            now,
        };
        actions::validate_only(self.store.connection(), &env, kind, ctx, payload)
    }

    fn catch_up_target(
        &mut self,
        ctx: &ActionContext,
        payload: &ActionPayload,
        now: i64,
    ) -> Result<(), PersistenceError> {
        let conn = self.store.connection();
        let fiefdom_id = match payload.fiefdom_id.or(ctx.requesting_fiefdom_id) {
            Some(fiefdom_id) => Some(fiefdom_id),
            None => match (payload.building_id, payload.wall_id) {
                (Some(building_id), _) => persistence::load_building(conn, &self.config, building_id)?
                    .map(|building| building.fiefdom_id),
                (None, Some(wall_id)) => persistence::load_wall(conn, &self.config, wall_id)?
                    .map(|wall| wall.fiefdom_id),
                (None, None) => None,
            },
        };
        if let Some(fiefdom_id) = fiefdom_id {
            catch_up::catch_up_fiefdom(
                &mut self.store,
                &self.config,
                fiefdom_id,
                now,
                self.settings.min_catch_up_hours,
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Time catch-up
    // -----------------------------------------------------------------------

    /// Applies the time elapsed since `last_update_time` to every fiefdom, or
    /// only to `fiefdom_filter`.
    pub fn advance_state(
        &mut self,
        last_update_time: i64,
        fiefdom_filter: Option<i64>,
    ) -> Result<TimeUpdateResult, EngineError> {
        let request = CatchUpRequest {
            last_update_time,
            fiefdom_filter,
            now: self.clock.now(),
            min_hours: self.settings.min_catch_up_hours,
        };
        Ok(catch_up::advance_state(
            &mut self.store,
            &self.config,
            self.pool.as_ref(),
            &request,
        )?)
    }

    /// Applies the time elapsed since the fiefdom's own last update.
    pub fn catch_up_fiefdom(&mut self, fiefdom_id: i64) -> Result<TimeUpdateResult, EngineError> {
        catch_up::catch_up_fiefdom(
            &mut self.store,
            &self.config,
            fiefdom_id,
            self.clock.now(),
            self.settings.min_catch_up_hours,
        )?
        .ok_or(EngineError::FiefdomNotFound(fiefdom_id))
    }

    // -----------------------------------------------------------------------
    // Read models
    // -----------------------------------------------------------------------

    /// Catches the fiefdom up and returns its committed state.
    pub fn get_fiefdom(&mut self, fiefdom_id: i64) -> Result<FiefdomSnapshot, EngineError> {
        self.catch_up_fiefdom(fiefdom_id)?;
        self.snapshot(fiefdom_id)
    }

    /// Committed state without catching up first.
    pub fn snapshot(&self, fiefdom_id: i64) -> Result<FiefdomSnapshot, EngineError> {
        let conn = self.store.connection();
        let config = self.config.as_ref();
        let row = persistence::load_fiefdom(conn, fiefdom_id)?
            .ok_or(EngineError::FiefdomNotFound(fiefdom_id))?;
        let buildings = persistence::load_buildings(conn, config, fiefdom_id)?;
        let walls = persistence::load_walls(conn, config, fiefdom_id)?;
        let roster = persistence::load_roster(conn, fiefdom_id)?;
        let live_morale = aggregate_morale(config, &buildings, &walls, &roster);

        let officials = persistence::load_officials(conn, fiefdom_id)?
            .into_iter()
            .map(|official| {
                let stats = config
                    .official(&official.template_id)
                    .map(|template| template.stats_at(official.level))
                    .unwrap_or_else(|_| OfficialStats::default());
                OfficialSnapshot {
                    id: official.id,
                    fiefdom_id: official.fiefdom_id,
                    role: official.role,
                    template_id: official.template_id,
                    portrait_id: official.portrait_id,
                    name: official.name,
                    level: official.level,
                    stats,
                }
            })
            .collect();
        let heroes = persistence::load_personnel(conn, PersonnelTable::Heroes, fiefdom_id)?
            .into_iter()
            .map(|row| self.hero_snapshot(row))
            .collect();
        let combatants = persistence::load_personnel(conn, PersonnelTable::Combatants, fiefdom_id)?
            .into_iter()
            .map(|row| self.combatant_snapshot(row))
            .collect();

        Ok(FiefdomSnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            x: row.x,
            y: row.y,
            resources: row.resources,
            wall_count: row.wall_count,
            morale: row.morale,
            live_morale,
            last_update_time: row.last_update_time,
            buildings,
            walls,
            officials,
            heroes,
            combatants,
        })
    }

    pub fn list_fiefdoms_for_owner(&self, owner_id: i64) -> Result<Vec<FiefdomRow>, EngineError> {
        Ok(persistence::list_fiefdoms_for_owner(
            self.store.connection(),
            owner_id,
        )?)
    }

    fn hero_snapshot(&self, row: PersonnelRow) -> HeroSnapshot {
        let template = self.config.hero(&row.template_id).ok();
        let skills = template
            .map(|template| {
                template
                    .skills
                    .iter()
                    .map(|(skill_id, skill)| HeroSkillSnapshot {
                        skill_id: skill_id.clone(),
                        name: skill.name.clone(),
                        damage: skill.damage_at(row.level),
                        defense: skill.defense_at(row.level),
                        healing: skill.healing_at(row.level),
                    })
                    .collect()
            })
            .unwrap_or_default();
        HeroSnapshot {
            id: row.id,
            fiefdom_id: row.fiefdom_id,
            name: template.map_or_else(|| row.template_id.clone(), |template| template.name.clone()),
            equipment_slots: template
                .map(|template| template.equipment_slots_at(row.level))
                .unwrap_or_default(),
            skills,
            template_id: row.template_id,
            level: row.level,
        }
    }

    fn combatant_snapshot(&self, row: PersonnelRow) -> CombatantSnapshot {
        let template = self.config.combatant(&row.template_id).ok();
        CombatantSnapshot {
            id: row.id,
            fiefdom_id: row.fiefdom_id,
            name: template.map_or_else(|| row.template_id.clone(), |template| template.name.clone()),
            damage: template
                .map(|template| template.damage_at(row.level))
                .unwrap_or_default(),
            defense: template.and_then(|template| template.defense_at(row.level)),
            movement_speed: template
                .map(|template| template.movement_speed_at(row.level))
                .unwrap_or_default(),
            template_id: row.template_id,
            level: row.level,
        }
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub fn found_fiefdom(
        &mut self,
        owner_id: i64,
        name: &str,
        x: i64,
        y: i64,
        resources: ResourceAmounts,
    ) -> Result<i64, EngineError> {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let fiefdom_id = persistence::insert_fiefdom(
            &tx,
            &NewFiefdom {
                owner_id,
                name: name.to_string(),
                x,
                y,
                resources,
            },
            now,
        )?;
        tx.commit()?;
        info!(fiefdom_id, owner_id, name, "fiefdom founded");
        Ok(fiefdom_id)
    }

    pub fn appoint_official(
        &mut self,
        fiefdom_id: i64,
        role: &str,
        template_id: &str,
        name: &str,
        level: u32,
    ) -> Result<i64, EngineError> {
        let role = OfficialRole::parse(role).ok_or_else(|| EngineError::UnknownRole(role.to_string()))?;
        let template = self.config.official(template_id)?;
        if !template.eligible_for(role) {
            return Err(EngineError::IneligibleOfficial {
                template_id: template_id.to_string(),
                role: role.as_str().to_string(),
            });
        }
        let portrait_id = template.portrait_id;
        self.seed(fiefdom_id, level, |conn| {
            persistence::insert_official(conn, fiefdom_id, role, template_id, portrait_id, name, level)
        })
    }

    pub fn recruit_hero(&mut self, fiefdom_id: i64, template_id: &str, level: u32) -> Result<i64, EngineError> {
        self.config.hero(template_id)?;
        self.seed(fiefdom_id, level, |conn| {
            persistence::insert_personnel(conn, PersonnelTable::Heroes, fiefdom_id, template_id, level)
        })
    }

    pub fn station_combatant(
        &mut self,
        fiefdom_id: i64,
        template_id: &str,
        level: u32,
    ) -> Result<i64, EngineError> {
        self.config.combatant(template_id)?;
        self.seed(fiefdom_id, level, |conn| {
            persistence::insert_personnel(
                conn,
                PersonnelTable::Combatants,
                fiefdom_id,
                template_id,
                level,
            )
        })
    }

    fn seed(
        &mut self,
        fiefdom_id: i64,
        level: u32,
        insert: impl FnOnce(&Connection) -> Result<i64, PersistenceError>,
    ) -> Result<i64, EngineError> {
        if level == 0 {
            return Err(EngineError::InvalidLevel);
        }
        let tx = self.store.begin_write()?;
        if persistence::load_fiefdom(&tx, fiefdom_id)?.is_none() {
            return Err(EngineError::FiefdomNotFound(fiefdom_id));
        }
        let id = insert(&tx)?;
        tx.commit()?;
        Ok(id)
    }
}

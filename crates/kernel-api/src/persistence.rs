use std::path::Path;
use std::time::Duration;

use contracts::{
    BuildingSnapshot, OfficialRole, ResourceAmounts, ResourceKind, WallSnapshot, HOME_BASE_TYPE,
};
use kernel_core::{ConfigRegistry, FiefdomState, PersonnelEntry, Roster};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

/// A fiefdom row without its structures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiefdomRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub resources: ResourceAmounts,
    pub wall_count: i64,
    pub morale: f64,
    pub last_update_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFiefdom {
    pub owner_id: i64,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub resources: ResourceAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficialRow {
    pub id: i64,
    pub fiefdom_id: i64,
    pub role: OfficialRole,
    pub template_id: String,
    pub portrait_id: i64,
    pub name: String,
    pub level: u32,
}

/// A hero or stationed combatant: a template key and a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonnelRow {
    pub id: i64,
    pub fiefdom_id: i64,
    pub template_id: String,
    pub level: u32,
}

#[derive(Debug)]
pub struct SqliteGameStore {
    conn: Connection,
}

impl SqliteGameStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Opens a write transaction that takes the database write lock up front,
    /// so validation inside it sees the state it will mutate. Dropping the
    /// transaction without committing rolls it back.
    pub fn begin_write(&mut self) -> Result<Transaction<'_>, PersistenceError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fiefdoms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                peasants INTEGER NOT NULL DEFAULT 0,
                gold INTEGER NOT NULL DEFAULT 0,
                grain INTEGER NOT NULL DEFAULT 0,
                wood INTEGER NOT NULL DEFAULT 0,
                steel INTEGER NOT NULL DEFAULT 0,
                bronze INTEGER NOT NULL DEFAULT 0,
                stone INTEGER NOT NULL DEFAULT 0,
                leather INTEGER NOT NULL DEFAULT 0,
                mana INTEGER NOT NULL DEFAULT 0,
                wall_count INTEGER NOT NULL DEFAULT 0,
                morale REAL NOT NULL DEFAULT 0,
                last_update_time INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS fiefdom_buildings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fiefdom_id INTEGER NOT NULL REFERENCES fiefdoms(id),
                name TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 0,
                x INTEGER NOT NULL DEFAULT 0,
                y INTEGER NOT NULL DEFAULT 0,
                construction_start_ts INTEGER NOT NULL DEFAULT 0,
                last_updated INTEGER NOT NULL DEFAULT 0,
                action_start_ts INTEGER NOT NULL DEFAULT 0,
                action_tag TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS fiefdom_walls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fiefdom_id INTEGER NOT NULL REFERENCES fiefdoms(id),
                generation INTEGER NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                hp INTEGER NOT NULL DEFAULT 0,
                construction_start_ts INTEGER NOT NULL DEFAULT 0,
                last_updated INTEGER NOT NULL DEFAULT 0,
                UNIQUE (fiefdom_id, generation)
            );

            CREATE TABLE IF NOT EXISTS officials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fiefdom_id INTEGER NOT NULL REFERENCES fiefdoms(id),
                role TEXT NOT NULL,
                template_id TEXT NOT NULL,
                portrait_id INTEGER NOT NULL DEFAULT 0,
                name TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS fiefdom_heroes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fiefdom_id INTEGER NOT NULL REFERENCES fiefdoms(id),
                hero_config_id TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS stationed_combatants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fiefdom_id INTEGER NOT NULL REFERENCES fiefdoms(id),
                combatant_config_id TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_fiefdoms_owner ON fiefdoms(owner_id);
            CREATE INDEX IF NOT EXISTS idx_fiefdom_buildings_fiefdom ON fiefdom_buildings(fiefdom_id);
            CREATE INDEX IF NOT EXISTS idx_fiefdom_buildings_fiefdom_xy ON fiefdom_buildings(fiefdom_id, x, y);
            CREATE INDEX IF NOT EXISTS idx_fiefdom_walls_fiefdom ON fiefdom_walls(fiefdom_id);
            CREATE INDEX IF NOT EXISTS idx_officials_fiefdom ON officials(fiefdom_id);
            CREATE INDEX IF NOT EXISTS idx_fiefdom_heroes_fiefdom ON fiefdom_heroes(fiefdom_id);
            CREATE INDEX IF NOT EXISTS idx_stationed_combatants_fiefdom ON stationed_combatants(fiefdom_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', datetime('now'))",
            [],
        )?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fiefdoms
// ---------------------------------------------------------------------------

const FIEFDOM_COLUMNS: &str = "id, owner_id, name, x, y, peasants, gold, grain, wood, steel, \
     bronze, stone, leather, mana, wall_count, morale, last_update_time";

fn fiefdom_from_row(row: &Row<'_>) -> rusqlite::Result<FiefdomRow> {
    let mut resources = ResourceAmounts::new();
    for (offset, kind) in ResourceKind::ALL.into_iter().enumerate() {
        resources.insert(kind, row.get::<_, i64>(5 + offset)?);
    }
    Ok(FiefdomRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        x: row.get(3)?,
        y: row.get(4)?,
        resources,
        wall_count: row.get(14)?,
        morale: row.get(15)?,
        last_update_time: row.get(16)?,
    })
}

pub fn insert_fiefdom(
    conn: &Connection,
    fiefdom: &NewFiefdom,
    now: i64,
) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO fiefdoms (owner_id, name, x, y, last_update_time) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![fiefdom.owner_id, fiefdom.name, fiefdom.x, fiefdom.y, now],
    )?;
    let id = conn.last_insert_rowid();
    write_resources(conn, id, &fiefdom.resources)?;
    Ok(id)
}

pub fn load_fiefdom(conn: &Connection, fiefdom_id: i64) -> Result<Option<FiefdomRow>, PersistenceError> {
    let sql = format!("SELECT {FIEFDOM_COLUMNS} FROM fiefdoms WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![fiefdom_id], fiefdom_from_row)
        .optional()?)
}

pub fn list_fiefdom_ids(conn: &Connection) -> Result<Vec<i64>, PersistenceError> {
    let mut stmt = conn.prepare("SELECT id FROM fiefdoms ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_fiefdoms_for_owner(
    conn: &Connection,
    owner_id: i64,
) -> Result<Vec<FiefdomRow>, PersistenceError> {
    let sql = format!("SELECT {FIEFDOM_COLUMNS} FROM fiefdoms WHERE owner_id = ?1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner_id], fiefdom_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Writes every counter present in `resources`; absent kinds are left alone.
pub fn write_resources(
    conn: &Connection,
    fiefdom_id: i64,
    resources: &ResourceAmounts,
) -> Result<(), PersistenceError> {
    for (kind, amount) in resources {
        // Column names come from the closed ResourceKind set.
        let sql = format!("UPDATE fiefdoms SET {} = ?1 WHERE id = ?2", kind.as_str());
        conn.execute(&sql, params![amount, fiefdom_id])?;
    }
    Ok(())
}

pub fn set_wall_count(conn: &Connection, fiefdom_id: i64, wall_count: i64) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE fiefdoms SET wall_count = ?1 WHERE id = ?2",
        params![wall_count, fiefdom_id],
    )?;
    Ok(())
}

pub fn set_morale(conn: &Connection, fiefdom_id: i64, morale: f64) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE fiefdoms SET morale = ?1 WHERE id = ?2",
        params![morale, fiefdom_id],
    )?;
    Ok(())
}

pub fn set_last_update_time(
    conn: &Connection,
    fiefdom_id: i64,
    timestamp: i64,
) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE fiefdoms SET last_update_time = ?1 WHERE id = ?2",
        params![timestamp, fiefdom_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

const BUILDING_COLUMNS: &str =
    "id, fiefdom_id, name, level, x, y, construction_start_ts, action_start_ts, action_tag";

fn building_from_row(config: &ConfigRegistry, row: &Row<'_>) -> rusqlite::Result<BuildingSnapshot> {
    let building_type: String = row.get(2)?;
    let (width, height) = config.building_dimensions(&building_type);
    let action_tag: String = row.get(8)?;
    Ok(BuildingSnapshot {
        id: row.get(0)?,
        fiefdom_id: row.get(1)?,
        building_type,
        level: row.get(3)?,
        x: row.get(4)?,
        y: row.get(5)?,
        width,
        height,
        construction_start_ts: row.get(6)?,
        action_start_ts: row.get(7)?,
        action_tag: (!action_tag.is_empty()).then_some(action_tag),
    })
}

pub fn load_buildings(
    conn: &Connection,
    config: &ConfigRegistry,
    fiefdom_id: i64,
) -> Result<Vec<BuildingSnapshot>, PersistenceError> {
    let sql = format!(
        "SELECT {BUILDING_COLUMNS} FROM fiefdom_buildings WHERE fiefdom_id = ?1 ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fiefdom_id], |row| building_from_row(config, row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_building(
    conn: &Connection,
    config: &ConfigRegistry,
    building_id: i64,
) -> Result<Option<BuildingSnapshot>, PersistenceError> {
    let sql = format!("SELECT {BUILDING_COLUMNS} FROM fiefdom_buildings WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![building_id], |row| building_from_row(config, row))
        .optional()?)
}

/// Whether the fiefdom has a home base, optionally only a completed one.
pub fn has_home_base(
    conn: &Connection,
    fiefdom_id: i64,
    completed_only: bool,
) -> Result<bool, PersistenceError> {
    let min_level = if completed_only { 1 } else { 0 };
    let found = conn
        .query_row(
            "SELECT 1 FROM fiefdom_buildings
             WHERE fiefdom_id = ?1 AND name = ?2 AND level >= ?3
             LIMIT 1",
            params![fiefdom_id, HOME_BASE_TYPE, min_level],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_building(
    conn: &Connection,
    fiefdom_id: i64,
    building_type: &str,
    x: i64,
    y: i64,
    now: i64,
) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO fiefdom_buildings (fiefdom_id, name, level, x, y, construction_start_ts, last_updated)
         VALUES (?1, ?2, 0, ?3, ?4, ?5, ?5)",
        params![fiefdom_id, building_type, x, y, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_building(conn: &Connection, building_id: i64) -> Result<(), PersistenceError> {
    let deleted = conn.execute("DELETE FROM fiefdom_buildings WHERE id = ?1", params![building_id])?;
    expect_one_row(deleted, "building", building_id)
}

pub fn move_building(
    conn: &Connection,
    building_id: i64,
    x: i64,
    y: i64,
    now: i64,
) -> Result<(), PersistenceError> {
    let updated = conn.execute(
        "UPDATE fiefdom_buildings SET x = ?1, y = ?2, last_updated = ?3 WHERE id = ?4",
        params![x, y, now, building_id],
    )?;
    expect_one_row(updated, "building", building_id)
}

pub fn set_building_construction(
    conn: &Connection,
    building_id: i64,
    level: u32,
    construction_start_ts: i64,
    now: i64,
) -> Result<(), PersistenceError> {
    let updated = conn.execute(
        "UPDATE fiefdom_buildings
         SET level = ?1, construction_start_ts = ?2, last_updated = ?3
         WHERE id = ?4",
        params![level, construction_start_ts, now, building_id],
    )?;
    expect_one_row(updated, "building", building_id)
}

// ---------------------------------------------------------------------------
// Walls
// ---------------------------------------------------------------------------

const WALL_COLUMNS: &str = "id, fiefdom_id, generation, level, hp, construction_start_ts";

fn wall_from_row(config: &ConfigRegistry, row: &Row<'_>) -> rusqlite::Result<WallSnapshot> {
    let generation: u32 = row.get(2)?;
    let (width, length, thickness) = config
        .wall_generation(generation)
        .map(|wall| (wall.width, wall.length, wall.thickness))
        .unwrap_or((0, 0, 0));
    Ok(WallSnapshot {
        id: row.get(0)?,
        fiefdom_id: row.get(1)?,
        generation,
        level: row.get(3)?,
        hp: row.get(4)?,
        width,
        length,
        thickness,
        construction_start_ts: row.get(5)?,
    })
}

pub fn load_walls(
    conn: &Connection,
    config: &ConfigRegistry,
    fiefdom_id: i64,
) -> Result<Vec<WallSnapshot>, PersistenceError> {
    let sql =
        format!("SELECT {WALL_COLUMNS} FROM fiefdom_walls WHERE fiefdom_id = ?1 ORDER BY generation ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fiefdom_id], |row| wall_from_row(config, row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_wall(
    conn: &Connection,
    config: &ConfigRegistry,
    wall_id: i64,
) -> Result<Option<WallSnapshot>, PersistenceError> {
    let sql = format!("SELECT {WALL_COLUMNS} FROM fiefdom_walls WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![wall_id], |row| wall_from_row(config, row))
        .optional()?)
}

pub fn wall_generation_exists(
    conn: &Connection,
    fiefdom_id: i64,
    generation: u32,
) -> Result<bool, PersistenceError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM fiefdom_walls WHERE fiefdom_id = ?1 AND generation = ?2",
            params![fiefdom_id, generation],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_wall(
    conn: &Connection,
    fiefdom_id: i64,
    generation: u32,
    hp: i64,
    now: i64,
) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO fiefdom_walls (fiefdom_id, generation, level, hp, construction_start_ts, last_updated)
         VALUES (?1, ?2, 1, ?3, 0, ?4)",
        params![fiefdom_id, generation, hp, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_wall(
    conn: &Connection,
    wall_id: i64,
    level: u32,
    hp: i64,
    construction_start_ts: i64,
    now: i64,
) -> Result<(), PersistenceError> {
    let updated = conn.execute(
        "UPDATE fiefdom_walls
         SET level = ?1, hp = ?2, construction_start_ts = ?3, last_updated = ?4
         WHERE id = ?5",
        params![level, hp, construction_start_ts, now, wall_id],
    )?;
    expect_one_row(updated, "wall", wall_id)
}

// ---------------------------------------------------------------------------
// Personnel
// ---------------------------------------------------------------------------

pub fn insert_official(
    conn: &Connection,
    fiefdom_id: i64,
    role: OfficialRole,
    template_id: &str,
    portrait_id: i64,
    name: &str,
    level: u32,
) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO officials (fiefdom_id, role, template_id, portrait_id, name, level)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![fiefdom_id, role.as_str(), template_id, portrait_id, name, level],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn load_officials(conn: &Connection, fiefdom_id: i64) -> Result<Vec<OfficialRow>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT id, fiefdom_id, role, template_id, portrait_id, name, level
         FROM officials WHERE fiefdom_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![fiefdom_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, u32>(6)?,
        ))
    })?;

    let mut officials = Vec::new();
    for row in rows {
        let (id, fiefdom_id, role, template_id, portrait_id, name, level) = row?;
        let role = OfficialRole::parse(&role)
            .ok_or_else(|| PersistenceError::Corrupt(format!("official {id} has role '{role}'")))?;
        officials.push(OfficialRow {
            id,
            fiefdom_id,
            role,
            template_id,
            portrait_id,
            name,
            level,
        });
    }
    Ok(officials)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonnelTable {
    Heroes,
    Combatants,
}

impl PersonnelTable {
    fn table_and_column(self) -> (&'static str, &'static str) {
        match self {
            Self::Heroes => ("fiefdom_heroes", "hero_config_id"),
            Self::Combatants => ("stationed_combatants", "combatant_config_id"),
        }
    }
}

pub fn insert_personnel(
    conn: &Connection,
    table: PersonnelTable,
    fiefdom_id: i64,
    template_id: &str,
    level: u32,
) -> Result<i64, PersistenceError> {
    let (table, column) = table.table_and_column();
    let sql = format!("INSERT INTO {table} (fiefdom_id, {column}, level) VALUES (?1, ?2, ?3)");
    conn.execute(&sql, params![fiefdom_id, template_id, level])?;
    Ok(conn.last_insert_rowid())
}

pub fn load_personnel(
    conn: &Connection,
    table: PersonnelTable,
    fiefdom_id: i64,
) -> Result<Vec<PersonnelRow>, PersistenceError> {
    let (table, column) = table.table_and_column();
    let sql = format!(
        "SELECT id, fiefdom_id, {column}, level FROM {table} WHERE fiefdom_id = ?1 ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fiefdom_id], |row| {
        Ok(PersonnelRow {
            id: row.get(0)?,
            fiefdom_id: row.get(1)?,
            template_id: row.get(2)?,
            level: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_roster(conn: &Connection, fiefdom_id: i64) -> Result<Roster, PersistenceError> {
    let entry = |template_id: String, level: u32| PersonnelEntry::new(template_id, level);
    Ok(Roster {
        officials: load_officials(conn, fiefdom_id)?
            .into_iter()
            .map(|row| entry(row.template_id, row.level))
            .collect(),
        heroes: load_personnel(conn, PersonnelTable::Heroes, fiefdom_id)?
            .into_iter()
            .map(|row| entry(row.template_id, row.level))
            .collect(),
        combatants: load_personnel(conn, PersonnelTable::Combatants, fiefdom_id)?
            .into_iter()
            .map(|row| entry(row.template_id, row.level))
            .collect(),
    })
}

/// Everything catch-up needs about one fiefdom, or `None` when it is gone.
pub fn load_state(
    conn: &Connection,
    config: &ConfigRegistry,
    fiefdom_id: i64,
) -> Result<Option<FiefdomState>, PersistenceError> {
    let Some(row) = load_fiefdom(conn, fiefdom_id)? else {
        return Ok(None);
    };
    Ok(Some(FiefdomState {
        fiefdom_id,
        resources: row.resources,
        morale: row.morale,
        last_update_time: row.last_update_time,
        buildings: load_buildings(conn, config, fiefdom_id)?,
        walls: load_walls(conn, config, fiefdom_id)?,
        roster: load_roster(conn, fiefdom_id)?,
    }))
}

fn expect_one_row(changed: usize, entity: &str, id: i64) -> Result<(), PersistenceError> {
    if changed == 1 {
        Ok(())
    } else {
        Err(PersistenceError::Corrupt(format!(
            "{entity} {id} changed {changed} rows"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ConfigRegistry {
        ConfigRegistry::empty()
            .with_building_types(&json!({"home_base": {"width": 4, "height": 4}}))
            .and_then(|config| {
                config.with_walls(&json!({"walls": {
                    "1": {"width": 30, "length": 20, "thickness": 2, "hp": [100]}
                }}))
            })
            .expect("config")
    }

    fn seed(store: &SqliteGameStore) -> i64 {
        insert_fiefdom(
            store.connection(),
            &NewFiefdom {
                owner_id: 7,
                name: "Ravenest".to_string(),
                x: 10,
                y: -4,
                resources: ResourceAmounts::from([(ResourceKind::Gold, 500)]),
            },
            1_000,
        )
        .expect("insert fiefdom")
    }

    #[test]
    fn fiefdom_round_trips_through_sqlite() {
        let store = SqliteGameStore::open_in_memory().expect("store");
        let id = seed(&store);

        let row = load_fiefdom(store.connection(), id)
            .expect("query")
            .expect("fiefdom exists");
        assert_eq!(row.owner_id, 7);
        assert_eq!(row.resources.get(&ResourceKind::Gold), Some(&500));
        assert_eq!(row.resources.get(&ResourceKind::Mana), Some(&0));
        assert_eq!(row.last_update_time, 1_000);
        assert_eq!(row.resources.len(), ResourceKind::ALL.len());

        assert!(load_fiefdom(store.connection(), id + 1).expect("query").is_none());
        assert_eq!(list_fiefdoms_for_owner(store.connection(), 7).expect("list").len(), 1);
    }

    #[test]
    fn buildings_carry_configured_dimensions() {
        let store = SqliteGameStore::open_in_memory().expect("store");
        let config = config();
        let fiefdom_id = seed(&store);
        let conn = store.connection();

        let manor = insert_building(conn, fiefdom_id, HOME_BASE_TYPE, 0, 0, 50).expect("insert");
        let shed = insert_building(conn, fiefdom_id, "shed", 6, 0, 50).expect("insert");
        assert!(has_home_base(conn, fiefdom_id, false).expect("query"));
        assert!(!has_home_base(conn, fiefdom_id, true).expect("query"));

        set_building_construction(conn, manor, 1, 0, 60).expect("complete");
        assert!(has_home_base(conn, fiefdom_id, true).expect("query"));

        let buildings = load_buildings(conn, &config, fiefdom_id).expect("load");
        assert_eq!(buildings.len(), 2);
        assert_eq!((buildings[0].width, buildings[0].height), (4, 4));
        assert_eq!((buildings[1].width, buildings[1].height), (1, 1));
        assert_eq!(buildings[1].construction_start_ts, 50);
        assert_eq!(buildings[1].action_tag, None);

        delete_building(conn, shed).expect("delete");
        assert!(load_building(conn, &config, shed).expect("query").is_none());
        assert!(delete_building(conn, shed).is_err());
    }

    #[test]
    fn wall_generation_is_unique_per_fiefdom() {
        let store = SqliteGameStore::open_in_memory().expect("store");
        let config = config();
        let fiefdom_id = seed(&store);
        let conn = store.connection();

        let wall_id = insert_wall(conn, fiefdom_id, 1, 100, 10).expect("insert");
        assert!(wall_generation_exists(conn, fiefdom_id, 1).expect("query"));
        assert!(insert_wall(conn, fiefdom_id, 1, 100, 10).is_err());

        let wall = load_wall(conn, &config, wall_id).expect("query").expect("wall");
        assert_eq!((wall.width, wall.length, wall.thickness), (30, 20, 2));
        assert_eq!(wall.level, 1);
        assert_eq!(wall.construction_start_ts, 0);
    }

    #[test]
    fn roster_collects_all_personnel() {
        let store = SqliteGameStore::open_in_memory().expect("store");
        let fiefdom_id = seed(&store);
        let conn = store.connection();

        insert_official(conn, fiefdom_id, OfficialRole::Steward, "tom", 3, "Tom", 2).expect("official");
        insert_personnel(conn, PersonnelTable::Heroes, fiefdom_id, "ada", 4).expect("hero");
        insert_personnel(conn, PersonnelTable::Combatants, fiefdom_id, "pike", 1).expect("combatant");

        let roster = load_roster(conn, fiefdom_id).expect("roster");
        assert_eq!(roster.officials, vec![PersonnelEntry::new("tom", 2)]);
        assert_eq!(roster.heroes, vec![PersonnelEntry::new("ada", 4)]);
        assert_eq!(roster.combatants, vec![PersonnelEntry::new("pike", 1)]);

        let officials = load_officials(conn, fiefdom_id).expect("officials");
        assert_eq!(officials[0].role, OfficialRole::Steward);
        assert_eq!(officials[0].portrait_id, 3);
    }

    #[test]
    fn on_disk_store_reopens_with_existing_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fiefdoms.sqlite");
        let id = {
            let store = SqliteGameStore::open(&path).expect("create");
            seed(&store)
        };
        let reopened = SqliteGameStore::open(&path).expect("reopen");
        assert!(load_fiefdom(reopened.connection(), id).expect("query").is_some());
    }
}

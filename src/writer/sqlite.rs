use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use super::schema_gen::{generate_create_table, generate_indexes, generate_insert};
use super::{SavegameStore, StoreError};
use crate::parser::{BlueprintRecord, SavegameInfo, ShipRecord, StationRecord};
use crate::schema::{get_table, ALL_TABLES, BLUEPRINTS, INVENTORY, SHIPS, STATIONS, STATION_MODULES};

const UPSERT_SAVEGAME: &str = "INSERT INTO savegames (
        filename, file_path, file_modified_at, file_size, player_name,
        player_money, playtime_seconds, game_version, metadata
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(filename) DO UPDATE SET
        file_path = excluded.file_path,
        parsed_at = CURRENT_TIMESTAMP,
        file_modified_at = excluded.file_modified_at,
        file_size = excluded.file_size,
        player_name = excluded.player_name,
        player_money = excluded.player_money,
        playtime_seconds = excluded.playtime_seconds,
        game_version = excluded.game_version,
        metadata = excluded.metadata
    RETURNING id";

const SAVEGAME_COLUMNS: &str = "id, filename, file_path, parsed_at, file_modified_at, file_size, \
    player_name, player_money, playtime_seconds, game_version, metadata";

/// A stored savegame header as read back from the database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavegameRow {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    pub parsed_at: Option<String>,
    pub file_modified_at: Option<String>,
    pub file_size: Option<i64>,
    pub player_name: Option<String>,
    pub player_money: Option<i64>,
    pub playtime_seconds: Option<i64>,
    pub game_version: Option<String>,
    pub metadata: Value,
}

impl SavegameRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get(10)?;
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            file_path: row.get(2)?,
            parsed_at: row.get(3)?,
            file_modified_at: row.get(4)?,
            file_size: row.get(5)?,
            player_name: row.get(6)?,
            player_money: row.get(7)?,
            playtime_seconds: row.get(8)?,
            game_version: row.get(9)?,
            metadata: decode_metadata(metadata.as_deref()),
        })
    }
}

/// SQLite-backed savegame store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`; existing data is kept
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        let store = Self::init(conn).context("Failed to initialize database schema")?;
        info!(path = %db_path.display(), "Database ready");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Create all tables and their foreign key indexes if missing
    pub fn create_tables(&self) -> Result<(), StoreError> {
        for schema in ALL_TABLES {
            self.conn.execute(&generate_create_table(schema), [])?;
            for index_sql in generate_indexes(schema) {
                self.conn.execute(&index_sql, [])?;
            }
        }
        debug!(tables = ALL_TABLES.len(), "Schema ensured");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Stored savegames, most recently parsed first
    pub fn list_savegames(&self) -> Result<Vec<SavegameRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM savegames ORDER BY parsed_at DESC, id DESC",
            SAVEGAME_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], SavegameRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn savegame_by_filename(&self, filename: &str) -> Result<Option<SavegameRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM savegames WHERE filename = ?1", SAVEGAME_COLUMNS),
                [filename],
                SavegameRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Full savegame as JSON: header, ships, stations with modules and inventory, blueprints
    pub fn savegame_data(&self, savegame_id: i64) -> Result<Option<Value>, StoreError> {
        let header = self
            .conn
            .query_row(
                &format!("SELECT {} FROM savegames WHERE id = ?1", SAVEGAME_COLUMNS),
                [savegame_id],
                SavegameRow::from_row,
            )
            .optional()?;
        let Some(header) = header else {
            return Ok(None);
        };

        let ships = self.rows_as_json(
            "SELECT * FROM ships WHERE savegame_id = ?1 ORDER BY id",
            savegame_id,
        )?;
        let blueprints = self.rows_as_json(
            "SELECT * FROM blueprints WHERE savegame_id = ?1 ORDER BY id",
            savegame_id,
        )?;
        let station_rows = self.rows_as_json(
            "SELECT * FROM stations WHERE savegame_id = ?1 ORDER BY id",
            savegame_id,
        )?;

        let mut stations = Vec::new();
        for mut station in station_rows {
            let station_db_id = station.get("id").and_then(Value::as_i64).unwrap_or_default();
            let modules = self.rows_as_json(
                "SELECT * FROM station_modules WHERE station_db_id = ?1 ORDER BY id",
                station_db_id,
            )?;
            let inventory = self.rows_as_json(
                "SELECT * FROM inventory WHERE station_db_id = ?1 ORDER BY id",
                station_db_id,
            )?;
            if let Value::Object(map) = &mut station {
                map.insert("modules".into(), Value::Array(modules));
                map.insert("inventory".into(), Value::Array(inventory));
            }
            stations.push(station);
        }

        let mut data = Map::new();
        data.insert("savegame".into(), serde_json::to_value(header)?);
        data.insert("ships".into(), Value::Array(ships));
        data.insert("stations".into(), Value::Array(stations));
        data.insert("blueprints".into(), Value::Array(blueprints));
        Ok(Some(Value::Object(data)))
    }

    /// Rows of `table` belonging to a savegame
    pub fn count_rows(&self, table: &str, savegame_id: i64) -> Result<i64, StoreError> {
        let schema = get_table(table)
            .ok_or_else(|| StoreError::Rejected(format!("unknown table: {}", table)))?;
        let filter = if schema.name == "savegames" {
            "id = ?1"
        } else if schema.column("savegame_id").is_some() {
            "savegame_id = ?1"
        } else {
            "station_db_id IN (SELECT id FROM stations WHERE savegame_id = ?1)"
        };
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", schema.name, filter);
        Ok(self.conn.query_row(&sql, [savegame_id], |row| row.get(0))?)
    }

    fn rows_as_json(&self, sql: &str, key: i64) -> Result<Vec<Value>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query([key])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (idx, name) in names.iter().enumerate() {
                let value = match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => Value::from(i),
                    ValueRef::Real(f) => Value::from(f),
                    ValueRef::Text(t) => {
                        let text = String::from_utf8_lossy(t);
                        if name == "metadata" {
                            decode_metadata(Some(&text))
                        } else {
                            Value::String(text.into_owned())
                        }
                    }
                    ValueRef::Blob(b) => Value::from(b.to_vec()),
                };
                object.insert(name.clone(), value);
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }
}

impl SavegameStore for SqliteStore {
    fn upsert_savegame_info(&mut self, info: &SavegameInfo) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            UPSERT_SAVEGAME,
            params![
                info.filename,
                info.file_path,
                info.file_modified_at.map(|t| t.to_rfc3339()),
                info.file_size as i64,
                info.player_name,
                info.player_money,
                info.playtime_seconds,
                info.game_version,
                serde_json::to_string(&info.metadata)?,
            ],
            |row| row.get(0),
        )?;
        debug!(file = %info.filename, savegame_id = id, "Upserted savegame");
        Ok(id)
    }

    fn insert_ships(
        &mut self,
        savegame_id: i64,
        ships: &[ShipRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        if reset {
            tx.execute("DELETE FROM ships WHERE savegame_id = ?1", [savegame_id])?;
        }
        {
            let mut stmt = tx.prepare_cached(&generate_insert(&SHIPS))?;
            for ship in ships {
                stmt.execute(params![
                    savegame_id,
                    ship.ship_id,
                    ship.ship_name,
                    ship.ship_class,
                    ship.ship_type,
                    ship.sector,
                    ship.hull_health,
                    ship.shield_health,
                    ship.commander,
                    serde_json::to_string(&ship.metadata)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_stations(
        &mut self,
        savegame_id: i64,
        stations: &[StationRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        if reset {
            // modules and inventory follow through ON DELETE CASCADE
            tx.execute("DELETE FROM stations WHERE savegame_id = ?1", [savegame_id])?;
        }
        for station in stations {
            insert_station(&tx, savegame_id, station)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_blueprints(
        &mut self,
        savegame_id: i64,
        blueprints: &[BlueprintRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        if reset {
            tx.execute("DELETE FROM blueprints WHERE savegame_id = ?1", [savegame_id])?;
        }
        {
            let mut stmt = tx.prepare_cached(&generate_insert(&BLUEPRINTS))?;
            for blueprint in blueprints {
                stmt.execute(params![
                    savegame_id,
                    blueprint.blueprint_name,
                    blueprint.blueprint_type,
                    blueprint.is_owned,
                    serde_json::to_string(&blueprint.metadata)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn insert_station(
    tx: &Transaction<'_>,
    savegame_id: i64,
    station: &StationRecord,
) -> Result<(), StoreError> {
    tx.prepare_cached(&generate_insert(&STATIONS))?.execute(params![
        savegame_id,
        station.station_id,
        station.station_name,
        station.owner,
        station.sector,
        station.position_x,
        station.position_y,
        station.position_z,
        station.total_storage,
        station.total_workforce,
        serde_json::to_string(&station.metadata)?,
    ])?;
    let station_db_id = tx.last_insert_rowid();

    let mut modules = tx.prepare_cached(&generate_insert(&STATION_MODULES))?;
    for module in &station.modules {
        modules.execute(params![
            station_db_id,
            module.module_macro,
            module.module_type,
            module.quantity,
            module.origin.as_str(),
            serde_json::to_string(&module.metadata)?,
        ])?;
    }

    let mut inventory = tx.prepare_cached(&generate_insert(&INVENTORY))?;
    for item in &station.inventory {
        inventory.execute(params![
            station_db_id,
            item.ware,
            item.quantity,
            item.capacity,
            item.price,
            serde_json::to_string(&item.metadata)?,
        ])?;
    }
    Ok(())
}

fn decode_metadata(text: Option<&str>) -> Value {
    match text {
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        None => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{InventoryItem, ModuleOrigin, ModuleRecord};

    fn info(filename: &str, player: &str) -> SavegameInfo {
        let mut info = SavegameInfo::new(filename, format!("/saves/{}", filename));
        info.player_name = player.to_string();
        info.player_money = 42;
        info
    }

    fn ship(id: &str) -> ShipRecord {
        ShipRecord {
            ship_id: id.to_string(),
            ship_name: "Courier".into(),
            ship_class: "ship_s".into(),
            ship_type: "ship_arg_s_fighter_01_a_macro".into(),
            sector: "Argon Prime".into(),
            hull_health: Some(100.0),
            shield_health: None,
            commander: None,
            metadata: Map::new(),
        }
    }

    fn station(id: &str) -> StationRecord {
        StationRecord {
            station_id: id.to_string(),
            station_name: "Depot".into(),
            owner: "player".into(),
            sector: "Argon Prime".into(),
            position_x: 1.0,
            position_y: 2.0,
            position_z: 3.0,
            total_storage: 2000,
            total_workforce: 0,
            modules: vec![ModuleRecord {
                module_macro: "storage_a_macro".into(),
                module_type: "storage".into(),
                quantity: 2,
                origin: ModuleOrigin::Module,
                metadata: Map::new(),
            }],
            inventory: vec![InventoryItem {
                ware: "energycells".into(),
                quantity: 10,
                capacity: 100,
                price: 16.0,
                metadata: Map::new(),
            }],
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_upsert_keeps_id_and_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        store.insert_ships(id, &[ship("S1")], true).unwrap();

        let again = store.upsert_savegame_info(&info("a.xml.gz", "Bob")).unwrap();
        assert_eq!(id, again);
        assert_eq!(store.count_rows("ships", id).unwrap(), 1);

        let row = store.savegame_by_filename("a.xml.gz").unwrap().unwrap();
        assert_eq!(row.player_name.as_deref(), Some("Bob"));
        assert!(store.savegame_by_filename("missing.xml.gz").unwrap().is_none());
    }

    #[test]
    fn test_reset_deletes_even_for_empty_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        store.insert_ships(id, &[ship("S1"), ship("S2")], true).unwrap();
        store.insert_ships(id, &[ship("S3")], false).unwrap();
        assert_eq!(store.count_rows("ships", id).unwrap(), 3);

        store.insert_ships(id, &[], true).unwrap();
        assert_eq!(store.count_rows("ships", id).unwrap(), 0);
    }

    #[test]
    fn test_station_reset_cascades_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        store.insert_stations(id, &[station("T1")], true).unwrap();
        assert_eq!(store.count_rows("station_modules", id).unwrap(), 1);
        assert_eq!(store.count_rows("inventory", id).unwrap(), 1);

        store.insert_stations(id, &[station("T2")], true).unwrap();
        assert_eq!(store.count_rows("stations", id).unwrap(), 1);
        assert_eq!(store.count_rows("station_modules", id).unwrap(), 1);
        assert_eq!(store.count_rows("inventory", id).unwrap(), 1);
    }

    #[test]
    fn test_resets_are_scoped_to_one_savegame() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        let b = store.upsert_savegame_info(&info("b.xml.gz", "Ada")).unwrap();
        store.insert_blueprints(
            a,
            &[BlueprintRecord {
                blueprint_name: "module_gen_prod_energycells_01_macro".into(),
                blueprint_type: "module".into(),
                is_owned: true,
                metadata: Map::new(),
            }],
            true,
        )
        .unwrap();
        store.insert_blueprints(b, &[], true).unwrap();
        assert_eq!(store.count_rows("blueprints", a).unwrap(), 1);
    }

    #[test]
    fn test_savegame_data_nests_station_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        store.insert_ships(id, &[ship("S1")], true).unwrap();
        store.insert_stations(id, &[station("T1")], true).unwrap();

        let data = store.savegame_data(id).unwrap().unwrap();
        assert_eq!(data["savegame"]["player_name"], "Ada");
        assert_eq!(data["ships"][0]["ship_id"], "S1");
        assert_eq!(data["ships"][0]["metadata"], Value::Object(Map::new()));
        assert_eq!(data["stations"][0]["total_storage"], 2000);
        assert_eq!(data["stations"][0]["modules"][0]["quantity"], 2);
        assert_eq!(data["stations"][0]["modules"][0]["origin"], "module");
        assert_eq!(data["stations"][0]["inventory"][0]["ware"], "energycells");
        assert_eq!(data["blueprints"], Value::Array(vec![]));

        assert!(store.savegame_data(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.count_rows("types", 1), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_open_creates_parent_and_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("x4.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.upsert_savegame_info(&info("a.xml.gz", "Ada")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_savegames().unwrap().len(), 1);
    }
}

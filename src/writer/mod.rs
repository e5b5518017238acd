pub mod batch;
pub mod schema_gen;
pub mod sqlite;

use thiserror::Error;

use crate::parser::{BlueprintRecord, SavegameInfo, ShipRecord, StationRecord};

pub use batch::{BatchWriter, EntityKind, BATCH_SIZE};
pub use sqlite::{SavegameRow, SqliteStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Narrow persistence interface consumed by the parser.
///
/// `reset = true` deletes the kind's existing rows for the savegame before
/// inserting (even when `records` is empty); it is passed exactly once per
/// kind per parse.
pub trait SavegameStore {
    /// Insert or update by filename; returns the durable savegame id
    fn upsert_savegame_info(&mut self, info: &SavegameInfo) -> Result<i64, StoreError>;

    fn insert_ships(
        &mut self,
        savegame_id: i64,
        ships: &[ShipRecord],
        reset: bool,
    ) -> Result<(), StoreError>;

    /// Also persists each station's modules and inventory
    fn insert_stations(
        &mut self,
        savegame_id: i64,
        stations: &[StationRecord],
        reset: bool,
    ) -> Result<(), StoreError>;

    fn insert_blueprints(
        &mut self,
        savegame_id: i64,
        blueprints: &[BlueprintRecord],
        reset: bool,
    ) -> Result<(), StoreError>;
}

impl<S: SavegameStore + ?Sized> SavegameStore for &mut S {
    fn upsert_savegame_info(&mut self, info: &SavegameInfo) -> Result<i64, StoreError> {
        (**self).upsert_savegame_info(info)
    }

    fn insert_ships(
        &mut self,
        savegame_id: i64,
        ships: &[ShipRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        (**self).insert_ships(savegame_id, ships, reset)
    }

    fn insert_stations(
        &mut self,
        savegame_id: i64,
        stations: &[StationRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        (**self).insert_stations(savegame_id, stations, reset)
    }

    fn insert_blueprints(
        &mut self,
        savegame_id: i64,
        blueprints: &[BlueprintRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        (**self).insert_blueprints(savegame_id, blueprints, reset)
    }
}

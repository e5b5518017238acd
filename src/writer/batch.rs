use std::fmt;
use thiserror::Error;
use tracing::debug;

use super::{SavegameStore, StoreError};
use crate::parser::{BlueprintRecord, ShipRecord, StationRecord};

/// Rows buffered per entity kind before a flush
pub const BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Ships,
    Stations,
    Blueprints,
}

impl EntityKind {
    pub fn operation(&self) -> &'static str {
        match self {
            EntityKind::Ships => "inserting ships",
            EntityKind::Stations => "inserting stations",
            EntityKind::Blueprints => "inserting blueprints",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Ships => write!(f, "ships"),
            EntityKind::Stations => write!(f, "stations"),
            EntityKind::Blueprints => write!(f, "blueprints"),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to write {kind} batch: {source}")]
pub struct FlushError {
    pub kind: EntityKind,
    #[source]
    pub source: StoreError,
}

#[derive(Debug)]
struct Buffer<T> {
    items: Vec<T>,
    reset_done: bool,
    written: usize,
}

impl<T> Buffer<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            reset_done: false,
            written: 0,
        }
    }

    /// Write buffered items; the first write of a parse resets existing rows
    fn flush(
        &mut self,
        kind: EntityKind,
        write: impl FnOnce(&[T], bool) -> Result<(), StoreError>,
    ) -> Result<(), FlushError> {
        let reset = !self.reset_done;
        write(&self.items, reset).map_err(|source| FlushError { kind, source })?;
        debug!(kind = %kind, rows = self.items.len(), reset, "Wrote batch");
        self.reset_done = true;
        self.written += self.items.len();
        self.items.clear();
        Ok(())
    }
}

/// Buffers finalized records of one parse and writes them in fixed-size batches
#[derive(Debug)]
pub struct BatchWriter {
    batch_size: usize,
    ships: Buffer<ShipRecord>,
    stations: Buffer<StationRecord>,
    blueprints: Buffer<BlueprintRecord>,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    pub fn new() -> Self {
        Self::with_batch_size(BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ships: Buffer::new(),
            stations: Buffer::new(),
            blueprints: Buffer::new(),
        }
    }

    /// Buffer a ship; returns true once the ship buffer is due for a flush
    pub fn push_ship(&mut self, ship: ShipRecord) -> bool {
        self.ships.items.push(ship);
        self.ships.items.len() >= self.batch_size
    }

    pub fn push_station(&mut self, station: StationRecord) -> bool {
        self.stations.items.push(station);
        self.stations.items.len() >= self.batch_size
    }

    pub fn push_blueprint(&mut self, blueprint: BlueprintRecord) -> bool {
        self.blueprints.items.push(blueprint);
        self.blueprints.items.len() >= self.batch_size
    }

    pub fn pending(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Ships => self.ships.items.len(),
            EntityKind::Stations => self.stations.items.len(),
            EntityKind::Blueprints => self.blueprints.items.len(),
        }
    }

    pub fn written(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Ships => self.ships.written,
            EntityKind::Stations => self.stations.written,
            EntityKind::Blueprints => self.blueprints.written,
        }
    }

    /// Flush every kind whose buffer reached the threshold
    pub fn flush_full<S: SavegameStore>(
        &mut self,
        store: &mut S,
        savegame_id: i64,
    ) -> Result<(), FlushError> {
        if self.ships.items.len() >= self.batch_size {
            self.ships.flush(EntityKind::Ships, |items, reset| {
                store.insert_ships(savegame_id, items, reset)
            })?;
        }
        if self.stations.items.len() >= self.batch_size {
            self.stations.flush(EntityKind::Stations, |items, reset| {
                store.insert_stations(savegame_id, items, reset)
            })?;
        }
        if self.blueprints.items.len() >= self.batch_size {
            self.blueprints.flush(EntityKind::Blueprints, |items, reset| {
                store.insert_blueprints(savegame_id, items, reset)
            })?;
        }
        Ok(())
    }

    /// End of stream: flush what is left, and reset kinds that never flushed
    /// so rows from an earlier parse of the same file do not linger
    pub fn finish<S: SavegameStore>(
        &mut self,
        store: &mut S,
        savegame_id: i64,
    ) -> Result<(), FlushError> {
        if !self.ships.items.is_empty() || !self.ships.reset_done {
            self.ships.flush(EntityKind::Ships, |items, reset| {
                store.insert_ships(savegame_id, items, reset)
            })?;
        }
        if !self.stations.items.is_empty() || !self.stations.reset_done {
            self.stations.flush(EntityKind::Stations, |items, reset| {
                store.insert_stations(savegame_id, items, reset)
            })?;
        }
        if !self.blueprints.items.is_empty() || !self.blueprints.reset_done {
            self.blueprints.flush(EntityKind::Blueprints, |items, reset| {
                store.insert_blueprints(savegame_id, items, reset)
            })?;
        }
        Ok(())
    }
}

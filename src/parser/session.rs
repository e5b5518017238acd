//! Parse orchestration: one file, one pass, one owned session

use chrono::{DateTime, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::builder::{apply_info, apply_player};
use super::context::{ContextTracker, Emitted};
use super::decoder::{EventStream, SaxEvent};
use super::model::{ParseOutcome, ParseSummary, SavegameInfo};
use crate::error::{IngestError, Stage};
use crate::stats::ModuleStatsIndex;
use crate::ui::{Phase, Ui};
use crate::writer::batch::FlushError;
use crate::writer::{BatchWriter, SavegameStore, StoreError, BATCH_SIZE};

/// Decoder events between progress reports
const PROGRESS_EVERY: u64 = 25_000;

/// Mutable state of one parse, dropped when the file is done
struct ParseSession {
    info: SavegameInfo,
    savegame_id: Option<i64>,
    player_seen: bool,
    tracker: ContextTracker,
    batches: BatchWriter,
    ships: usize,
    stations: usize,
    blueprints: usize,
}

impl ParseSession {
    fn new(info: SavegameInfo, batch_size: usize) -> Self {
        Self {
            info,
            savegame_id: None,
            player_seen: false,
            tracker: ContextTracker::new(),
            batches: BatchWriter::with_batch_size(batch_size),
            ships: 0,
            stations: 0,
            blueprints: 0,
        }
    }

    fn handle<S: SavegameStore>(
        &mut self,
        store: &mut S,
        emitted: Emitted,
    ) -> Result<(), IngestError> {
        let due = match emitted {
            Emitted::Info(attrs) => {
                apply_info(&mut self.info, &attrs);
                false
            }
            Emitted::Player(attrs) => {
                apply_player(&mut self.info, &attrs, !self.player_seen);
                self.player_seen = true;
                if self.savegame_id.is_none() {
                    let id = self.upsert(store)?;
                    info!(
                        file = %self.info.filename,
                        player = %self.info.player_name,
                        savegame_id = id,
                        "Player identified"
                    );
                }
                // buffers may have filled up before an id existed
                true
            }
            Emitted::Ship(ship) => {
                self.ships += 1;
                self.batches.push_ship(ship)
            }
            Emitted::Station(station) => {
                self.stations += 1;
                self.batches.push_station(station)
            }
            Emitted::Blueprint(blueprint) => {
                self.blueprints += 1;
                self.batches.push_blueprint(blueprint)
            }
        };

        if due {
            if let Some(id) = self.savegame_id {
                let filename = &self.info.filename;
                self.batches
                    .flush_full(store, id)
                    .map_err(|e| flush_failed(filename, e))?;
            }
        }
        Ok(())
    }

    fn upsert<S: SavegameStore>(&mut self, store: &mut S) -> Result<i64, IngestError> {
        let id = store.upsert_savegame_info(&self.info).map_err(|source| {
            persistence_failed(&self.info.filename, "upserting savegame info", source)
        })?;
        self.savegame_id = Some(id);
        Ok(id)
    }

    fn finish<S: SavegameStore>(mut self, store: &mut S) -> Result<ParseOutcome, IngestError> {
        if !self.player_seen {
            warn!(file = %self.info.filename, "No player element found; storing fallback identity");
        }
        let id = self.upsert(store)?;
        self.batches
            .finish(store, id)
            .map_err(|e| flush_failed(&self.info.filename, e))?;

        Ok(ParseOutcome {
            savegame_id: id,
            filename: self.info.filename.clone(),
            summary: ParseSummary {
                ships: self.ships,
                stations: self.stations,
                blueprints: self.blueprints,
                player_name: self.info.player_name,
                player_money: self.info.player_money,
            },
        })
    }
}

fn persistence_failed(file: &str, operation: &'static str, source: StoreError) -> IngestError {
    IngestError::Persistence {
        file: file.to_string(),
        operation,
        source,
    }
}

fn flush_failed(file: &str, err: FlushError) -> IngestError {
    persistence_failed(file, err.kind.operation(), err.source)
}

/// Parses savegames one at a time into a [`SavegameStore`].
///
/// The module stats index lives as long as the parser, so catalog lookups
/// made for one file are reused by the next.
pub struct SavegameParser<S: SavegameStore> {
    store: S,
    stats: ModuleStatsIndex,
    batch_size: usize,
}

impl<S: SavegameStore> SavegameParser<S> {
    pub fn new(store: S, stats: ModuleStatsIndex) -> Self {
        Self {
            store,
            stats,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn stats_mut(&mut self) -> &mut ModuleStatsIndex {
        &mut self.stats
    }

    /// Parse one gzip-compressed savegame file start to finish
    pub fn parse_savegame<U: Ui>(
        &mut self,
        path: &Path,
        ui: &mut U,
    ) -> Result<ParseOutcome, IngestError> {
        let result = describe_file(path).and_then(|info| {
            ui.set_phase(Phase::Streaming);
            ui.set_info(format!("{} ({} bytes)", info.filename, info.file_size));
            let stream = EventStream::open(path)?;
            let total = info.file_size;
            self.drive(stream, info, total, ui)
        });
        self.report(result, ui)
    }

    /// Parse from any gzip byte source; `info` supplies the file identity
    pub fn parse_reader<R: Read, U: Ui>(
        &mut self,
        source: R,
        info: SavegameInfo,
        ui: &mut U,
    ) -> Result<ParseOutcome, IngestError> {
        ui.set_phase(Phase::Streaming);
        ui.set_info(info.filename.clone());
        let total = info.file_size;
        let stream = EventStream::from_reader(source, info.filename.clone());
        let result = self.drive(stream, info, total, ui);
        self.report(result, ui)
    }

    /// Parse files strictly in order; a failure does not stop the queue.
    /// Files left unparsed because the UI asked to stop are not reported.
    pub fn parse_queue<U: Ui>(
        &mut self,
        paths: &[PathBuf],
        ui: &mut U,
    ) -> Vec<(PathBuf, Result<ParseOutcome, IngestError>)> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            if ui.should_stop() {
                warn!(remaining = paths.len() - results.len(), "Stopping before the next savegame");
                break;
            }
            results.push((path.clone(), self.parse_savegame(path, ui)));
        }
        results
    }

    fn drive<R: Read, U: Ui>(
        &mut self,
        mut stream: EventStream<R>,
        info: SavegameInfo,
        total_bytes: u64,
        ui: &mut U,
    ) -> Result<ParseOutcome, IngestError> {
        let started = Instant::now();
        let filename = info.filename.clone();
        let mut session = ParseSession::new(info, self.batch_size);
        let mut events: u64 = 0;

        info!(file = %filename, bytes = total_bytes, "Parsing savegame");

        while let Some(event) = stream.next() {
            let emitted = match event? {
                SaxEvent::Open { name, attrs } => session.tracker.open(&name, attrs),
                SaxEvent::Close { name } => session.tracker.close(&name, &mut self.stats),
                SaxEvent::End => break,
            };
            if let Some(emitted) = emitted {
                session.handle(&mut self.store, emitted)?;
            }

            events += 1;
            if events % PROGRESS_EVERY == 0 {
                ui.set_progress(stream.bytes_read(), total_bytes, "compressed bytes");
                debug!(
                    file = %filename,
                    events,
                    depth = session.tracker.depth(),
                    ships = session.ships,
                    stations = session.stations,
                    "Progress"
                );
            }
        }

        ui.set_phase(Phase::Finalizing);
        ui.clear_progress();
        debug!(
            file = %filename,
            events,
            max_depth = session.tracker.max_depth(),
            "Stream finished"
        );

        let outcome = session.finish(&mut self.store)?;
        info!(
            file = %filename,
            ships = outcome.summary.ships,
            stations = outcome.summary.stations,
            blueprints = outcome.summary.blueprints,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parse complete"
        );
        Ok(outcome)
    }

    fn report<U: Ui>(
        &self,
        result: Result<ParseOutcome, IngestError>,
        ui: &mut U,
    ) -> Result<ParseOutcome, IngestError> {
        match &result {
            Ok(outcome) => {
                ui.set_phase(Phase::Done);
                ui.log(format!(
                    "{}: {} ships, {} stations, {} blueprints",
                    outcome.filename,
                    outcome.summary.ships,
                    outcome.summary.stations,
                    outcome.summary.blueprints
                ));
            }
            Err(err) => {
                ui.set_phase(Phase::Failed);
                ui.log(format!("{}", err));
                error!(file = %err.file(), stage = %err.stage(), "Parse failed: {}", err);
            }
        }
        result
    }
}

/// File identity from stat metadata
fn describe_file(path: &Path) -> Result<SavegameInfo, IngestError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let meta = std::fs::metadata(path).map_err(|source| IngestError::SourceIo {
        file: filename.clone(),
        stage: Stage::Open,
        source,
    })?;

    let mut info = SavegameInfo::new(filename, path.display().to_string());
    info.file_size = meta.len();
    info.file_modified_at = meta.modified().ok().map(DateTime::<Utc>::from);
    Ok(info)
}

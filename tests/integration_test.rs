//! End-to-end tests: gzip savegame fixtures streamed through the parser into SQLite.
//!
//! A small macro catalog is written once to a temp directory and shared by
//! every test that needs module capacities.

use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use x4_savegame_to_sqlite::error::IngestError;
use x4_savegame_to_sqlite::parser::{
    BlueprintRecord, ParseSummary, SavegameInfo, SavegameParser, ShipRecord, StationRecord,
};
use x4_savegame_to_sqlite::stats::ModuleStatsIndex;
use x4_savegame_to_sqlite::ui::SilentUi;
use x4_savegame_to_sqlite::writer::{SavegameStore, SqliteStore, StoreError, BATCH_SIZE};

// =============================================================================
// Fixtures
// =============================================================================

/// Random seed for reproducible document generation
const RANDOM_SEED: u64 = 42;

static CATALOG: Lazy<TempDir> = Lazy::new(|| {
    let dir = TempDir::new().expect("Failed to create catalog dir");
    let structures = dir.path().join("base").join("assets").join("structures");
    let storage = structures.join("storage");
    let habitat = structures.join("habitation");
    std::fs::create_dir_all(&storage).unwrap();
    std::fs::create_dir_all(&habitat).unwrap();

    std::fs::write(
        storage.join("storage_a_macro.xml"),
        r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="storage_a_macro" class="storage">
    <properties>
      <identification name="Solid Storage"/>
      <cargo max="1000" tags="solid"/>
    </properties>
  </macro>
</macros>"#,
    )
    .unwrap();
    std::fs::write(
        habitat.join("hab_macro.xml"),
        r#"<macros><macro name="hab_macro">
<properties><workforce capacity="250"/></properties></macro></macros>"#,
    )
    .unwrap();
    dir
});

fn new_parser() -> SavegameParser<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("Failed to open in-memory store");
    SavegameParser::new(store, ModuleStatsIndex::new(vec![CATALOG.path().to_path_buf()]))
}

fn gzip(xml: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn write_savegame(dir: &Path, name: &str, xml: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, gzip(xml)).unwrap();
    path
}

const SCENARIO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<savegame>
  <info playtime="7200" version="7.10"/>
  <player name="Ada" money="1000" location="{20004,30001}"/>
  <universe>
    <component class="galaxy" macro="xu_ep2_universe_macro">
      <component class="sector" name="Argon Prime">
        <component class="ship" id="S1" hull="100"/>
        <component class="station" id="T1" owner="player">
          <module macro="storage_a_macro" count="2"/>
        </component>
      </component>
    </component>
  </universe>
</savegame>"#;

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_end_to_end_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(dir.path(), "quicksave.xml.gz", SCENARIO);
    let mut parser = new_parser();

    let outcome = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    assert_eq!(
        outcome.summary,
        ParseSummary {
            ships: 1,
            stations: 1,
            blueprints: 0,
            player_name: "Ada".into(),
            player_money: 1000,
        }
    );

    let conn = parser.store().connection();
    let (total_storage, sector): (i64, String) = conn
        .query_row(
            "SELECT total_storage, sector FROM stations WHERE station_id = 'T1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(total_storage, 2000);
    assert_eq!(sector, "Argon Prime");

    let quantities: Vec<i64> = conn
        .prepare("SELECT quantity FROM station_modules")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(quantities, vec![2]);

    let hull: Option<f64> = conn
        .query_row("SELECT hull_health FROM ships WHERE ship_id = 'S1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(hull, Some(100.0));

    let row = parser.store().savegame_by_filename("quicksave.xml.gz").unwrap().unwrap();
    assert_eq!(row.playtime_seconds, Some(7200));
    assert_eq!(row.metadata["location"], "{20004,30001}");
}

#[test]
fn test_reparse_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(dir.path(), "autosave_01.xml.gz", SCENARIO);
    let mut parser = new_parser();

    let first = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    let second = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    assert_eq!(first.savegame_id, second.savegame_id);
    assert_eq!(first.summary, second.summary);

    let store = parser.store();
    for table in ["ships", "stations", "station_modules", "blueprints"] {
        let expected = match table {
            "ships" | "stations" | "station_modules" => 1,
            _ => 0,
        };
        assert_eq!(store.count_rows(table, second.savegame_id).unwrap(), expected, "{}", table);
    }
    assert_eq!(store.list_savegames().unwrap().len(), 1);
}

#[test]
fn test_updated_file_drops_stale_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(dir.path(), "save_002.xml.gz", SCENARIO);
    let mut parser = new_parser();
    let id = parser.parse_savegame(&path, &mut SilentUi).unwrap().savegame_id;

    write_savegame(
        dir.path(),
        "save_002.xml.gz",
        r#"<savegame><player name="Ada" money="5"/><universe/></savegame>"#,
    );
    let outcome = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    assert_eq!(outcome.savegame_id, id);
    assert_eq!(parser.store().count_rows("ships", id).unwrap(), 0);
    assert_eq!(parser.store().count_rows("stations", id).unwrap(), 0);
    assert_eq!(parser.store().count_rows("station_modules", id).unwrap(), 0);
}

// =============================================================================
// Failure handling
// =============================================================================

fn large_document(ships: usize) -> String {
    let mut xml = String::from(r#"<savegame><player name="Ada" money="1000"/><universe>"#);
    for n in 0..ships {
        xml.push_str(&format!(
            concat!(
                r#"<component class="ship_s" id="[0x{:x}]" "#,
                r#"macro="ship_arg_s_scout_01_a_macro" hull="{}"/>"#
            ),
            n,
            n % 100
        ));
    }
    xml.push_str("</universe></savegame>");
    xml
}

#[test]
fn test_truncated_gzip_keeps_prior_rows() {
    let dir = TempDir::new().unwrap();
    let mut parser = new_parser();

    let path = write_savegame(dir.path(), "quicksave.xml.gz", &large_document(50));
    let id = parser.parse_savegame(&path, &mut SilentUi).unwrap().savegame_id;
    assert_eq!(parser.store().count_rows("ships", id).unwrap(), 50);

    let bytes = gzip(&large_document(80));
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    let err = parser.parse_savegame(&path, &mut SilentUi).unwrap_err();
    assert!(matches!(err, IngestError::Decompression { .. }), "{:?}", err);
    assert_eq!(err.file(), "quicksave.xml.gz");
    assert_eq!(parser.store().count_rows("ships", id).unwrap(), 50);
}

#[test]
fn test_truncated_gzip_new_file_has_no_rows() {
    let dir = TempDir::new().unwrap();
    let mut parser = new_parser();

    let bytes = gzip(&large_document(80));
    let path = dir.path().join("fresh.xml.gz");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = parser.parse_savegame(&path, &mut SilentUi).unwrap_err();
    assert!(matches!(err, IngestError::Decompression { .. }), "{:?}", err);
    if let Some(row) = parser.store().savegame_by_filename("fresh.xml.gz").unwrap() {
        for table in ["ships", "stations", "blueprints"] {
            assert_eq!(parser.store().count_rows(table, row.id).unwrap(), 0, "{}", table);
        }
    }
}

#[test]
fn test_rootless_document_keeps_prior_rows() {
    let dir = TempDir::new().unwrap();
    let mut parser = new_parser();

    let path = write_savegame(dir.path(), "quicksave.xml.gz", &large_document(20));
    let id = parser.parse_savegame(&path, &mut SilentUi).unwrap().savegame_id;
    assert_eq!(parser.store().count_rows("ships", id).unwrap(), 20);

    for body in ["hello", "", "   \n", r#"<?xml version="1.0"?>"#] {
        write_savegame(dir.path(), "quicksave.xml.gz", body);
        let err = parser.parse_savegame(&path, &mut SilentUi).unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }), "{:?}: {:?}", body, err);
        assert_eq!(parser.store().count_rows("ships", id).unwrap(), 20, "{:?}", body);
    }
}

#[test]
fn test_malformed_after_flush_keeps_flushed_batches() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(
        dir.path(),
        "broken.xml.gz",
        r#"<savegame><player name="Ada" money="3"/><universe>
            <component class="ship_s" id="A"/>
            <component class="ship_s" id="B"/>
            <component class="ship_s" id="C"/>
        </galaxy></savegame>"#,
    );
    let mut parser = new_parser().with_batch_size(2);

    let err = parser.parse_savegame(&path, &mut SilentUi).unwrap_err();
    assert!(matches!(err, IngestError::MalformedDocument { .. }), "{:?}", err);
    assert_eq!(err.file(), "broken.xml.gz");

    let row = parser.store().savegame_by_filename("broken.xml.gz").unwrap().unwrap();
    assert_eq!(row.player_name.as_deref(), Some("Ada"));
    assert_eq!(parser.store().count_rows("ships", row.id).unwrap(), 2);
}

#[test]
fn test_unknown_macro_still_completes() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(
        dir.path(),
        "mystery.xml.gz",
        r#"<savegame><player name="Ada"/>
            <component class="station" id="T9" storage="300">
                <module macro="prod_gen_mystery_macro"/>
                <module macro="hab_macro"/>
            </component>
        </savegame>"#,
    );
    let mut parser = new_parser();
    let outcome = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    assert_eq!(outcome.summary.stations, 1);

    let conn = parser.store().connection();
    let (storage, workforce): (i64, i64) = conn
        .query_row("SELECT total_storage, total_workforce FROM stations", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(storage, 300);
    assert_eq!(workforce, 250);

    let module_type: String = conn
        .query_row(
            "SELECT module_type FROM station_modules \
             WHERE module_macro = 'prod_gen_mystery_macro'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(module_type, "production");
}

#[test]
fn test_construction_plan_and_blueprints() {
    let dir = TempDir::new().unwrap();
    let path = write_savegame(
        dir.path(),
        "plans.xml.gz",
        r#"<savegame><player name="Ada" money="12">
                <blueprints>
                    <blueprint ware="module_arg_stor_solid_m_01"/>
                    <blueprint ware="ship_arg_s_fighter_01"/>
                    <blueprint ware="shield_arg_s_standard_01_mk1"/>
                </blueprints>
            </player>
            <component class="station" id="T2">
                <construction><sequence>
                    <entry index="1" macro="storage_a_macro"/>
                    <entry index="2"/>
                </sequence></construction>
            </component>
        </savegame>"#,
    );
    let mut parser = new_parser();
    let outcome = parser.parse_savegame(&path, &mut SilentUi).unwrap();
    assert_eq!(outcome.summary.blueprints, 3);

    let data = parser.store().savegame_data(outcome.savegame_id).unwrap().unwrap();
    let types: Vec<&str> = data["blueprints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["blueprint_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["module", "ship", "equipment"]);

    let modules = data["stations"][0]["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0]["origin"], "construction");
    assert_eq!(data["stations"][0]["metadata"]["planned_modules"], 1);
}

// =============================================================================
// Batching
// =============================================================================

#[derive(Default)]
struct RecordingStore {
    ship_batches: Vec<(usize, bool)>,
    station_batches: Vec<(usize, bool)>,
    blueprint_batches: Vec<(usize, bool)>,
    upserts: usize,
}

impl SavegameStore for RecordingStore {
    fn upsert_savegame_info(&mut self, _info: &SavegameInfo) -> Result<i64, StoreError> {
        self.upserts += 1;
        Ok(1)
    }

    fn insert_ships(
        &mut self,
        _id: i64,
        ships: &[ShipRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        self.ship_batches.push((ships.len(), reset));
        Ok(())
    }

    fn insert_stations(
        &mut self,
        _id: i64,
        stations: &[StationRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        self.station_batches.push((stations.len(), reset));
        Ok(())
    }

    fn insert_blueprints(
        &mut self,
        _id: i64,
        blueprints: &[BlueprintRecord],
        reset: bool,
    ) -> Result<(), StoreError> {
        self.blueprint_batches.push((blueprints.len(), reset));
        Ok(())
    }
}

#[test]
fn test_batch_threshold_boundary() {
    let mut parser = SavegameParser::new(RecordingStore::default(), ModuleStatsIndex::new(vec![]));
    let xml = large_document(BATCH_SIZE + 1);
    let info = SavegameInfo::new("big.xml.gz", "/saves/big.xml.gz");

    let outcome = parser
        .parse_reader(std::io::Cursor::new(gzip(&xml)), info, &mut SilentUi)
        .unwrap();
    assert_eq!(outcome.summary.ships, BATCH_SIZE + 1);

    let store = parser.into_store();
    assert_eq!(store.ship_batches, vec![(BATCH_SIZE, true), (1, false)]);
    assert_eq!(store.station_batches, vec![(0, true)]);
    assert_eq!(store.blueprint_batches, vec![(0, true)]);
    assert_eq!(store.upserts, 2);
}

// =============================================================================
// Random nesting
// =============================================================================

const NEUTRAL_CLASSES: &[&str] =
    &["galaxy", "cluster", "sector", "zone", "highway", "gate", "asteroid"];

/// Emit a random component tree; returns the number of ship/station scopes written
fn random_tree(rng: &mut StdRng, xml: &mut String, depth: usize) -> usize {
    let mut matched = 0;
    let children = if depth >= 6 { 0 } else { rng.gen_range(0..4) };
    for n in 0..children {
        let (attrs, counts) = match rng.gen_range(0..6) {
            0 => (format!(r#"class="ship_m" id="s{}_{}""#, depth, n), true),
            1 => (format!(r#"macro="ship_par_l_miner_01_macro" id="m{}_{}""#, depth, n), true),
            2 => (format!(r#"class="station" id="t{}_{}""#, depth, n), true),
            3 => {
                let attrs =
                    format!(r#"macro="station_gen_factory_base_01_macro" id="f{}_{}""#, depth, n);
                (attrs, true)
            }
            _ => {
                let class = NEUTRAL_CLASSES.choose(rng).unwrap();
                (format!(r#"class="{}""#, class), false)
            }
        };
        if counts {
            matched += 1;
        }
        xml.push_str(&format!("<component {}>", attrs));
        if rng.gen_bool(0.3) {
            xml.push_str("<connections><connection connection=\"space\"/></connections>");
        }
        matched += random_tree(rng, xml, depth + 1);
        xml.push_str("</component>");
    }
    matched
}

#[test]
fn test_random_nesting_counts_every_scope() {
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let mut parser = new_parser();

    for round in 0..10 {
        let mut xml = String::from(r#"<savegame><player name="Ada"/><universe>"#);
        let expected = random_tree(&mut rng, &mut xml, 0);
        xml.push_str("</universe></savegame>");

        let info = SavegameInfo::new(format!("random_{}.xml.gz", round), "/saves/random");
        let outcome = parser
            .parse_reader(std::io::Cursor::new(gzip(&xml)), info, &mut SilentUi)
            .unwrap();
        assert_eq!(
            outcome.summary.ships + outcome.summary.stations,
            expected,
            "round {}",
            round
        );
    }
}

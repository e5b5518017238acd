//! Records extracted from a savegame

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_SECTOR: &str = "Unknown Sector";

/// Identity and header data of one savegame file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavegameInfo {
    pub filename: String,
    pub file_path: String,
    pub file_modified_at: Option<DateTime<Utc>>,
    pub file_size: u64,
    pub player_name: String,
    pub player_money: i64,
    pub playtime_seconds: i64,
    pub game_version: String,
    pub metadata: Map<String, Value>,
}

impl SavegameInfo {
    pub fn new(filename: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            file_path: file_path.into(),
            file_modified_at: None,
            file_size: 0,
            player_name: UNKNOWN.to_string(),
            player_money: 0,
            playtime_seconds: 0,
            game_version: UNKNOWN.to_string(),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipRecord {
    pub ship_id: String,
    pub ship_name: String,
    pub ship_class: String,
    pub ship_type: String,
    pub sector: String,
    pub hull_health: Option<f64>,
    pub shield_health: Option<f64>,
    pub commander: Option<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub station_id: String,
    pub station_name: String,
    pub owner: String,
    pub sector: String,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub total_storage: i64,
    pub total_workforce: i64,
    pub modules: Vec<ModuleRecord>,
    pub inventory: Vec<InventoryItem>,
    pub metadata: Map<String, Value>,
}

/// Where a module record came from in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleOrigin {
    /// Live station layout (`module`)
    Module,
    /// Planned layout (`construction > sequence > entry`)
    Construction,
}

impl ModuleOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleOrigin::Module => "module",
            ModuleOrigin::Construction => "construction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRecord {
    pub module_macro: String,
    pub module_type: String,
    pub quantity: i64,
    pub origin: ModuleOrigin,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub ware: String,
    pub quantity: i64,
    pub capacity: i64,
    pub price: f64,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlueprintRecord {
    pub blueprint_name: String,
    pub blueprint_type: String,
    pub is_owned: bool,
    pub metadata: Map<String, Value>,
}

/// Per-file result returned by a successful parse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseSummary {
    pub ships: usize,
    pub stations: usize,
    pub blueprints: usize,
    pub player_name: String,
    pub player_money: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub savegame_id: i64,
    pub filename: String,
    pub summary: ParseSummary,
}

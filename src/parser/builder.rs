//! Record construction and aggregate computation
//!
//! Drafts accumulate attribute captures while their scope is open; the final
//! record is only produced once every child has been visited.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::attributes::{coerce_value, insert_opt, metadata_excluding, Attributes};
use super::classify::ModuleCategory;
use super::model::{
    BlueprintRecord, InventoryItem, ModuleOrigin, ModuleRecord, SavegameInfo, ShipRecord,
    StationRecord, UNKNOWN, UNKNOWN_SECTOR,
};
use crate::stats::MacroStats;

const SECTOR_KEYS: &[&str] = &["sector", "zone", "system"];
const MODULE_KEYS: &[&str] = &["macro", "count", "quantity", "amount", "type"];
const WARE_KEYS: &[&str] = &[
    "ware", "name", "amount", "quantity", "count", "capacity", "max", "storage", "price", "buy",
    "sell",
];
const INFO_KEYS: &[&str] = &["playtime", "version", "save"];
const PLAYER_KEYS: &[&str] = &["name", "money", "location"];

/// Best available sector: own attributes first, then the enclosing scope
pub fn derive_sector(attrs: &Attributes, enclosing: Option<&str>) -> String {
    attrs
        .first_of(SECTOR_KEYS)
        .or(enclosing)
        .unwrap_or(UNKNOWN_SECTOR)
        .to_string()
}

pub fn apply_info(info: &mut SavegameInfo, attrs: &Attributes) {
    if let Some(playtime) = attrs.integer("playtime") {
        info.playtime_seconds = playtime;
    }
    if let Some(version) = attrs.get("version") {
        info.game_version = version.to_string();
    }
    insert_opt(&mut info.metadata, "save_time", attrs.get("save"));
    info.metadata.extend(metadata_excluding(attrs, INFO_KEYS));
}

/// Apply a `player` element. The first one is authoritative; later ones only
/// fill fields still at their fallback values.
pub fn apply_player(info: &mut SavegameInfo, attrs: &Attributes, first: bool) {
    if let Some(name) = attrs.get("name") {
        if first || info.player_name == UNKNOWN {
            info.player_name = name.to_string();
        }
    }
    if let Some(money) = attrs.integer("money") {
        if first || info.player_money == 0 {
            info.player_money = money;
        }
    }
    if first || !info.metadata.contains_key("location") {
        insert_opt(&mut info.metadata, "location", attrs.get("location"));
    }
    if first {
        let extra = metadata_excluding(attrs, PLAYER_KEYS);
        if !extra.is_empty() {
            info.metadata.insert("player".to_string(), Value::Object(extra));
        }
    }
}

pub fn begin_ship(attrs: &Attributes, enclosing_sector: Option<&str>) -> ShipRecord {
    let mut metadata = Map::new();
    insert_opt(&mut metadata, "owner", attrs.get("owner"));
    insert_opt(&mut metadata, "purpose", attrs.get("purpose"));
    metadata.insert(
        "position".to_string(),
        json!({ "x": attrs.number("x"), "y": attrs.number("y"), "z": attrs.number("z") }),
    );

    ShipRecord {
        ship_id: attrs.first_of(&["id", "code"]).unwrap_or("unknown").to_string(),
        ship_name: attrs.get("name").unwrap_or("Unnamed Ship").to_string(),
        ship_class: attrs.get("class").unwrap_or("ship").to_string(),
        ship_type: attrs.get("macro").unwrap_or("unknown").to_string(),
        sector: derive_sector(attrs, enclosing_sector),
        hull_health: attrs.number("hull"),
        shield_health: attrs.number("shield"),
        commander: attrs.get("commander").map(str::to_string),
        metadata,
    }
}

/// A nested `source` element may name the ship's real sector
pub fn apply_source(ship: &mut ShipRecord, attrs: &Attributes) {
    if let Some(sector) = attrs.first_of(SECTOR_KEYS) {
        ship.sector = sector.to_string();
    }
}

pub fn build_blueprint(attrs: &Attributes) -> BlueprintRecord {
    let ware = attrs.get("ware");
    let blueprint_type = match attrs.get("type") {
        Some(t) => t.to_string(),
        None => infer_blueprint_type(ware.unwrap_or_default()).to_string(),
    };
    let mut metadata = Map::new();
    insert_opt(&mut metadata, "race", attrs.get("race"));
    insert_opt(&mut metadata, "ware", ware);

    BlueprintRecord {
        blueprint_name: attrs.first_of(&["name", "ware"]).unwrap_or("unknown").to_string(),
        blueprint_type,
        is_owned: attrs.flag("owned").unwrap_or(false),
        metadata,
    }
}

fn infer_blueprint_type(ware: &str) -> &'static str {
    if ware.starts_with("module_") {
        "module"
    } else if ware.starts_with("ship_") {
        "ship"
    } else {
        "equipment"
    }
}

/// Inventory line from a `ware` element; `None` without a ware identifier
pub fn inventory_item(attrs: &Attributes) -> Option<InventoryItem> {
    let ware = attrs.first_of(&["ware", "name"])?;
    let mut metadata = Map::new();
    if let Some(buy) = attrs.flag("buy") {
        metadata.insert("buy".to_string(), Value::Bool(buy));
    }
    if let Some(sell) = attrs.flag("sell") {
        metadata.insert("sell".to_string(), Value::Bool(sell));
    }
    metadata.extend(metadata_excluding(attrs, WARE_KEYS));

    Some(InventoryItem {
        ware: ware.to_string(),
        quantity: attrs.first_number(&["amount", "quantity", "count"]).unwrap_or(0.0) as i64,
        capacity: attrs.first_number(&["capacity", "max", "storage"]).unwrap_or(0.0) as i64,
        price: attrs.number("price").unwrap_or(0.0),
        metadata,
    })
}

fn vector(attrs: &Attributes, keys: &[&str]) -> Option<Value> {
    let map: Map<String, Value> = keys
        .iter()
        .filter_map(|k| attrs.get(k).map(|v| (k.to_string(), coerce_value(v))))
        .collect();
    (!map.is_empty()).then_some(Value::Object(map))
}

fn connection_name(attrs: &Attributes) -> Option<String> {
    attrs
        .first_of(&["connection", "name", "id", "macro"])
        .map(str::to_string)
}

/// What a closed module adds to its station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleContribution {
    pub workforce: Option<f64>,
    pub storage: f64,
    pub storage_by_tag: BTreeMap<String, f64>,
    pub inline_ware_capacity: f64,
}

/// A module (or planned construction entry) whose scope is still open
#[derive(Debug, Clone)]
pub struct ModuleDraft {
    record: ModuleRecord,
    declared_workforce: Option<f64>,
    inline_ware_capacity: f64,
}

impl ModuleDraft {
    pub fn begin(attrs: &Attributes, origin: ModuleOrigin) -> Self {
        let module_macro = attrs.get("macro").unwrap_or("unknown").to_string();
        let module_type = attrs
            .get("type")
            .map(str::to_string)
            .unwrap_or_else(|| ModuleCategory::from_macro(&module_macro).to_string());
        let quantity = attrs
            .first_number(&["count", "quantity", "amount"])
            .map(|q| q as i64)
            .unwrap_or(1)
            .max(1);

        Self {
            record: ModuleRecord {
                module_macro,
                module_type,
                quantity,
                origin,
                metadata: metadata_excluding(attrs, MODULE_KEYS),
            },
            declared_workforce: None,
            inline_ware_capacity: 0.0,
        }
    }

    pub fn macro_name(&self) -> &str {
        &self.record.module_macro
    }

    pub fn capture_workforce(&mut self, attrs: &Attributes) {
        let capacity = attrs.first_number(&["capacity", "max"]);
        if capacity.is_some() {
            self.declared_workforce = capacity;
        }
        let mut workforce = Map::new();
        workforce.insert("capacity".to_string(), json!(capacity));
        let employed = attrs.first_number(&["employed", "amount", "current"]);
        workforce.insert("employed".to_string(), json!(employed));
        self.record.metadata.insert("workforce".to_string(), Value::Object(workforce));
    }

    pub fn capture_offset(&mut self, attrs: &Attributes) {
        if let Some(offset) = vector(attrs, &["x", "y", "z"]) {
            self.record.metadata.insert("offset".to_string(), offset);
        }
    }

    pub fn capture_rotation(&mut self, attrs: &Attributes) {
        if let Some(rotation) = vector(attrs, &["yaw", "pitch", "roll"]) {
            self.record.metadata.insert("rotation".to_string(), rotation);
        }
    }

    pub fn capture_connection(&mut self, attrs: &Attributes) {
        if let Some(name) = connection_name(attrs) {
            push_array(&mut self.record.metadata, "connections", Value::String(name));
        }
    }

    pub fn capture_ware(&mut self, attrs: &Attributes) {
        if let Some(capacity) = attrs.number("capacity") {
            self.inline_ware_capacity += capacity;
        }
        if let Some(item) = inventory_item(attrs) {
            let entry = json!({
                "ware": item.ware,
                "amount": item.quantity,
                "capacity": item.capacity,
            });
            push_array(&mut self.record.metadata, "wares", entry);
        }
    }

    /// Close the module scope, resolving derived capacities from `stats` when known
    pub fn finish(self, stats: Option<&MacroStats>) -> (ModuleRecord, ModuleContribution) {
        let quantity = self.record.quantity as f64;
        let mut contribution = ModuleContribution {
            workforce: stats
                .and_then(|s| s.workforce_capacity)
                .or(self.declared_workforce)
                .map(|w| w * quantity),
            inline_ware_capacity: self.inline_ware_capacity,
            ..Default::default()
        };

        if let Some(stats) = stats {
            contribution.storage = stats.storage_capacity() * quantity;
            for entry in &stats.storage_entries {
                if entry.tags.is_empty() {
                    *contribution.storage_by_tag.entry("untagged".to_string()).or_default() +=
                        entry.capacity * quantity;
                }
                for tag in &entry.tags {
                    *contribution.storage_by_tag.entry(tag.clone()).or_default() +=
                        entry.capacity * quantity;
                }
            }
        }

        (self.record, contribution)
    }
}

fn push_array(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.entry(key).or_insert_with(|| Value::Array(Vec::new())) {
        Value::Array(items) => items.push(value),
        other => *other = Value::Array(vec![value]),
    }
}

/// A station whose scope is still open
#[derive(Debug, Clone)]
pub struct StationDraft {
    record: StationRecord,
    position_declared: bool,
    declared_storage: f64,
    declared_workforce: f64,
    inline_ware_capacity: f64,
    module_storage: f64,
    module_workforce: f64,
    storage_by_tag: BTreeMap<String, f64>,
    connections: usize,
}

impl StationDraft {
    pub fn begin(attrs: &Attributes, enclosing_sector: Option<&str>) -> Self {
        let mut metadata = Map::new();
        insert_opt(&mut metadata, "race", attrs.get("race"));
        insert_opt(&mut metadata, "purpose", attrs.get("purpose"));
        insert_opt(&mut metadata, "macro", attrs.get("macro"));

        let position_declared = ["x", "y", "z"].iter().any(|k| attrs.number(k).is_some());

        Self {
            record: StationRecord {
                station_id: attrs.first_of(&["id", "code"]).unwrap_or("unknown").to_string(),
                station_name: attrs.get("name").unwrap_or("Unnamed Station").to_string(),
                owner: attrs.first_of(&["owner", "faction"]).unwrap_or(UNKNOWN).to_string(),
                sector: derive_sector(attrs, enclosing_sector),
                position_x: attrs.number("x").unwrap_or(0.0),
                position_y: attrs.number("y").unwrap_or(0.0),
                position_z: attrs.number("z").unwrap_or(0.0),
                total_storage: 0,
                total_workforce: 0,
                modules: Vec::new(),
                inventory: Vec::new(),
                metadata,
            },
            position_declared,
            declared_storage: attrs.first_number(&["storage", "capacity"]).unwrap_or(0.0),
            declared_workforce: attrs.number("workforce").unwrap_or(0.0),
            inline_ware_capacity: 0.0,
            module_storage: 0.0,
            module_workforce: 0.0,
            storage_by_tag: BTreeMap::new(),
            connections: 0,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.record.station_id
    }

    pub fn absorb_module(&mut self, module: ModuleRecord, contribution: ModuleContribution) {
        if let Some(workforce) = contribution.workforce {
            self.module_workforce += workforce;
        }
        self.module_storage += contribution.storage;
        self.inline_ware_capacity += contribution.inline_ware_capacity;
        for (tag, capacity) in contribution.storage_by_tag {
            *self.storage_by_tag.entry(tag).or_default() += capacity;
        }
        self.record.modules.push(module);
    }

    pub fn capture_workforce(&mut self, attrs: &Attributes) {
        if let Some(capacity) = attrs.first_number(&["capacity", "max", "amount"]) {
            self.declared_workforce += capacity;
        }
    }

    pub fn capture_offset(&mut self, attrs: &Attributes) {
        if self.position_declared {
            return;
        }
        let (x, y, z) = (attrs.number("x"), attrs.number("y"), attrs.number("z"));
        if x.is_none() && y.is_none() && z.is_none() {
            return;
        }
        self.record.position_x = x.unwrap_or(0.0);
        self.record.position_y = y.unwrap_or(0.0);
        self.record.position_z = z.unwrap_or(0.0);
        self.position_declared = true;
    }

    pub fn capture_rotation(&mut self, attrs: &Attributes) {
        if let Some(rotation) = vector(attrs, &["yaw", "pitch", "roll"]) {
            self.record.metadata.insert("rotation".to_string(), rotation);
        }
    }

    pub fn capture_connection(&mut self, attrs: &Attributes) {
        if connection_name(attrs).is_some() {
            self.connections += 1;
        }
    }

    pub fn capture_ware(&mut self, attrs: &Attributes) {
        if let Some(capacity) = attrs.number("capacity") {
            self.inline_ware_capacity += capacity;
        }
        if let Some(item) = inventory_item(attrs) {
            self.record.inventory.push(item);
        }
    }

    /// Compute derived aggregates and produce the final record.
    ///
    /// Storage precedence, first non-zero wins: module capacities from the
    /// stats index, inline ware capacity attributes, inventory item
    /// capacities, the station's own declared value. Module workforce
    /// likewise overrides declared workforce.
    pub fn finish(mut self) -> StationRecord {
        let inventory_capacity: f64 = self.record.inventory.iter().map(|i| i.capacity as f64).sum();
        let (storage, source) = [
            (self.module_storage, "modules"),
            (self.inline_ware_capacity, "inline"),
            (inventory_capacity, "inventory"),
            (self.declared_storage, "declared"),
        ]
        .into_iter()
        .find(|(value, _)| *value > 0.0)
        .unwrap_or((0.0, "none"));

        let workforce = if self.module_workforce > 0.0 {
            self.module_workforce
        } else {
            self.declared_workforce
        };

        self.record.total_storage = storage.round() as i64;
        self.record.total_workforce = workforce.round() as i64;

        let metadata = &mut self.record.metadata;
        metadata.insert("storage_source".to_string(), Value::String(source.to_string()));
        if !self.storage_by_tag.is_empty() {
            metadata.insert("storage_by_tag".to_string(), json!(self.storage_by_tag));
        }
        if self.connections > 0 {
            metadata.insert("connection_count".to_string(), json!(self.connections));
        }

        let planned = self
            .record
            .modules
            .iter()
            .filter(|m| m.origin == ModuleOrigin::Construction)
            .count();
        if planned > 0 {
            self.record.metadata.insert("planned_modules".to_string(), json!(planned));
        }

        self.record
    }
}

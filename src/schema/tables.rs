//! Table schema definitions for the savegame database

use super::types::*;

pub static SAVEGAMES: TableSchema = TableSchema {
    name: "savegames",
    columns: &[
        Column::required("filename", ColumnType::Text).unique(),
        Column::required("file_path", ColumnType::Text),
        Column::new("parsed_at", ColumnType::Timestamp).default_sql("CURRENT_TIMESTAMP"),
        Column::new("file_modified_at", ColumnType::Timestamp),
        Column::new("file_size", ColumnType::Integer),
        Column::new("player_name", ColumnType::Text),
        Column::new("player_money", ColumnType::Integer),
        Column::new("playtime_seconds", ColumnType::Integer),
        Column::new("game_version", ColumnType::Text),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[],
};

pub static SHIPS: TableSchema = TableSchema {
    name: "ships",
    columns: &[
        Column::required("savegame_id", ColumnType::Integer),
        Column::required("ship_id", ColumnType::Text),
        Column::new("ship_name", ColumnType::Text),
        Column::new("ship_class", ColumnType::Text),
        Column::new("ship_type", ColumnType::Text),
        Column::new("sector", ColumnType::Text),
        Column::new("hull_health", ColumnType::Real),
        Column::new("shield_health", ColumnType::Real),
        Column::new("commander", ColumnType::Text),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[ForeignKey::new("savegame_id", "savegames")],
};

pub static STATIONS: TableSchema = TableSchema {
    name: "stations",
    columns: &[
        Column::required("savegame_id", ColumnType::Integer),
        Column::required("station_id", ColumnType::Text),
        Column::new("station_name", ColumnType::Text),
        Column::new("owner", ColumnType::Text),
        Column::new("sector", ColumnType::Text),
        Column::new("position_x", ColumnType::Real),
        Column::new("position_y", ColumnType::Real),
        Column::new("position_z", ColumnType::Real),
        Column::new("total_storage", ColumnType::Integer),
        Column::new("total_workforce", ColumnType::Integer),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[ForeignKey::new("savegame_id", "savegames")],
};

pub static STATION_MODULES: TableSchema = TableSchema {
    name: "station_modules",
    columns: &[
        Column::required("station_db_id", ColumnType::Integer),
        Column::new("module_macro", ColumnType::Text),
        Column::new("module_type", ColumnType::Text),
        Column::new("quantity", ColumnType::Integer).default_sql("1"),
        Column::new("origin", ColumnType::Text).default_sql("'module'"),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[ForeignKey::new("station_db_id", "stations")],
};

pub static INVENTORY: TableSchema = TableSchema {
    name: "inventory",
    columns: &[
        Column::required("station_db_id", ColumnType::Integer),
        Column::required("ware", ColumnType::Text),
        Column::new("quantity", ColumnType::Integer),
        Column::new("capacity", ColumnType::Integer),
        Column::new("price", ColumnType::Real),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[ForeignKey::new("station_db_id", "stations")],
};

pub static BLUEPRINTS: TableSchema = TableSchema {
    name: "blueprints",
    columns: &[
        Column::required("savegame_id", ColumnType::Integer),
        Column::required("blueprint_name", ColumnType::Text),
        Column::new("blueprint_type", ColumnType::Text),
        Column::new("is_owned", ColumnType::Boolean).default_sql("0"),
        Column::new("metadata", ColumnType::Json),
    ],
    foreign_keys: &[ForeignKey::new("savegame_id", "savegames")],
};

/// All tables, parents before children
pub static ALL_TABLES: &[&TableSchema] = &[
    &SAVEGAMES,
    &SHIPS,
    &STATIONS,
    &STATION_MODULES,
    &INVENTORY,
    &BLUEPRINTS,
];

/// Get table schema by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().find(|t| t.name == name).copied()
}

/// Get all table names
pub fn table_names() -> Vec<&'static str> {
    ALL_TABLES.iter().map(|t| t.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parents_precede_children() {
        let mut seen = HashSet::new();
        for table in ALL_TABLES {
            for dep in table.dependencies() {
                assert!(seen.contains(dep), "{} created before {}", table.name, dep);
            }
            seen.insert(table.name);
        }
    }

    #[test]
    fn test_get_table() {
        assert_eq!(get_table("inventory").map(|t| t.name), Some("inventory"));
        assert!(get_table("types").is_none());
        assert_eq!(table_names().len(), 6);
    }

    #[test]
    fn test_filename_is_unique_key() {
        let filename = SAVEGAMES.column("filename").unwrap();
        assert!(filename.unique);
        assert!(!filename.nullable);
    }
}

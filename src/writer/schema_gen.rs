use crate::schema::TableSchema;

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.name);
    let mut columns = vec!["    id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];

    for col in schema.columns {
        let mut def = format!("    {} {}", col.name, col.col_type.sql_type());
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        if col.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = col.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        columns.push(def);
    }

    for fk in schema.foreign_keys {
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE CASCADE",
            fk.column, fk.references_table, fk.references_column
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                schema.name, fk.column, schema.name, fk.column
            )
        })
        .collect()
}

/// `INSERT INTO t (a, b) VALUES (?1, ?2)` over every non-id column
pub fn generate_insert(schema: &TableSchema) -> String {
    let names: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        names.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{SAVEGAMES, STATION_MODULES};

    #[test]
    fn test_generate_create_table() {
        let sql = generate_create_table(&STATION_MODULES);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS station_modules"));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("quantity INTEGER DEFAULT 1"));
        assert!(sql.contains(
            "FOREIGN KEY (station_db_id) REFERENCES stations(id) ON DELETE CASCADE"
        ));

        let sql = generate_create_table(&SAVEGAMES);
        assert!(sql.contains("filename TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("parsed_at DATETIME DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_generate_indexes() {
        let indexes = generate_indexes(&STATION_MODULES);
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].contains("idx_station_modules_station_db_id"));
        assert!(generate_indexes(&SAVEGAMES).is_empty());
    }

    #[test]
    fn test_generate_insert() {
        let sql = generate_insert(&STATION_MODULES);
        assert_eq!(
            sql,
            "INSERT INTO station_modules \
             (station_db_id, module_macro, module_type, quantity, origin, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        );
    }
}

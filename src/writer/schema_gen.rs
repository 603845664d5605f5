use crate::parser::TablePlan;
use crate::schema::STANDARDIZED_KEY_COLUMN;

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate CREATE TABLE SQL for a planned main table.
///
/// `primary` names the table the key column references; `None` for the
/// primary table itself.
pub fn generate_create_table(plan: &TablePlan, primary: Option<&str>) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(plan.table));
    let mut columns: Vec<String> = plan
        .column_definitions()
        .into_iter()
        .map(|def| format!("    {}", def))
        .collect();

    if let Some(primary) = primary {
        columns.push(format!(
            "    FOREIGN KEY ({key}) REFERENCES {}({key})",
            quote_ident(primary),
            key = quote_ident(STANDARDIZED_KEY_COLUMN)
        ));
    }

    for fk in &plan.lookup_foreign_keys {
        columns.push(format!("    {}", fk.clause()));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE TABLE SQL for a lookup table
pub fn generate_lookup_table(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT UNIQUE NOT NULL)",
        quote_ident(name)
    )
}

/// Generate CREATE INDEX statements for lookup foreign key columns
pub fn generate_indexes(plan: &TablePlan) -> Vec<String> {
    plan.lookup_foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                quote_ident(&format!("idx_{}_{}", plan.table, fk.column)),
                quote_ident(plan.table),
                quote_ident(&fk.column)
            )
        })
        .collect()
}

/// Generate an INSERT OR IGNORE statement for the planned columns
pub fn generate_insert(plan: &TablePlan) -> String {
    let columns: Vec<String> = plan.insert_columns().into_iter().map(quote_ident).collect();
    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(plan.table),
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub fn generate_drop_table(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(name))
}

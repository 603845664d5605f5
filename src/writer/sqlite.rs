use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;

use super::schema_gen::{
    generate_create_table, generate_drop_table, generate_indexes, generate_insert,
    generate_lookup_table, quote_ident,
};
use crate::error::{ImportResult, PlanError};
use crate::parser::{Row, RowCounts, SqlValue, TablePlan};
use crate::schema::STANDARDIZED_KEY_COLUMN;
use crate::ui::Ui;

const BATCH_SIZE: usize = 1000;

/// Unexpected per-row insert errors logged individually before going quiet
const MAX_LOGGED_FATAL: usize = 5;

/// Per-file load counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Data rows read from the file
    pub rows_read: u64,
    /// Short rows padded with nulls
    pub padded: u64,
    /// Rows dropped before insertion (too many fields, corrupt mapping)
    pub discarded: u64,
    pub inserted: u64,
    /// Rows whose key is missing from the primary table
    pub fk_skipped: u64,
    /// Rows whose key already had a row in this table
    pub pk_ignored: u64,
    /// Rows that failed to insert after passing the pre-check
    pub fatal: u64,
}

impl LoadStats {
    pub fn add_row_counts(&mut self, counts: RowCounts) {
        self.rows_read += counts.read;
        self.padded += counts.padded;
        self.discarded += counts.discarded;
    }
}

pub struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;

        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        // Enable foreign keys and optimize for bulk insert
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.transaction()
    }

    /// Drop every user table in the database, configured or not.
    ///
    /// Foreign keys are switched off for the duration, so leftover tables
    /// from earlier runs cannot block the drop of the tables they reference.
    pub fn drop_all_tables(&self) -> rusqlite::Result<()> {
        let names = user_tables(&self.conn)?;

        self.conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        let dropped = names.iter().try_for_each(|name| {
            tracing::debug!(table = %name, "dropping table");
            self.conn.execute(&generate_drop_table(name), []).map(|_| ())
        });
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        dropped
    }

    /// Create all lookup tables
    pub fn create_lookup_tables(&self, names: &[&str]) -> rusqlite::Result<()> {
        tracing::info!(count = names.len(), "creating lookup tables");
        for name in names {
            self.conn.execute(&generate_lookup_table(name), [])?;
        }
        Ok(())
    }

    /// Finalize the database: leave WAL mode so the output is a single file
    pub fn finalize(self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA optimize; PRAGMA journal_mode = DELETE;")?;
        Ok(())
    }
}

/// Create a planned main table and its lookup indexes
pub fn create_table(conn: &Connection, plan: &TablePlan, primary: Option<&str>) -> rusqlite::Result<()> {
    let sql = generate_create_table(plan, primary);
    tracing::debug!(table = plan.table, %sql, "creating table");
    conn.execute(&sql, [])?;

    for index_sql in generate_indexes(plan) {
        conn.execute(&index_sql, [])?;
    }
    Ok(())
}

/// Names of all tables except SQLite's internal ones
fn user_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Whether a table exists in the database
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Insert all rows in batches with INSERT OR IGNORE; duplicate keys are skipped
pub fn insert_bulk<I>(
    conn: &Connection,
    plan: &TablePlan,
    rows: I,
    total: u64,
    stats: &mut LoadStats,
    ui: &mut impl Ui,
) -> ImportResult<()>
where
    I: Iterator<Item = ImportResult<Row>>,
{
    let insert_sql = generate_insert(plan);
    let mut batch: Vec<Row> = Vec::with_capacity(BATCH_SIZE);
    let mut seen: u64 = 0;

    for row in rows {
        batch.push(row?);

        if batch.len() >= BATCH_SIZE {
            seen += batch.len() as u64;
            stats.inserted += insert_batch(conn, &insert_sql, &batch)?;
            ui.set_progress(seen, total, plan.table);
            batch.clear();
        }
    }

    // Insert remaining batch
    if !batch.is_empty() {
        seen += batch.len() as u64;
        stats.inserted += insert_batch(conn, &insert_sql, &batch)?;
    }

    stats.pk_ignored += seen - stats.inserted;
    ui.set_progress(seen, total, plan.table);
    tracing::info!(
        table = plan.table,
        inserted = stats.inserted,
        ignored = stats.pk_ignored,
        "bulk insert finished"
    );

    Ok(())
}

/// Insert a batch of rows, returning how many were actually stored
fn insert_batch(conn: &Connection, sql: &str, batch: &[Row]) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut inserted = 0;

    for row in batch {
        for (idx, value) in row.iter().enumerate() {
            value.bind_to(idx + 1, &mut stmt)?;
        }
        inserted += stmt.raw_execute()? as u64;
    }

    Ok(inserted)
}

/// Insert row by row, skipping rows whose key is not present in `primary`
pub fn insert_with_fk_precheck<I>(
    conn: &Connection,
    plan: &TablePlan,
    primary: &str,
    rows: I,
    total: u64,
    stats: &mut LoadStats,
    ui: &mut impl Ui,
) -> ImportResult<()>
where
    I: Iterator<Item = ImportResult<Row>>,
{
    let key_pos = plan.key_position().ok_or_else(|| PlanError::NoKeyColumn {
        table: plan.table.to_string(),
    })?;

    let primary_present = table_exists(conn, primary)?;
    if !primary_present {
        tracing::warn!(
            table = plan.table,
            primary,
            "primary table missing, every row will be skipped"
        );
    }

    let insert_sql = generate_insert(plan);
    let exists_sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?1",
        quote_ident(primary),
        quote_ident(STANDARDIZED_KEY_COLUMN)
    );
    let mut fatal_keys: Vec<String> = Vec::new();
    let mut seen: u64 = 0;

    for row in rows {
        let row = row?;
        seen += 1;
        if seen % BATCH_SIZE as u64 == 0 {
            ui.set_progress(seen, total, plan.table);
        }

        let key = row[key_pos].as_text();
        let parent_exists = match key {
            Some(key) if primary_present => conn
                .prepare_cached(&exists_sql)?
                .query_row([key], |_| Ok(()))
                .optional()?
                .is_some(),
            _ => false,
        };

        if !parent_exists {
            stats.fk_skipped += 1;
            continue;
        }

        match insert_one(conn, &insert_sql, &row) {
            Ok(0) => stats.pk_ignored += 1,
            Ok(_) => stats.inserted += 1,
            Err(e) => {
                stats.fatal += 1;
                let key = key.unwrap_or_default().to_string();
                if fatal_keys.len() < MAX_LOGGED_FATAL {
                    tracing::error!(table = plan.table, tg_code = %key, error = %e, "unexpected insert failure");
                }
                fatal_keys.push(key);
            }
        }
    }

    ui.set_progress(seen, total, plan.table);
    tracing::info!(
        table = plan.table,
        inserted = stats.inserted,
        fk_skipped = stats.fk_skipped,
        pk_ignored = stats.pk_ignored,
        "insert with key pre-check finished"
    );
    if !fatal_keys.is_empty() {
        tracing::error!(
            table = plan.table,
            count = fatal_keys.len(),
            first = ?&fatal_keys[..fatal_keys.len().min(MAX_LOGGED_FATAL)],
            "rows failed after passing the key pre-check"
        );
    }

    Ok(())
}

fn insert_one(conn: &Connection, sql: &str, row: &[SqlValue]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(sql)?;
    for (idx, value) in row.iter().enumerate() {
        value.bind_to(idx + 1, &mut stmt)?;
    }
    stmt.raw_execute()
}

/// Row count of a table
pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::plan_columns;
    use crate::schema::sources::{CARS, EMISSIONS};
    use crate::ui::SilentUi;

    fn plan_for(cols: &[&str], source: &crate::schema::SourceTable) -> TablePlan {
        let header: Vec<String> = cols.iter().map(|s| s.to_string()).collect();
        plan_columns(&header, 0, source).unwrap()
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn setup() -> (SqliteWriter, TablePlan, TablePlan) {
        let writer = SqliteWriter::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        writer
            .create_lookup_tables(&["lkp_marken", "lkp_typen"])
            .unwrap();
        let cars = plan_for(&["TG-Code", "Typengenehmigung erteilt"], &CARS);
        let emissions = plan_for(&["TG-Code", "CO2"], &EMISSIONS);
        create_table(writer.connection(), &cars, None).unwrap();
        create_table(writer.connection(), &emissions, Some("cars")).unwrap();
        (writer, cars, emissions)
    }

    #[test]
    fn test_bulk_insert_ignores_duplicate_keys() {
        let (writer, cars, _) = setup();
        let rows = vec![
            Ok(vec![text("A1"), text("20200101")]),
            Ok(vec![text("A2"), text("20210101")]),
            Ok(vec![text("A1"), text("20220101")]),
        ];
        let mut stats = LoadStats::default();

        insert_bulk(writer.connection(), &cars, rows.into_iter(), 3, &mut stats, &mut SilentUi).unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.pk_ignored, 1);
        assert_eq!(count_rows(writer.connection(), "cars").unwrap(), 2);
        let kept: String = writer
            .connection()
            .query_row("SELECT typengenehmigung_erteilt FROM cars WHERE tg_code = 'A1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kept, "20200101");
    }

    #[test]
    fn test_precheck_skips_orphans() {
        let (writer, cars, emissions) = setup();
        let mut stats = LoadStats::default();
        insert_bulk(
            writer.connection(),
            &cars,
            vec![Ok(vec![text("A1"), SqlValue::Null])].into_iter(),
            1,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();

        let rows = vec![
            Ok(vec![text("A1"), text("120")]),
            Ok(vec![text("ZZ9"), text("99")]),
            Ok(vec![text("A1"), text("130")]),
            Ok(vec![SqlValue::Null, text("1")]),
        ];
        let mut stats = LoadStats::default();
        insert_with_fk_precheck(
            writer.connection(),
            &emissions,
            "cars",
            rows.into_iter(),
            4,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.fk_skipped, 2);
        assert_eq!(stats.pk_ignored, 1);
        assert_eq!(stats.fatal, 0);
        assert_eq!(count_rows(writer.connection(), "emissions").unwrap(), 1);
    }

    #[test]
    fn test_precheck_without_primary_table() {
        let writer = SqliteWriter::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        let emissions = plan_for(&["TG-Code", "CO2"], &EMISSIONS);
        create_table(writer.connection(), &emissions, Some("cars")).unwrap();

        let mut stats = LoadStats::default();
        insert_with_fk_precheck(
            writer.connection(),
            &emissions,
            "cars",
            vec![Ok(vec![text("A1"), text("120")])].into_iter(),
            1,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();

        assert_eq!(stats.fk_skipped, 1);
        assert_eq!(count_rows(writer.connection(), "emissions").unwrap(), 0);
    }

    #[test]
    fn test_precheck_counts_constraint_failures_and_continues() {
        let (writer, cars, _) = setup();
        let emissions = plan_for(&["TG-Code", "Marke", "CO2"], &EMISSIONS);
        create_table(writer.connection(), &emissions, Some("cars")).unwrap();
        let mut stats = LoadStats::default();
        insert_bulk(
            writer.connection(),
            &cars,
            vec![Ok(vec![text("A1"), SqlValue::Null]), Ok(vec![text("A2"), SqlValue::Null])].into_iter(),
            2,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();

        // id 999 does not exist in lkp_marken
        let rows = vec![
            Ok(vec![text("A1"), SqlValue::Integer(999), text("120")]),
            Ok(vec![text("A2"), SqlValue::Null, text("130")]),
        ];
        let mut stats = LoadStats::default();
        insert_with_fk_precheck(
            writer.connection(),
            &emissions,
            "cars",
            rows.into_iter(),
            2,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();

        assert_eq!(stats.fatal, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.fk_skipped, 0);
        let kept: String = writer
            .connection()
            .query_row("SELECT tg_code FROM emissions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kept, "A2");
    }

    #[test]
    fn test_drop_all_tables_ignores_foreign_keys() {
        let (writer, cars, _) = setup();
        let mut stats = LoadStats::default();
        insert_bulk(
            writer.connection(),
            &cars,
            vec![Ok(vec![text("A1"), SqlValue::Null])].into_iter(),
            1,
            &mut stats,
            &mut SilentUi,
        )
        .unwrap();
        // unknown to the configuration, still references cars
        writer
            .connection()
            .execute_batch(
                r#"CREATE TABLE "legacy" ("tg_code" TEXT PRIMARY KEY REFERENCES "cars"("tg_code"));
                   INSERT INTO "legacy" VALUES ('A1');"#,
            )
            .unwrap();

        writer.drop_all_tables().unwrap();

        assert!(user_tables(writer.connection()).unwrap().is_empty());
        let fk_on: i64 = writer
            .connection()
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk_on, 1);
    }
}

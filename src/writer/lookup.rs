//! Value -> surrogate id resolution for lookup tables

use std::collections::HashMap;

use rusqlite::{Connection, ErrorCode, OptionalExtension};

use super::schema_gen::quote_ident;
use crate::error::ImportResult;
use crate::parser::LookupResolver;

/// Per-run memo of lookup ids: lookup table -> value -> id.
///
/// Owned by one import run and passed down explicitly; never global.
#[derive(Debug, Default)]
pub struct LookupCache {
    tables: HashMap<String, HashMap<String, i64>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, value: &str) -> Option<i64> {
        self.tables.get(table).and_then(|t| t.get(value)).copied()
    }

    pub fn insert(&mut self, table: &str, value: &str, id: i64) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(value.to_string(), id);
    }

    /// Number of cached values for one lookup table
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(HashMap::is_empty)
    }

    /// Forget everything; later lookups re-read the database
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

/// Get the id of `value` in `table`, inserting it when absent.
///
/// Null and empty values are not lookup entries and yield `None`.
pub fn get_or_create_id(
    conn: &Connection,
    table: &str,
    value: Option<&str>,
    cache: &mut LookupCache,
) -> ImportResult<Option<i64>> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Some(id) = cache.get(table, value) {
        return Ok(Some(id));
    }

    if let Some(id) = find_id(conn, table, value)? {
        cache.insert(table, value, id);
        return Ok(Some(id));
    }

    let sql = format!("INSERT INTO {} (value) VALUES (?1)", quote_ident(table));
    match conn.prepare_cached(&sql)?.execute([value]) {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            cache.insert(table, value, id);
            Ok(Some(id))
        }
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            tracing::warn!(table, value, "unique violation on lookup insert, re-querying");
            match find_id(conn, table, value)? {
                Some(id) => {
                    cache.insert(table, value, id);
                    Ok(Some(id))
                }
                None => {
                    tracing::error!(table, value, "could not get or create lookup id");
                    Ok(None)
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn find_id(conn: &Connection, table: &str, value: &str) -> rusqlite::Result<Option<i64>> {
    let sql = format!("SELECT id FROM {} WHERE value = ?1", quote_ident(table));
    conn.prepare_cached(&sql)?
        .query_row([value], |row| row.get(0))
        .optional()
}

/// Read the text stored under `id` in a lookup table
pub fn lookup_value(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<Option<String>> {
    let sql = format!("SELECT value FROM {} WHERE id = ?1", quote_ident(table));
    conn.prepare_cached(&sql)?
        .query_row([id], |row| row.get(0))
        .optional()
}

/// [`LookupResolver`] backed by a connection and the run's cache
pub struct LookupIds<'a> {
    conn: &'a Connection,
    cache: &'a mut LookupCache,
}

impl<'a> LookupIds<'a> {
    pub fn new(conn: &'a Connection, cache: &'a mut LookupCache) -> Self {
        Self { conn, cache }
    }
}

impl LookupResolver for LookupIds<'_> {
    fn resolve(&mut self, lookup_table: &str, value: Option<&str>) -> ImportResult<Option<i64>> {
        get_or_create_id(self.conn, lookup_table, value, self.cache)
    }
}

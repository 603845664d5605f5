//! Read path: joined search over the imported tables with lookup ids
//! resolved back to their text values.

use rusqlite::types::{Value as SqlParam, ValueRef};
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::error::SearchError;
use crate::schema::{
    SourceTable, APPROVAL_DATE_COLUMN, BRAND_COLUMN, MODEL_COLUMN, STANDARDIZED_KEY_COLUMN,
};
use crate::writer::lookup::lookup_value;
use crate::writer::schema_gen::quote_ident;
use crate::writer::table_exists;

/// One denormalized result row: `<table>_<column>` -> value
pub type SearchRow = Map<String, Value>;

/// Optional search criteria; all active criteria must match
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Exact type-approval code
    pub tg_code: Option<String>,
    /// Substring of the brand text
    pub brand: Option<String>,
    /// Substring of the model text
    pub model: Option<String>,
    /// Four-digit approval year
    pub year: Option<String>,
    /// Exact brand lookup id, ignored when `brand` is set
    pub brand_id: Option<i64>,
    /// Exact model lookup id, ignored when `model` is set
    pub model_id: Option<i64>,
    /// Exact matches on other lookup id columns of the primary table
    pub lookup_ids: Vec<(String, i64)>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.tg_code.is_none()
            && self.brand.is_none()
            && self.model.is_none()
            && self.year.is_none()
            && self.brand_id.is_none()
            && self.model_id.is_none()
            && self.lookup_ids.is_empty()
    }
}

/// Search over an open database
pub struct SearchEngine<'a> {
    conn: &'a Connection,
    primary: &'a SourceTable,
    dependents: Vec<&'a SourceTable>,
}

impl<'a> SearchEngine<'a> {
    pub fn new(conn: &'a Connection, sources: &[&'a SourceTable]) -> Result<Self, SearchError> {
        let primary = sources
            .iter()
            .copied()
            .find(|s| s.is_primary())
            .ok_or(SearchError::NoPrimaryTable)?;
        let dependents = sources.iter().copied().filter(|s| !s.is_primary()).collect();

        Ok(Self {
            conn,
            primary,
            dependents,
        })
    }

    pub fn search(&self, filters: &SearchFilters) -> Result<Vec<SearchRow>, SearchError> {
        let primary = self.primary.name;
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(code) = &filters.tg_code {
            conditions.push(format!(
                "{}.{} = ?",
                quote_ident(primary),
                quote_ident(STANDARDIZED_KEY_COLUMN)
            ));
            params.push(SqlParam::Text(code.clone()));
        }

        self.text_or_id_filter(
            BRAND_COLUMN,
            filters.brand.as_deref(),
            filters.brand_id,
            &mut conditions,
            &mut params,
        )?;
        self.text_or_id_filter(
            MODEL_COLUMN,
            filters.model.as_deref(),
            filters.model_id,
            &mut conditions,
            &mut params,
        )?;

        if let Some(year) = &filters.year {
            conditions.push(format!(
                "SUBSTR({}.{}, 1, 4) = ?",
                quote_ident(primary),
                quote_ident(APPROVAL_DATE_COLUMN)
            ));
            params.push(SqlParam::Text(year.clone()));
        }

        if !filters.lookup_ids.is_empty() {
            let columns = table_columns(self.conn, primary)?;
            for (column, id) in &filters.lookup_ids {
                if !columns.iter().any(|c| c == column) {
                    return Err(SearchError::UnknownColumn {
                        table: primary.to_string(),
                        column: column.clone(),
                    });
                }
                conditions.push(format!("{}.{} = ?", quote_ident(primary), quote_ident(column)));
                params.push(SqlParam::Integer(*id));
            }
        }

        if conditions.is_empty() {
            tracing::warn!("search without criteria, returning every row");
        }

        let tables = self.joined_tables()?;
        let sql = self.build_query(&tables, &conditions)?;
        tracing::debug!(%sql, params = params.len(), "executing search");

        let rows = self.fetch_rows(&sql, &params)?;
        self.denormalize(&tables, rows)
    }

    /// Restrict an id column either by substring match on its lookup text
    /// or by an exact id
    fn text_or_id_filter(
        &self,
        column: &str,
        text: Option<&str>,
        id: Option<i64>,
        conditions: &mut Vec<String>,
        params: &mut Vec<SqlParam>,
    ) -> Result<(), SearchError> {
        let id_column = format!("{}_id", column);
        let qualified = format!("{}.{}", quote_ident(self.primary.name), quote_ident(&id_column));

        let ids = match (text, id) {
            (Some(text), _) => {
                let lookup = self.primary.lookup_for(column).ok_or_else(|| SearchError::UnknownColumn {
                    table: self.primary.name.to_string(),
                    column: column.to_string(),
                })?;
                let ids = matching_ids(self.conn, lookup, text)?;
                if ids.is_empty() {
                    tracing::warn!(lookup, text, "no lookup value matches, search will return nothing");
                    conditions.push("0 = 1".to_string());
                    return Ok(());
                }
                if ids.len() > 1 {
                    tracing::info!(lookup, text, matches = ids.len(), "several lookup values match, using all");
                }
                ids
            }
            (None, Some(id)) => vec![id],
            (None, None) => return Ok(()),
        };

        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        conditions.push(format!("{} IN ({})", qualified, placeholders.join(", ")));
        params.extend(ids.into_iter().map(SqlParam::Integer));
        Ok(())
    }

    /// Primary table first, then every dependent table present in the database
    fn joined_tables(&self) -> Result<Vec<&'a SourceTable>, SearchError> {
        let mut tables = vec![self.primary];
        for dependent in &self.dependents {
            if table_exists(self.conn, dependent.name)? {
                tables.push(dependent);
            } else {
                tracing::debug!(table = dependent.name, "dependent table missing, not joined");
            }
        }
        Ok(tables)
    }

    fn build_query(&self, tables: &[&SourceTable], conditions: &[String]) -> Result<String, SearchError> {
        let primary = quote_ident(self.primary.name);
        let key = quote_ident(STANDARDIZED_KEY_COLUMN);

        let mut select = Vec::new();
        for table in tables {
            for column in table_columns(self.conn, table.name)? {
                select.push(format!(
                    "{}.{} AS {}",
                    quote_ident(table.name),
                    quote_ident(&column),
                    quote_ident(&format!("{}_{}", table.name, column))
                ));
            }
        }

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), primary);
        for table in tables.iter().skip(1) {
            let name = quote_ident(table.name);
            sql.push_str(&format!(
                " LEFT JOIN {name} ON {primary}.{key} = {name}.{key}"
            ));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {}.{}", primary, key));

        Ok(sql)
    }

    fn fetch_rows(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SearchRow>, SearchError> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Map::new();
            for (idx, name) in names.iter().enumerate() {
                map.insert(name.clone(), json_value(row.get_ref(idx)?));
            }
            result.push(map);
        }
        Ok(result)
    }

    /// Attach `<table>_<name>_value` next to every `<table>_<name>_id`
    fn denormalize(&self, tables: &[&SourceTable], rows: Vec<SearchRow>) -> Result<Vec<SearchRow>, SearchError> {
        let mut references: Vec<(String, String, String)> = Vec::new();
        for table in tables {
            for (column, lookup) in lookup_references(self.conn, table.name, self.primary.name)? {
                let base = column.strip_suffix("_id").unwrap_or(&column);
                references.push((
                    format!("{}_{}", table.name, column),
                    format!("{}_{}_value", table.name, base),
                    lookup,
                ));
            }
        }

        let mut resolved: HashMap<(String, i64), Option<String>> = HashMap::new();
        let mut result = Vec::with_capacity(rows.len());

        for mut row in rows {
            for (id_key, value_key, lookup) in &references {
                let Some(id) = row.get(id_key).and_then(Value::as_i64) else {
                    continue;
                };

                let text = match resolved.get(&(lookup.clone(), id)) {
                    Some(text) => text.clone(),
                    None => {
                        let text = lookup_value(self.conn, lookup, id)?;
                        resolved.insert((lookup.clone(), id), text.clone());
                        text
                    }
                };

                if let Some(text) = text {
                    row.insert(value_key.clone(), Value::String(text));
                }
            }
            result.push(row);
        }

        Ok(result)
    }
}

/// Open the database read-only and run one search
pub fn search_database(
    db_path: &Path,
    sources: &[&SourceTable],
    filters: &SearchFilters,
) -> Result<Vec<SearchRow>, SearchError> {
    if !db_path.exists() {
        return Err(SearchError::DatabaseMissing {
            path: db_path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let engine = SearchEngine::new(&conn, sources)?;

    engine.search(filters).inspect_err(|e| {
        tracing::error!(error = ?e, "search failed");
    })
}

/// Ids of lookup values containing `text`
fn matching_ids(conn: &Connection, lookup: &str, text: &str) -> rusqlite::Result<Vec<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE value LIKE ?1 ESCAPE '\\' ORDER BY id",
        quote_ident(lookup)
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let ids = stmt
        .query_map([format!("%{}%", escape_like(text))], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Escape LIKE wildcards so `text` matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Column names of a table, in declaration order
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// (column, lookup table) for every foreign key that does not point at the primary table
fn lookup_references(conn: &Connection, table: &str, primary: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;
    let refs = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>("from")?, row.get::<_, String>("table")?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(refs.into_iter().filter(|(_, target)| target != primary).collect())
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sources::{ALL_SOURCES, CARS};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE lkp_marken (id INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT UNIQUE NOT NULL);
            CREATE TABLE lkp_typen (id INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT UNIQUE NOT NULL);
            INSERT INTO lkp_marken (value) VALUES ('HYUNDAI'), ('HYUNDAI MOTOR'), ('KIA');
            INSERT INTO lkp_typen (value) VALUES ('i30'), ('Ceed');
            CREATE TABLE cars (
                "tg_code" TEXT PRIMARY KEY,
                "col_04_marke_id" INTEGER,
                "col_04_typ_id" INTEGER,
                "typengenehmigung_erteilt" TEXT,
                FOREIGN KEY ("col_04_marke_id") REFERENCES "lkp_marken"(id),
                FOREIGN KEY ("col_04_typ_id") REFERENCES "lkp_typen"(id)
            );
            CREATE TABLE emissions (
                "tg_code" TEXT PRIMARY KEY,
                "marke_id" INTEGER,
                "co2" TEXT,
                FOREIGN KEY ("tg_code") REFERENCES "cars"("tg_code"),
                FOREIGN KEY ("marke_id") REFERENCES "lkp_marken"(id)
            );
            INSERT INTO cars VALUES ('1HA001', 1, 1, '20190315');
            INSERT INTO cars VALUES ('1HA002', 2, NULL, '20200101');
            INSERT INTO cars VALUES ('1KA001', 3, 2, '20190601');
            INSERT INTO emissions VALUES ('1HA001', 1, '128');
            "#,
        )
        .unwrap();
        conn
    }

    fn search(conn: &Connection, filters: SearchFilters) -> Vec<SearchRow> {
        SearchEngine::new(conn, ALL_SOURCES)
            .unwrap()
            .search(&filters)
            .unwrap()
    }

    #[test]
    fn test_search_by_code_joins_and_resolves() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                tg_code: Some("1HA001".into()),
                ..Default::default()
            },
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["cars_tg_code"], "1HA001");
        assert_eq!(row["cars_col_04_marke_id"], 1);
        assert_eq!(row["cars_col_04_marke_value"], "HYUNDAI");
        assert_eq!(row["cars_col_04_typ_value"], "i30");
        assert_eq!(row["emissions_co2"], "128");
        assert_eq!(row["emissions_marke_value"], "HYUNDAI");
    }

    #[test]
    fn test_null_id_has_no_value() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                tg_code: Some("1HA002".into()),
                ..Default::default()
            },
        );
        assert_eq!(rows[0]["cars_col_04_typ_id"], Value::Null);
        assert!(!rows[0].contains_key("cars_col_04_typ_value"));
        // no emissions row: joined columns are null
        assert_eq!(rows[0]["emissions_tg_code"], Value::Null);
    }

    #[test]
    fn test_brand_substring_matches_all_ids() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                brand: Some("HYUN".into()),
                ..Default::default()
            },
        );
        let codes: Vec<_> = rows.iter().map(|r| r["cars_tg_code"].clone()).collect();
        assert_eq!(codes, vec!["1HA001", "1HA002"]);
    }

    #[test]
    fn test_brand_without_match_is_empty() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                brand: Some("TESLA".into()),
                ..Default::default()
            },
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn test_brand_wildcards_match_literally() {
        let conn = setup();
        for brand in ["_", "%", "HYUNDAI_MOTOR", "\\"] {
            let rows = search(
                &conn,
                SearchFilters {
                    brand: Some(brand.into()),
                    ..Default::default()
                },
            );
            assert!(rows.is_empty(), "{:?} matched {} rows", brand, rows.len());
        }

        conn.execute("INSERT INTO lkp_marken (value) VALUES ('MINI_E')", [])
            .unwrap();
        conn.execute("INSERT INTO cars VALUES ('1ME001', 4, NULL, '20210101')", [])
            .unwrap();
        let rows = search(
            &conn,
            SearchFilters {
                brand: Some("I_E".into()),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["cars_tg_code"], "1ME001");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("AUDI"), "AUDI");
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn test_brand_text_overrides_id() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                brand: Some("KIA".into()),
                brand_id: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["cars_tg_code"], "1KA001");
    }

    #[test]
    fn test_filters_combine_with_and() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                brand: Some("HYUNDAI".into()),
                year: Some("2019".into()),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["cars_tg_code"], "1HA001");
    }

    #[test]
    fn test_model_filter() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                model: Some("Cee".into()),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["cars_col_04_typ_value"], "Ceed");
    }

    #[test]
    fn test_lookup_id_filter() {
        let conn = setup();
        let rows = search(
            &conn,
            SearchFilters {
                lookup_ids: vec![("col_04_typ_id".into(), 2)],
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);

        let err = SearchEngine::new(&conn, ALL_SOURCES)
            .unwrap()
            .search(&SearchFilters {
                lookup_ids: vec![("no_such_id".into(), 2)],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownColumn { .. }));
    }

    #[test]
    fn test_missing_dependent_table_not_joined() {
        let conn = setup();
        conn.execute_batch("DROP TABLE emissions").unwrap();
        let rows = search(&conn, SearchFilters::default());
        assert_eq!(rows.len(), 3);
        assert!(!rows[0].contains_key("emissions_co2"));
    }

    #[test]
    fn test_missing_primary_table_is_error() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SearchEngine::new(&conn, &[&CARS]).unwrap().search(&SearchFilters::default());
        assert!(matches!(result, Err(SearchError::Sqlite(_))));
    }

    #[test]
    fn test_no_primary_configured() {
        let conn = setup();
        let result = SearchEngine::new(&conn, &[]);
        assert!(matches!(result, Err(SearchError::NoPrimaryTable)));
    }

    #[test]
    fn test_missing_database_file() {
        let result = search_database(
            Path::new("/nonexistent/vehicles.db"),
            ALL_SOURCES,
            &SearchFilters::default(),
        );
        assert!(matches!(result, Err(SearchError::DatabaseMissing { .. })));
    }
}

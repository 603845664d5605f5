//! Header planning: raw header row -> destination columns and row transform plan

use std::collections::{HashMap, HashSet};

use super::sanitize::{is_unnamed, sanitize};
use crate::error::PlanError;
use crate::schema::{ColumnType, SourceTable, KEY_COLUMN_NAMES, STANDARDIZED_KEY_COLUMN};

/// How one retained source column is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Index of the field in the raw row
    pub source_index: usize,
    /// Final destination column name
    pub column: String,
    pub col_type: ColumnType,
    /// Lookup table the value resolves through, for normalized columns
    pub lookup_table: Option<&'static str>,
    pub is_key: bool,
}

impl ColumnPlan {
    pub fn is_normalized(&self) -> bool {
        self.lookup_table.is_some()
    }

    /// Column definition for CREATE TABLE
    pub fn definition(&self) -> String {
        let pk = if self.is_key { " PRIMARY KEY" } else { "" };
        format!("\"{}\" {}{}", self.column, self.col_type.sql(), pk)
    }
}

/// Foreign key from a normalized column to its lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupForeignKey {
    pub column: String,
    pub lookup_table: &'static str,
}

impl LookupForeignKey {
    pub fn clause(&self) -> String {
        format!(
            "FOREIGN KEY (\"{}\") REFERENCES \"{}\"(id)",
            self.column, self.lookup_table
        )
    }
}

/// Immutable per-file plan, built once from the header and reused for every row
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: &'static str,
    /// Number of fields in the header row
    pub width: usize,
    pub columns: Vec<ColumnPlan>,
    pub lookup_foreign_keys: Vec<LookupForeignKey>,
}

impl TablePlan {
    pub fn column_definitions(&self) -> Vec<String> {
        self.columns.iter().map(ColumnPlan::definition).collect()
    }

    pub fn insert_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column.as_str()).collect()
    }

    /// Position of the key column within the planned (output) columns
    pub fn key_position(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_key)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Find the key column by one of its accepted header spellings
pub fn find_key_column(header: &[String]) -> Option<usize> {
    header
        .iter()
        .position(|h| KEY_COLUMN_NAMES.contains(&h.trim()))
}

/// Deduplicate names in order: the first occurrence keeps its name, later
/// ones get `_1`, `_2`, ... skipping suffixes that are already taken.
pub fn dedupe_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut result = Vec::new();

    for name in names {
        let name = name.into();
        let final_name = if used.contains(&name) {
            let count = counts.entry(name.clone()).or_insert(0);
            loop {
                *count += 1;
                let candidate = format!("{}_{}", name, count);
                if !used.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            name
        };

        used.insert(final_name.clone());
        result.push(final_name);
    }

    result
}

/// Plan the destination columns for one source file.
///
/// Unnamed columns are dropped, the key column becomes `tg_code TEXT PRIMARY KEY`,
/// columns covered by a normalization rule become `<name>_id INTEGER` with a
/// foreign key to their lookup table, everything else is `TEXT`.
pub fn plan_columns(
    header: &[String],
    key_index: usize,
    source: &SourceTable,
) -> Result<TablePlan, PlanError> {
    if key_index >= header.len() {
        return Err(PlanError::KeyIndexOutOfRange {
            index: key_index,
            width: header.len(),
        });
    }

    // (source index, sanitized name, base destination name)
    let mut retained: Vec<(usize, String, String)> = Vec::new();

    for (idx, raw) in header.iter().enumerate() {
        let sanitized = sanitize(raw, idx);

        if is_unnamed(&sanitized) {
            tracing::debug!(raw = %raw, index = idx, "skipping unnamed column");
            continue;
        }

        let base = if idx == key_index {
            STANDARDIZED_KEY_COLUMN.to_string()
        } else if sanitized == STANDARDIZED_KEY_COLUMN {
            format!("{}_orig_idx_{}", STANDARDIZED_KEY_COLUMN, idx)
        } else {
            sanitized.clone()
        };

        retained.push((idx, sanitized, base));
    }

    let final_names = dedupe_names(retained.iter().map(|(_, _, base)| base.clone()));

    let mut columns = Vec::with_capacity(retained.len());
    let mut lookup_foreign_keys = Vec::new();

    for ((source_index, sanitized, _), name) in retained.into_iter().zip(final_names) {
        let is_key = source_index == key_index;
        let lookup_table = if is_key {
            None
        } else {
            source.lookup_for(&sanitized)
        };

        let column = match lookup_table {
            Some(lookup) => {
                let column = format!("{}_id", name);
                lookup_foreign_keys.push(LookupForeignKey {
                    column: column.clone(),
                    lookup_table: lookup,
                });
                column
            }
            None => name,
        };

        let col_type = if lookup_table.is_some() {
            ColumnType::Integer
        } else {
            ColumnType::Text
        };

        columns.push(ColumnPlan {
            source_index,
            column,
            col_type,
            lookup_table,
            is_key,
        });
    }

    let mut seen = HashSet::new();
    for col in &columns {
        if !seen.insert(col.column.as_str()) {
            return Err(PlanError::DuplicateColumn {
                table: source.name.to_string(),
                column: col.column.clone(),
            });
        }
    }

    Ok(TablePlan {
        table: source.name,
        width: header.len(),
        columns,
        lookup_foreign_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sources::{CARS, EMISSIONS};
    use crate::schema::{NormalizationRule, TableRole};

    static PLAIN: SourceTable = SourceTable {
        name: "plain",
        url: "https://example.invalid/plain.txt",
        local_name: "plain.txt",
        role: TableRole::Dependent,
        requires_fk_precheck: true,
        normalization: &[],
    };

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_duplicate_header_deduplicated() {
        let h = header(&["Typengenehmigungsnummer", "Marke", "Marke"]);
        let plan = plan_columns(&h, 0, &PLAIN).unwrap();
        assert_eq!(plan.insert_columns(), vec!["tg_code", "marke", "marke_1"]);
        assert_eq!(plan.width, 3);
    }

    #[test]
    fn test_normalized_duplicates_keep_suffix_before_id() {
        let h = header(&["Typengenehmigungsnummer", "Marke", "Marke"]);
        let plan = plan_columns(&h, 0, &EMISSIONS).unwrap();
        assert_eq!(plan.insert_columns(), vec!["tg_code", "marke_id", "marke_1_id"]);
        assert_eq!(plan.lookup_foreign_keys.len(), 2);
        assert!(plan.lookup_foreign_keys.iter().all(|fk| fk.lookup_table == "lkp_marken"));
    }

    #[test]
    fn test_key_column_definition() {
        let h = header(&["Marke", "TG-Code", "CO2"]);
        let plan = plan_columns(&h, 1, &EMISSIONS).unwrap();
        assert_eq!(plan.key_position(), Some(1));
        assert_eq!(plan.columns[1].definition(), "\"tg_code\" TEXT PRIMARY KEY");
        assert_eq!(plan.columns[0].definition(), "\"marke_id\" INTEGER");
        assert_eq!(plan.columns[2].definition(), "\"co2\" TEXT");
        assert_eq!(
            plan.lookup_foreign_keys[0].clause(),
            "FOREIGN KEY (\"marke_id\") REFERENCES \"lkp_marken\"(id)"
        );
    }

    #[test]
    fn test_non_key_named_like_key_is_renamed() {
        let h = header(&["Typengenehmigungsnummer", "TG Code", "Typ"]);
        let plan = plan_columns(&h, 0, &PLAIN).unwrap();
        assert_eq!(plan.insert_columns(), vec!["tg_code", "tg_code_orig_idx_1", "typ"]);
        assert_eq!(plan.columns.iter().filter(|c| c.is_key).count(), 1);
    }

    #[test]
    fn test_unnamed_columns_skipped() {
        let h = header(&["TG-Code", "", "Marke", "---"]);
        let plan = plan_columns(&h, 0, &PLAIN).unwrap();
        assert_eq!(plan.insert_columns(), vec!["tg_code", "marke"]);
        assert_eq!(plan.columns[1].source_index, 2);
        assert_eq!(plan.width, 4);
    }

    #[test]
    fn test_key_never_normalized() {
        static KEY_RULE: SourceTable = SourceTable {
            name: "odd",
            url: "https://example.invalid/odd.txt",
            local_name: "odd.txt",
            role: TableRole::Primary,
            requires_fk_precheck: false,
            normalization: &[NormalizationRule::new("tg_code", "lkp_codes")],
        };
        let h = header(&["TG-Code"]);
        let plan = plan_columns(&h, 0, &KEY_RULE).unwrap();
        assert!(!plan.columns[0].is_normalized());
        assert!(plan.lookup_foreign_keys.is_empty());
    }

    #[test]
    fn test_id_suffix_collision_is_rejected() {
        let h = header(&["TG-Code", "Marke", "Marke ID"]);
        let err = plan_columns(&h, 0, &EMISSIONS).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateColumn {
                table: "emissions".to_string(),
                column: "marke_id".to_string(),
            }
        );
    }

    #[test]
    fn test_cars_headers() {
        let h = header(&["TG-Code", "04 Marke", "04 Typ", "Typengenehmigung erteilt"]);
        let plan = plan_columns(&h, 0, &CARS).unwrap();
        assert_eq!(
            plan.insert_columns(),
            vec!["tg_code", "col_04_marke_id", "col_04_typ_id", "typengenehmigung_erteilt"]
        );
    }

    #[test]
    fn test_key_index_out_of_range() {
        let h = header(&["Marke"]);
        assert!(matches!(
            plan_columns(&h, 3, &PLAIN),
            Err(PlanError::KeyIndexOutOfRange { index: 3, width: 1 })
        ));
    }

    #[test]
    fn test_dedupe_names() {
        assert_eq!(
            dedupe_names(["a", "b", "a", "a", "b"]),
            vec!["a", "b", "a_1", "a_2", "b_1"]
        );
        // a pre-existing "a_1" pushes the generated suffix further
        assert_eq!(dedupe_names(["a", "a_1", "a"]), vec!["a", "a_1", "a_2"]);
    }

    #[test]
    fn test_find_key_column() {
        assert_eq!(find_key_column(&header(&["Marke", "TG-Code"])), Some(1));
        assert_eq!(find_key_column(&header(&["Typengenehmigungsnummer"])), Some(0));
        assert_eq!(find_key_column(&header(&["Marke", "Code"])), None);
    }
}

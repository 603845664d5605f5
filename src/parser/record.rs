use crate::error::ImportResult;

use super::header::TablePlan;

/// A single value ready for insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl SqlValue {
    pub fn bind_to(&self, idx: usize, stmt: &mut rusqlite::Statement) -> rusqlite::Result<()> {
        match self {
            SqlValue::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null)?,
            SqlValue::Integer(i) => stmt.raw_bind_parameter(idx, i)?,
            SqlValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
        }
        Ok(())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A transformed row, one value per planned column
pub type Row = Vec<SqlValue>;

/// Resolves a raw value to its lookup-table id
pub trait LookupResolver {
    /// `None` for absent values (null or empty) and for values that could
    /// not be stored
    fn resolve(&mut self, lookup_table: &str, value: Option<&str>) -> ImportResult<Option<i64>>;
}

impl<R: LookupResolver + ?Sized> LookupResolver for &mut R {
    fn resolve(&mut self, lookup_table: &str, value: Option<&str>) -> ImportResult<Option<i64>> {
        (**self).resolve(lookup_table, value)
    }
}

/// Per-file row counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// Data rows read from the file
    pub read: u64,
    /// Rows shorter than the header, padded with nulls
    pub padded: u64,
    /// Rows dropped because they could not be mapped onto the plan
    pub discarded: u64,
}

/// Lazy, one-pass transformation of raw rows through a [`TablePlan`]
pub struct TransformedRows<'p, I, R> {
    rows: I,
    plan: &'p TablePlan,
    resolver: R,
    counts: RowCounts,
}

/// Transform raw rows into insertable rows, resolving normalized columns
/// through `resolver`. Row order is preserved.
pub fn transform_rows<I, R>(rows: I, plan: &TablePlan, resolver: R) -> TransformedRows<'_, I, R>
where
    I: Iterator<Item = ImportResult<Vec<String>>>,
    R: LookupResolver,
{
    TransformedRows {
        rows,
        plan,
        resolver,
        counts: RowCounts::default(),
    }
}

impl<I, R> TransformedRows<'_, I, R>
where
    R: LookupResolver,
{
    pub fn counts(&self) -> RowCounts {
        self.counts
    }

    fn transform(&mut self, raw: Vec<String>) -> ImportResult<Option<Row>> {
        // header is line 1
        let line = self.counts.read + 1;
        let width = self.plan.width;
        let mut fields: Vec<Option<String>> = raw.into_iter().map(Some).collect();

        if fields.len() > width {
            tracing::warn!(
                table = self.plan.table,
                line,
                expected = width,
                found = fields.len(),
                "skipping row with too many fields"
            );
            self.counts.discarded += 1;
            return Ok(None);
        }
        if fields.len() < width {
            tracing::debug!(
                table = self.plan.table,
                line,
                missing = width - fields.len(),
                "padding short row"
            );
            fields.resize(width, None);
            self.counts.padded += 1;
        }

        let mut row = Vec::with_capacity(self.plan.columns.len());
        for col in &self.plan.columns {
            let Some(field) = fields.get(col.source_index) else {
                tracing::error!(
                    table = self.plan.table,
                    line,
                    index = col.source_index,
                    "field index out of bounds, skipping row"
                );
                self.counts.discarded += 1;
                return Ok(None);
            };

            let value = match col.lookup_table {
                Some(lookup) => self
                    .resolver
                    .resolve(lookup, field.as_deref())?
                    .map(SqlValue::Integer)
                    .unwrap_or(SqlValue::Null),
                None => field
                    .clone()
                    .map(SqlValue::Text)
                    .unwrap_or(SqlValue::Null),
            };
            row.push(value);
        }

        Ok(Some(row))
    }
}

impl<I, R> Iterator for TransformedRows<'_, I, R>
where
    I: Iterator<Item = ImportResult<Vec<String>>>,
    R: LookupResolver,
{
    type Item = ImportResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.rows.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            self.counts.read += 1;

            match self.transform(raw) {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::header::plan_columns;
    use crate::schema::{NormalizationRule, SourceTable, TableRole};
    use std::collections::HashMap;

    static TEST_TABLE: SourceTable = SourceTable {
        name: "test",
        url: "https://example.invalid/test.txt",
        local_name: "test.txt",
        role: TableRole::Primary,
        requires_fk_precheck: false,
        normalization: &[
            NormalizationRule::new("marke", "lkp_marken"),
            NormalizationRule::new("typ", "lkp_typen"),
        ],
    };

    /// In-memory resolver handing out sequential ids per table
    #[derive(Default)]
    struct FakeResolver {
        ids: HashMap<(String, String), i64>,
        calls: usize,
    }

    impl LookupResolver for FakeResolver {
        fn resolve(&mut self, table: &str, value: Option<&str>) -> ImportResult<Option<i64>> {
            self.calls += 1;
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                return Ok(None);
            };
            let next = self.ids.len() as i64 + 1;
            Ok(Some(
                *self
                    .ids
                    .entry((table.to_string(), value.to_string()))
                    .or_insert(next),
            ))
        }
    }

    fn raw(rows: &[&[&str]]) -> Vec<ImportResult<Vec<String>>> {
        rows.iter()
            .map(|r| Ok(r.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn plan(cols: &[&str]) -> TablePlan {
        let header: Vec<String> = cols.iter().map(|s| s.to_string()).collect();
        plan_columns(&header, 0, &TEST_TABLE).unwrap()
    }

    #[test]
    fn test_normalized_values_resolved() {
        let plan = plan(&["TG-Code", "Marke", "Typ"]);
        let mut resolver = FakeResolver::default();
        let input = raw(&[&["ABC123", "HYUNDAI", ""]]);

        let rows: Vec<Row> = transform_rows(input.into_iter(), &plan, &mut resolver)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![vec![
                SqlValue::Text("ABC123".into()),
                SqlValue::Integer(1),
                SqlValue::Null,
            ]]
        );
    }

    #[test]
    fn test_plain_empty_text_kept() {
        let plan = plan(&["TG-Code", "Hubraum"]);
        let mut resolver = FakeResolver::default();
        let input = raw(&[&["A1", ""]]);

        let rows: Vec<Row> = transform_rows(input.into_iter(), &plan, &mut resolver)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows[0][1], SqlValue::Text(String::new()));
        assert_eq!(resolver.calls, 0);
    }

    #[test]
    fn test_short_row_padded_long_row_discarded() {
        let plan = plan(&["TG-Code", "Marke", "Hubraum", "Leistung"]);
        let mut resolver = FakeResolver::default();
        let input = raw(&[
            &["A1", "AUDI"],
            &["B2", "BMW", "1998", "135", "x", "y"],
            &["C3", "CUPRA", "1984", "150"],
        ]);

        let mut rows = transform_rows(input.into_iter(), &plan, &mut resolver);
        let out: Vec<Row> = rows.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0], SqlValue::Text("A1".into()));
        assert_eq!(out[0][2], SqlValue::Null);
        assert_eq!(out[0][3], SqlValue::Null);
        assert_eq!(out[1][0], SqlValue::Text("C3".into()));
        assert_eq!(
            rows.counts(),
            RowCounts {
                read: 3,
                padded: 1,
                discarded: 1,
            }
        );
    }

    #[test]
    fn test_corrupt_plan_width_discards_row() {
        let mut plan = plan(&["TG-Code", "Marke"]);
        plan.width = 1;
        let mut resolver = FakeResolver::default();
        let input = raw(&[&["A1"]]);

        let mut rows = transform_rows(input.into_iter(), &plan, &mut resolver);
        assert!(rows.next().is_none());
        assert_eq!(rows.counts().discarded, 1);
    }

    #[test]
    fn test_same_value_same_id() {
        let plan = plan(&["TG-Code", "Marke"]);
        let mut resolver = FakeResolver::default();
        let input = raw(&[&["A1", "AUDI"], &["A2", "BMW"], &["A3", "AUDI"]]);

        let rows: Vec<Row> = transform_rows(input.into_iter(), &plan, &mut resolver)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows[0][1], rows[2][1]);
        assert_ne!(rows[0][1], rows[1][1]);
    }
}

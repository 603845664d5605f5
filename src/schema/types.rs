use std::collections::HashSet;

/// Header spellings that identify the type-approval code column
pub const KEY_COLUMN_NAMES: &[&str] = &["TG-Code", "Typengenehmigungsnummer"];

/// Name of the key column in every main table
pub const STANDARDIZED_KEY_COLUMN: &str = "tg_code";

/// Storage type of a planned column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Role of a source table in the load order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// Owns the type-approval code as its primary key
    Primary,
    /// Extends primary rows, keyed by the same code
    Dependent,
}

/// Maps a sanitized source column name to the lookup table its values go through
#[derive(Debug, Clone)]
pub struct NormalizationRule {
    pub column: &'static str,
    pub lookup_table: &'static str,
}

impl NormalizationRule {
    pub const fn new(column: &'static str, lookup_table: &'static str) -> Self {
        Self {
            column,
            lookup_table,
        }
    }
}

/// One configured source file and the table it loads into
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub name: &'static str,
    pub url: &'static str,
    pub local_name: &'static str,
    pub role: TableRole,
    /// Insert row by row, checking the key exists in the primary table first
    pub requires_fk_precheck: bool,
    pub normalization: &'static [NormalizationRule],
}

impl SourceTable {
    pub fn is_primary(&self) -> bool {
        self.role == TableRole::Primary
    }

    /// Lookup table configured for a sanitized column name, if any
    pub fn lookup_for(&self, sanitized: &str) -> Option<&'static str> {
        self.normalization
            .iter()
            .find(|rule| rule.column == sanitized)
            .map(|rule| rule.lookup_table)
    }

    /// Get all lookup tables this table references
    pub fn lookup_tables(&self) -> HashSet<&'static str> {
        self.normalization.iter().map(|r| r.lookup_table).collect()
    }
}

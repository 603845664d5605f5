//! Error types for the import pipeline and the search path.
//!
//! Row-level conditions are not errors; they are counted in
//! [`LoadStats`](crate::writer::LoadStats). Only file- and run-level
//! conditions surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while planning the destination columns of one file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Two retained columns ended up with the same destination name.
    #[error("duplicate destination column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// The key column index does not point into the header.
    #[error("key column index {index} is outside a header of {width} columns")]
    KeyIndexOutOfRange { index: usize, width: usize },

    /// A plan handed to the loader carries no key column.
    #[error("table '{table}' has no key column in its plan")]
    NoKeyColumn { table: String },
}

/// Errors that can occur while importing the source files.
#[derive(Debug, Error)]
pub enum ImportError {
    // === Run-level ===
    /// No configured source is marked as the primary-key table.
    #[error("no source table is marked as the primary-key source")]
    NoPrimaryTable,

    /// More than one configured source claims to be the primary-key table.
    #[error("more than one primary-key source configured: {tables:?}")]
    MultiplePrimaryTables { tables: Vec<&'static str> },

    /// Another import holds the lock for this database.
    #[error("another import is running (lock file {path} exists)")]
    Locked { path: PathBuf },

    /// The lock file could not be created.
    #[error("failed to create lock file {path}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source dependency graph contains a cycle.
    #[error("dependency cycle between source tables: {detail}")]
    DependencyCycle { detail: String },

    // === File-level ===
    /// The source file does not exist locally.
    #[error("source file not found: {path}")]
    SourceMissing { path: PathBuf },

    /// The file has no header row.
    #[error("source file is empty: {path}")]
    EmptySource { path: PathBuf },

    /// None of the accepted key-column spellings is present in the header.
    #[error("key column not found in {path}; expected one of {expected:?}")]
    KeyColumnMissing {
        path: PathBuf,
        expected: &'static [&'static str],
    },

    /// Every header column was skipped, nothing to import.
    #[error("no importable columns in {path}")]
    EmptyPlan { path: PathBuf },

    /// Header planning failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Failed to read a source file.
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed delimited data.
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Storage engine failure.
    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors returned by the search path. A failed search never yields rows.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The database file does not exist.
    #[error("database not found: {path}")]
    DatabaseMissing { path: PathBuf },

    /// No configured source is marked as the primary-key table.
    #[error("no source table is marked as the primary-key source")]
    NoPrimaryTable,

    /// An exact-id filter named a column the primary table does not have.
    #[error("unknown lookup column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Query execution failed.
    #[error("search query failed")]
    Sqlite(#[from] rusqlite::Error),
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;

//! Import orchestration: ordered, per-file loading of all configured sources

use serde::Serialize;
use std::error::Error as _;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::lookup::{LookupCache, LookupIds};
use super::sqlite::{create_table, insert_bulk, insert_with_fk_precheck, LoadStats, SqliteWriter};
use crate::error::{ImportError, ImportResult};
use crate::parser::{find_key_column, plan_columns, transform_rows, DelimitedFile};
use crate::schema::{lookup_table_names, primary_source, resolve_load_order, SourceTable, KEY_COLUMN_NAMES};
use crate::ui::{Phase, Ui};

/// Progress of one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportState {
    NotStarted,
    LookupTablesReady,
    PrimaryTableLoaded,
    DependentTablesLoaded,
    Done,
    Failed,
}

/// What happened to one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Loaded,
    /// Recoverable: the file could not be used, the run continued
    Skipped { reason: String },
    /// The file was aborted part-way; its transaction was rolled back
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub table: &'static str,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
    pub stats: LoadStats,
}

impl FileReport {
    /// One-line human summary
    pub fn summary(&self) -> String {
        match &self.outcome {
            FileOutcome::Loaded => format!(
                "{}: {} inserted, {} key-skipped, {} duplicate, {} discarded",
                self.table,
                self.stats.inserted,
                self.stats.fk_skipped,
                self.stats.pk_ignored,
                self.stats.discarded
            ),
            FileOutcome::Skipped { reason } => format!("{}: skipped ({})", self.table, reason),
            FileOutcome::Failed { reason } => format!("{}: FAILED ({})", self.table, reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub state: ImportState,
    pub files: Vec<FileReport>,
}

impl ImportReport {
    pub fn file(&self, table: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.table == table)
    }

    pub fn total_inserted(&self) -> u64 {
        self.files.iter().map(|f| f.stats.inserted).sum()
    }
}

/// Runs the import of a set of sources into one database.
///
/// Owns the lookup-id cache for the run, so a value seen in several files
/// resolves to the same id without re-querying.
pub struct Importer<'a> {
    sources: Vec<&'a SourceTable>,
    data_dir: PathBuf,
    state: ImportState,
    history: Vec<ImportState>,
    cache: LookupCache,
}

impl<'a> Importer<'a> {
    pub fn new(sources: &[&'a SourceTable], data_dir: &Path) -> Self {
        Self {
            sources: sources.to_vec(),
            data_dir: data_dir.to_path_buf(),
            state: ImportState::NotStarted,
            history: Vec::new(),
            cache: LookupCache::new(),
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Every state entered by the last run, in order
    pub fn history(&self) -> &[ImportState] {
        &self.history
    }

    fn advance(&mut self, state: ImportState) {
        tracing::debug!(?state, "import state");
        self.state = state;
        self.history.push(state);
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Drop and recreate every table, then load all files, primary first.
    ///
    /// Only run-level problems are returned as errors; file-level problems
    /// are recorded in the report.
    pub fn run(&mut self, writer: &mut SqliteWriter, ui: &mut impl Ui) -> ImportResult<ImportReport> {
        self.history.clear();
        let order = match resolve_load_order(&self.sources) {
            Ok(order) => order,
            Err(e) => {
                self.advance(ImportState::Failed);
                return Err(e);
            }
        };
        let primary = primary_source(&order)?.name;

        ui.set_phase(Phase::Preparing);
        if let Err(e) = self.prepare(writer, &order) {
            self.advance(ImportState::Failed);
            return Err(e);
        }
        self.advance(ImportState::LookupTablesReady);
        ui.log("Lookup tables ready");

        ui.set_phase(Phase::Importing);
        let mut files = Vec::with_capacity(order.len());
        let mut cancelled = false;
        for source in &order {
            cancelled = cancelled || ui.cancelled();
            let report = if cancelled {
                tracing::warn!(table = source.name, "run cancelled, file not imported");
                FileReport {
                    table: source.name,
                    path: self.data_dir.join(source.local_name),
                    outcome: FileOutcome::Skipped {
                        reason: "cancelled".to_string(),
                    },
                    stats: LoadStats::default(),
                }
            } else {
                self.import_file(writer, source, primary, ui)
            };
            ui.file_done(&report);

            if source.is_primary() && report.outcome == FileOutcome::Loaded {
                self.advance(ImportState::PrimaryTableLoaded);
            }
            files.push(report);
        }
        self.advance(ImportState::DependentTablesLoaded);

        ui.clear_progress();
        self.advance(ImportState::Done);

        Ok(ImportReport {
            state: self.state,
            files,
        })
    }

    fn prepare(&mut self, writer: &SqliteWriter, order: &[&SourceTable]) -> ImportResult<()> {
        let lookups = lookup_table_names(order);

        writer.drop_all_tables()?;
        writer.create_lookup_tables(&lookups)?;
        // ids from an earlier run are gone with the dropped tables
        self.cache.clear();
        Ok(())
    }

    fn import_file(
        &mut self,
        writer: &mut SqliteWriter,
        source: &SourceTable,
        primary: &str,
        ui: &mut impl Ui,
    ) -> FileReport {
        let path = self.data_dir.join(source.local_name);
        let span = tracing::info_span!("import", table = source.name);
        let _enter = span.enter();

        tracing::info!(path = %path.display(), "processing file");
        ui.set_info(format!("{} <- {}", source.name, source.local_name));

        let mut stats = LoadStats::default();
        let outcome = match self.load_file(writer, source, primary, &path, &mut stats, ui) {
            Ok(()) => FileOutcome::Loaded,
            Err(e) if is_skip(&e) => {
                let reason = error_chain(&e);
                tracing::warn!(%reason, "skipping file");
                FileOutcome::Skipped { reason }
            }
            Err(e) => {
                let reason = error_chain(&e);
                tracing::error!(%reason, "import failed for file");
                // rolled-back lookup rows may still be cached
                self.cache.clear();
                FileOutcome::Failed { reason }
            }
        };

        FileReport {
            table: source.name,
            path,
            outcome,
            stats,
        }
    }

    fn load_file(
        &mut self,
        writer: &mut SqliteWriter,
        source: &SourceTable,
        primary: &str,
        path: &Path,
        stats: &mut LoadStats,
        ui: &mut impl Ui,
    ) -> ImportResult<()> {
        let file = DelimitedFile::open(path)?;

        let key_index = find_key_column(file.header()).ok_or_else(|| ImportError::KeyColumnMissing {
            path: path.to_path_buf(),
            expected: KEY_COLUMN_NAMES,
        })?;

        let plan = plan_columns(file.header(), key_index, source)?;
        if plan.is_empty() {
            return Err(ImportError::EmptyPlan {
                path: path.to_path_buf(),
            });
        }

        let total = file.data_lines();
        let references = (!source.is_primary()).then_some(primary);

        let tx = writer.transaction()?;
        create_table(&tx, &plan, references)?;

        let resolver = LookupIds::new(&tx, &mut self.cache);
        let mut rows = transform_rows(file.into_rows(), &plan, resolver);

        if source.requires_fk_precheck {
            insert_with_fk_precheck(&tx, &plan, primary, rows.by_ref(), total, stats, ui)?;
        } else {
            insert_bulk(&tx, &plan, rows.by_ref(), total, stats, ui)?;
        }
        stats.add_row_counts(rows.counts());
        drop(rows);

        tx.commit()?;
        Ok(())
    }
}

/// File-level conditions that mean "nothing to import" rather than a failure
fn is_skip(err: &ImportError) -> bool {
    matches!(
        err,
        ImportError::SourceMissing { .. }
            | ImportError::EmptySource { .. }
            | ImportError::KeyColumnMissing { .. }
            | ImportError::EmptyPlan { .. }
    )
}

/// Error message followed by each of its causes
fn error_chain(err: &ImportError) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        message.push_str(": ");
        message.push_str(&e.to_string());
        cause = e.source();
    }
    message
}

/// Exclusive lock held for the duration of an import
pub struct ImportLock {
    path: PathBuf,
    _file: File,
}

impl ImportLock {
    /// Create `<db>.lock`, and the database directory if it does not exist yet
    pub fn acquire(db_path: &Path) -> ImportResult<Self> {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ImportError::LockFile {
                path: path.clone(),
                source: e,
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => Ok(Self { path, _file: file }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(ImportError::Locked { path }),
            Err(e) => Err(ImportError::LockFile { path, source: e }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ImportLock {
    fn drop(&mut self) {
        fs::remove_file(&self.path).ok();
    }
}

/// Import all `sources` found in `data_dir` into the database at `db_path`
pub fn run_import(
    db_path: &Path,
    data_dir: &Path,
    sources: &[&SourceTable],
    ui: &mut impl Ui,
) -> anyhow::Result<ImportReport> {
    // structural problems abort before the database is touched
    resolve_load_order(sources)?;

    let _lock = ImportLock::acquire(db_path)?;
    let mut writer = SqliteWriter::open(db_path)?;

    let mut importer = Importer::new(sources, data_dir);
    let report = importer.run(&mut writer, ui)?;

    writer.finalize()?;
    Ok(report)
}

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use vehicle_tg_to_sqlite::{
    cli::{Cli, Commands, DatabaseArgs},
    download::{default_database_path, ensure_sources_downloaded, CacheManager, DownloadSummary},
    logging::{init_logging, LogConfig},
    schema::{lookup_table_names, ALL_SOURCES},
    search::{search_database, SearchFilters, SearchRow},
    writer::{count_rows, run_import, table_exists, FileOutcome, ImportReport},
    LogUi, Ui, UiApp,
};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let tui = matches!(
        cli.command,
        Commands::Sync { tui: true, .. } | Commands::Import { tui: true, .. }
    );
    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_console(!tui)
        .with_log_file(cli.log_file.clone());
    init_logging(&log_config).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Sync {
            db,
            data,
            force,
            tui,
        } => {
            let start = Instant::now();
            let db_path = database_path(db)?;
            let report = import_with_ui(tui, &db_path, data.data_dir, Some(force))?;
            print_report(&report, &db_path, start);
        }

        Commands::Download { data, force } => {
            let (dir, summary) =
                ensure_sources_downloaded(data.data_dir, ALL_SOURCES, force, &mut LogUi::new())?;
            print_download_summary(&summary);
            println!("Source files in {:?}", dir);
            if !summary.failed.is_empty() {
                bail!("{} download(s) failed", summary.failed.len());
            }
        }

        Commands::Import {
            db,
            data,
            tui,
            json,
        } => {
            let start = Instant::now();
            let db_path = database_path(db)?;
            let report = import_with_ui(tui, &db_path, data.data_dir, None)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &db_path, start);
            }
        }

        Commands::Search { db, filters, json } => {
            let db_path = database_path(db)?;
            let filters = SearchFilters::from(filters);
            let rows = search_database(&db_path, ALL_SOURCES, &filters)
                .with_context(|| format!("Search in {:?} failed", db_path))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_search_summary(&rows);
            }
        }

        Commands::ListTables => {
            println!("Configured tables:\n");
            for source in ALL_SOURCES {
                let role = if source.is_primary() { "primary" } else { "dependent" };
                println!("  {} ({}, from {})", source.name, role, source.local_name);
                let mut lookups: Vec<_> = source.lookup_tables().into_iter().collect();
                lookups.sort_unstable();
                for lookup in lookups {
                    println!("      -> {}", lookup);
                }
            }
            println!("\n{} lookup tables", lookup_table_names(ALL_SOURCES).len());
        }

        Commands::Stats { db } => {
            let db_path = database_path(db)?;
            if !db_path.exists() {
                bail!("Database {:?} does not exist", db_path);
            }
            let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .with_context(|| format!("Failed to open database {:?}", db_path))?;

            println!("{:?}\n", db_path);
            let tables = ALL_SOURCES
                .iter()
                .map(|s| s.name)
                .chain(lookup_table_names(ALL_SOURCES));
            for table in tables {
                if table_exists(&conn, table)? {
                    println!("  {:<36} {:>10}", table, count_rows(&conn, table)?);
                } else {
                    println!("  {:<36} {:>10}", table, "missing");
                }
            }
        }
    }

    Ok(())
}

fn database_path(args: DatabaseArgs) -> Result<PathBuf> {
    match args.database {
        Some(path) => Ok(path),
        None => default_database_path(),
    }
}

/// Run an import, optionally downloading first, with the chosen front end
fn import_with_ui(
    tui: bool,
    db_path: &Path,
    data_dir: Option<PathBuf>,
    download: Option<bool>,
) -> Result<ImportReport> {
    if !tui {
        return import_job(&mut LogUi::new(), db_path, data_dir, download);
    }

    let mut ui = UiApp::new()?;
    match import_job(&mut ui, db_path, data_dir, download) {
        Ok(report) => {
            ui.finish(&format!("Done: {} rows inserted", report.total_inserted()))?;
            Ok(report)
        }
        Err(e) => {
            ui.restore()?;
            Err(e)
        }
    }
}

/// `download` carries the force flag when source files should be fetched first
fn import_job(
    ui: &mut impl Ui,
    db_path: &Path,
    data_dir: Option<PathBuf>,
    download: Option<bool>,
) -> Result<ImportReport> {
    let data_dir = match download {
        Some(force) => {
            let (dir, summary) = ensure_sources_downloaded(data_dir, ALL_SOURCES, force, ui)?;
            for (table, reason) in &summary.failed {
                ui.log(format!("{}: download failed, continuing without it ({})", table, reason));
            }
            dir
        }
        None => CacheManager::new(data_dir)?.data_dir().to_path_buf(),
    };

    run_import(db_path, &data_dir, ALL_SOURCES, ui)
}

fn print_report(report: &ImportReport, db_path: &Path, start: Instant) {
    println!();
    for file in &report.files {
        println!("  {}", file.summary());
    }

    let failed = report
        .files
        .iter()
        .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
        .count();

    println!(
        "\nImported {} rows into {:?} in {:.1}s{}",
        report.total_inserted(),
        db_path,
        start.elapsed().as_secs_f64(),
        if failed > 0 {
            format!(" ({} file(s) failed)", failed)
        } else {
            String::new()
        }
    );
}

fn print_download_summary(summary: &DownloadSummary) {
    for table in &summary.downloaded {
        println!("  {}: downloaded", table);
    }
    for table in &summary.cached {
        println!("  {}: already present", table);
    }
    for (table, reason) in &summary.failed {
        println!("  {}: FAILED ({})", table, reason);
    }
}

fn print_search_summary(rows: &[SearchRow]) {
    for row in rows {
        println!(
            "{:<10} {:<24} {:<32} {}",
            field(row, "cars_tg_code"),
            field(row, "cars_col_04_marke_value"),
            field(row, "cars_col_04_typ_value"),
            field(row, "cars_typengenehmigung_erteilt"),
        );
    }
    println!("\n{} row(s)", rows.len());
}

fn field(row: &SearchRow, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}


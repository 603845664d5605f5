use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::search::SearchFilters;

#[derive(Parser, Debug)]
#[command(name = "vehicle-tg-to-sqlite")]
#[command(version, about = "Import Swiss vehicle type-approval data into SQLite")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write log events to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Database location shared by every command that touches it
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// SQLite database path [default: platform data directory]
    #[arg(short, long, env = "VEHICLE_TG_DATABASE")]
    pub database: Option<PathBuf>,
}

/// Directory holding the downloaded source files
#[derive(Args, Debug, Clone)]
pub struct DataDirArgs {
    /// Source file directory [default: platform cache directory]
    #[arg(long, env = "VEHICLE_TG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download missing source files, then import everything
    Sync {
        #[command(flatten)]
        db: DatabaseArgs,

        #[command(flatten)]
        data: DataDirArgs,

        /// Re-download files even if present
        #[arg(short, long)]
        force: bool,

        /// Show the full-screen progress interface
        #[arg(long)]
        tui: bool,
    },

    /// Download the source files only
    Download {
        #[command(flatten)]
        data: DataDirArgs,

        /// Re-download files even if present
        #[arg(short, long)]
        force: bool,
    },

    /// Import source files already present in the data directory
    Import {
        #[command(flatten)]
        db: DatabaseArgs,

        #[command(flatten)]
        data: DataDirArgs,

        /// Show the full-screen progress interface
        #[arg(long)]
        tui: bool,

        /// Print the import report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the imported data
    Search {
        #[command(flatten)]
        db: DatabaseArgs,

        #[command(flatten)]
        filters: SearchArgs,

        /// Print full rows as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List the configured tables and their lookup tables
    ListTables,

    /// Row counts of an existing database
    Stats {
        #[command(flatten)]
        db: DatabaseArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Exact type-approval code
    #[arg(long)]
    pub tg_code: Option<String>,

    /// Brand substring (case-insensitive)
    #[arg(long)]
    pub brand: Option<String>,

    /// Model substring (case-insensitive)
    #[arg(long)]
    pub model: Option<String>,

    /// Approval year (YYYY)
    #[arg(long, value_parser = parse_year)]
    pub year: Option<String>,

    /// Exact brand lookup id
    #[arg(long)]
    pub brand_id: Option<i64>,

    /// Exact model lookup id
    #[arg(long)]
    pub model_id: Option<i64>,

    /// Exact id on another lookup column of the primary table, as COLUMN=ID
    #[arg(long = "lookup", value_parser = parse_lookup_id)]
    pub lookup_ids: Vec<(String, i64)>,
}

impl From<SearchArgs> for SearchFilters {
    fn from(args: SearchArgs) -> Self {
        SearchFilters {
            tg_code: args.tg_code,
            brand: args.brand,
            model: args.model,
            year: args.year,
            brand_id: args.brand_id,
            model_id: args.model_id,
            lookup_ids: args.lookup_ids,
        }
    }
}

fn parse_year(s: &str) -> Result<String, String> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        Ok(s.to_string())
    } else {
        Err(format!("expected a four-digit year, got '{}'", s))
    }
}

fn parse_lookup_id(s: &str) -> Result<(String, i64), String> {
    let (column, id) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=ID, got '{}'", s))?;
    let id = id
        .trim()
        .parse()
        .map_err(|e| format!("invalid id '{}': {}", id, e))?;
    Ok((column.trim().to_string(), id))
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

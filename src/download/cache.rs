use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

use crate::schema::SourceTable;

const DATABASE_FILE: &str = "vehicles.db";

/// Resolves where source files are cached and where the database lives
pub struct CacheManager {
    data_dir: PathBuf,
}

impl CacheManager {
    /// Use `custom_dir` for source files, or the platform cache directory
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => project_dirs()?.cache_dir().join("sources"),
        };

        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        Ok(Self { data_dir })
    }

    /// Directory holding the downloaded source files
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Local path of one source file
    pub fn source_path(&self, source: &SourceTable) -> PathBuf {
        self.data_dir.join(source.local_name)
    }

    /// Whether a non-empty copy of the source file is present
    pub fn is_cached(&self, source: &SourceTable) -> bool {
        fs::metadata(self.source_path(source))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

/// Default database location in the platform data directory
pub fn default_database_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join(DATABASE_FILE))
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "vehicle-tg-to-sqlite").context("Could not determine home directory")
}

pub mod cache;
pub mod client;

pub use cache::*;
pub use client::*;

use anyhow::Result;
use std::path::PathBuf;

use crate::schema::SourceTable;
use crate::ui::{Phase, Ui};

/// Outcome of fetching the configured sources
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub downloaded: Vec<&'static str>,
    pub cached: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

/// Make sure every source file is present in the data directory.
///
/// Existing files are kept unless `force` is set. A failed download is
/// logged and recorded; the file stays missing and the import skips it.
pub fn ensure_sources_downloaded(
    data_dir: Option<PathBuf>,
    sources: &[&'static SourceTable],
    force: bool,
    ui: &mut impl Ui,
) -> Result<(PathBuf, DownloadSummary)> {
    let cache = CacheManager::new(data_dir)?;
    let mut summary = DownloadSummary::default();

    let pending: Vec<&'static SourceTable> = sources
        .iter()
        .copied()
        .filter(|source| {
            let cached = !force && cache.is_cached(source);
            if cached {
                tracing::info!(file = source.local_name, "using cached source file");
                summary.cached.push(source.name);
            }
            !cached
        })
        .collect();

    if pending.is_empty() {
        return Ok((cache.data_dir().to_path_buf(), summary));
    }

    ui.set_phase(Phase::Downloading);
    let client = SourceClient::new()?;

    for source in pending {
        let dest = cache.source_path(source);
        ui.set_info(format!("{} <- {}", source.local_name, source.url));
        tracing::info!(url = source.url, dest = %dest.display(), "downloading");

        match client.download(source, &dest, ui) {
            Ok(bytes) => {
                ui.log(format!("Downloaded {} ({} bytes)", source.local_name, bytes));
                summary.downloaded.push(source.name);
            }
            Err(e) => {
                tracing::error!(file = source.local_name, error = %format!("{:#}", e), "download failed");
                ui.log(format!("Download of {} failed: {:#}", source.local_name, e));
                summary.failed.push((source.name, format!("{:#}", e)));
            }
        }
    }
    ui.clear_progress();

    Ok((cache.data_dir().to_path_buf(), summary))
}

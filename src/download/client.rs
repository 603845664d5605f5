use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::schema::SourceTable;
use crate::ui::Ui;

/// HTTP client for the open-data file server
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vehicle-tg-to-sqlite/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Download one source file to `dest`, via `<dest>.part` renamed on success
    pub fn download(&self, source: &SourceTable, dest: &Path, ui: &mut impl Ui) -> Result<u64> {
        let mut response = self
            .client
            .get(source.url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch {}", source.url))?;

        let total = response.content_length().unwrap_or(0);
        let partial = partial_path(dest);
        let file = File::create(&partial)
            .with_context(|| format!("Failed to create {:?}", partial))?;

        let mut writer = ProgressWriter {
            inner: BufWriter::new(file),
            written: 0,
            total,
            name: source.local_name,
            ui,
        };
        io::copy(&mut response, &mut writer)
            .with_context(|| format!("Failed to download {}", source.url))?;
        writer.flush()?;
        let written = writer.written;
        drop(writer);

        fs::rename(&partial, dest).with_context(|| format!("Failed to move download to {:?}", dest))?;
        Ok(written)
    }
}

/// Counts bytes passing through and reports them to the UI
struct ProgressWriter<'u, W, U> {
    inner: W,
    written: u64,
    total: u64,
    name: &'static str,
    ui: &'u mut U,
}

impl<W: Write, U: Ui> Write for ProgressWriter<'_, W, U> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        self.ui.set_progress(
            self.written,
            self.total,
            format!("{} {}", self.name, format_bytes(self.written, self.total)),
        );
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Format bytes as human-readable string
fn format_bytes(current: u64, total: u64) -> String {
    fn fmt(bytes: u64) -> String {
        if bytes >= 1_000_000 {
            format!("{:.1} MB", bytes as f64 / 1_000_000.0)
        } else if bytes >= 1_000 {
            format!("{:.1} KB", bytes as f64 / 1_000.0)
        } else {
            format!("{} B", bytes)
        }
    }
    if total == 0 {
        fmt(current)
    } else {
        format!("{} / {}", fmt(current), fmt(total))
    }
}

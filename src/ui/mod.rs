//! Progress reporting for downloads and imports
//!
//! Three implementations of [`Ui`]:
//! - [`UiApp`]: full-screen ratatui interface (phase, progress, per-table outcomes, activity)
//! - [`LogUi`]: forwards everything to `tracing`
//! - [`SilentUi`]: discards everything, for tests

mod components;

use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crate::writer::FileReport;
use components::{LogPanel, ProgressPanel, StatusPanel, TablesPanel};

/// Application phases shown in the status panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Downloading,
    Preparing,
    Importing,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Downloading => write!(f, "Downloading source files"),
            Phase::Preparing => write!(f, "Preparing lookup tables"),
            Phase::Importing => write!(f, "Importing into SQLite"),
            Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress information for the current operation
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub label: String,
}

impl Progress {
    pub fn new(current: u64, total: u64, label: impl Into<String>) -> Self {
        Self {
            current,
            total,
            label: label.into(),
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    /// Whole percent, capped at 100
    pub fn percent(&self) -> u64 {
        (self.ratio().min(1.0) * 100.0) as u64
    }
}

/// Sink for progress of a download or import run
pub trait Ui {
    fn set_phase(&mut self, phase: Phase);
    fn set_info(&mut self, info: impl Into<String>);
    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>);
    fn clear_progress(&mut self);
    fn log(&mut self, message: impl Into<String>);

    /// One source file has been processed
    fn file_done(&mut self, report: &FileReport) {
        self.log(report.summary());
    }

    /// Whether the user asked to stop; checked between files
    fn cancelled(&mut self) -> bool {
        false
    }
}

/// Minimum time between two redraws triggered by progress updates
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Raw mode plus alternate screen, undone on drop
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        terminal::disable_raw_mode().ok();
        self.terminal.backend_mut().execute(LeaveAlternateScreen).ok();
        self.terminal.show_cursor().ok();
    }
}

/// Full-screen terminal UI
pub struct UiApp {
    guard: TerminalGuard,
    status: StatusPanel,
    progress: ProgressPanel,
    tables: TablesPanel,
    log: LogPanel,
    last_draw: Option<Instant>,
    cancel_requested: bool,
}

impl UiApp {
    /// Enter the alternate screen; the terminal is restored when the value is dropped
    pub fn new() -> Result<Self> {
        Ok(Self {
            guard: TerminalGuard::enter()?,
            status: StatusPanel::new(),
            progress: ProgressPanel::new(),
            tables: TablesPanel::new(),
            log: LogPanel::new(),
            last_draw: None,
            cancel_requested: false,
        })
    }

    /// Drain pending key events; 'q' or Esc requests cancellation
    fn poll_keys(&mut self) {
        while event::poll(Duration::ZERO).unwrap_or(false) {
            match event::read() {
                Ok(CrosstermEvent::Key(KeyEvent { code, .. }))
                    if matches!(code, KeyCode::Char('q') | KeyCode::Esc) =>
                {
                    if !self.cancel_requested {
                        self.log.add("Cancelling after the current file...");
                    }
                    self.cancel_requested = true;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    /// Redraw, skipping progress-only updates that arrive too quickly
    fn redraw(&mut self, throttled: bool) {
        if throttled && self.last_draw.is_some_and(|t| t.elapsed() < REDRAW_INTERVAL) {
            return;
        }
        self.poll_keys();

        let (status, progress, tables, log) = (&self.status, &self.progress, &self.tables, &self.log);
        let drawn = self.guard.terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(5),
                    Constraint::Length(3),
                    Constraint::Length(tables.height()),
                    Constraint::Min(5),
                ])
                .split(frame.area());

            status.render(frame, chunks[0]);
            progress.render(frame, chunks[1]);
            tables.render(frame, chunks[2]);
            log.render(frame, chunks[3]);
        });

        if let Err(e) = drawn {
            tracing::debug!(error = %e, "terminal draw failed");
        }
        self.last_draw = Some(Instant::now());
    }

    /// Show the final summary and wait for a key before restoring the terminal
    pub fn finish(mut self, summary: &str) -> Result<()> {
        self.status.set_phase(Phase::Complete);
        self.progress.clear();
        self.log.add(summary);
        self.log.add("Press any key to exit...");
        self.redraw(false);

        loop {
            if event::poll(Duration::from_millis(100))? {
                if let CrosstermEvent::Key(_) = event::read()? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Restore the terminal immediately
    pub fn restore(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}

impl Ui for UiApp {
    fn set_phase(&mut self, phase: Phase) {
        self.status.set_phase(phase);
        self.redraw(false);
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.status.set_info(info);
        self.redraw(false);
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        self.progress
            .set_progress(Progress::new(current, total, label));
        self.redraw(true);
    }

    fn clear_progress(&mut self) {
        self.progress.clear();
        self.redraw(false);
    }

    fn log(&mut self, message: impl Into<String>) {
        self.log.add(message);
        self.redraw(false);
    }

    fn file_done(&mut self, report: &FileReport) {
        self.tables.record(report);
        self.log.add(report.summary());
        self.redraw(false);
    }

    fn cancelled(&mut self) -> bool {
        self.poll_keys();
        self.cancel_requested
    }
}

/// Plain console reporting through `tracing`.
///
/// Progress is logged at debug level in steps of ten percent per label.
#[derive(Default)]
pub struct LogUi {
    last_step: Option<(String, u64)>,
}

impl LogUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ui for LogUi {
    fn set_phase(&mut self, phase: Phase) {
        tracing::info!(%phase, "phase");
    }

    fn set_info(&mut self, info: impl Into<String>) {
        let info: String = info.into();
        tracing::debug!(%info, "working on");
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        let progress = Progress::new(current, total, label);
        let step = progress.percent() / 10;
        let changed = match &self.last_step {
            Some((label, last)) => *label != progress.label || *last != step,
            None => true,
        };
        if changed {
            tracing::debug!(
                label = %progress.label,
                current,
                total,
                percent = progress.percent(),
                "progress"
            );
            self.last_step = Some((progress.label, step));
        }
    }

    fn clear_progress(&mut self) {
        self.last_step = None;
    }

    fn log(&mut self, message: impl Into<String>) {
        let message: String = message.into();
        tracing::info!("{}", message);
    }
}

/// Discards everything; for tests and library callers
#[derive(Default)]
pub struct SilentUi;

impl SilentUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for SilentUi {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn clear_progress(&mut self) {}
    fn log(&mut self, _message: impl Into<String>) {}
}

//! Panels of the terminal interface

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table};
use ratatui::Frame;

use super::{Phase, Progress};
use crate::schema::ALL_SOURCES;
use crate::writer::{FileOutcome, FileReport};

const MAX_LOG_ENTRIES: usize = 200;

/// Current phase and the file being worked on
pub struct StatusPanel {
    phase: Phase,
    info: String,
}

impl StatusPanel {
    pub fn new() -> Self {
        Self {
            phase: Phase::Preparing,
            info: String::new(),
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let phase_style = match self.phase {
            Phase::Complete => Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
            _ => Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        };

        let indicator = match self.phase {
            Phase::Downloading => "↓",
            Phase::Preparing => "◐",
            Phase::Importing => "⇥",
            Phase::Complete => "✓",
        };

        let lines = vec![
            Line::from(vec![
                Span::styled(format!(" {} ", indicator), phase_style),
                Span::styled(self.phase.to_string(), phase_style),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::raw("   "),
                Span::styled(&self.info, Style::default().fg(Color::Gray)),
            ]),
        ];

        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Vehicle TG to SQLite ")
            .border_style(Style::default().fg(Color::Blue));

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

/// Row-count gauge for the file being loaded
pub struct ProgressPanel {
    progress: Option<Progress>,
}

impl ProgressPanel {
    pub fn new() -> Self {
        Self { progress: None }
    }

    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
    }

    pub fn clear(&mut self) {
        self.progress = None;
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::LEFT | Borders::RIGHT)
            .border_style(Style::default().fg(Color::Blue));

        let Some(progress) = &self.progress else {
            frame.render_widget(Paragraph::new("").block(block), area);
            return;
        };

        let label = if progress.total > 0 {
            format!(
                "{}: {}/{} rows ({}%)",
                progress.label,
                progress.current,
                progress.total,
                progress.percent()
            )
        } else {
            progress.label.clone()
        };

        let gauge = Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
            .ratio(progress.ratio().min(1.0))
            .label(label);

        frame.render_widget(gauge, area);
    }
}

/// One line per finished source file
pub struct TablesPanel {
    reports: Vec<FileReport>,
}

impl TablesPanel {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
        }
    }

    pub fn record(&mut self, report: &FileReport) {
        self.reports.retain(|r| r.table != report.table);
        self.reports.push(report.clone());
    }

    /// Rows needed to show every configured table plus header and borders
    pub fn height(&self) -> u16 {
        (ALL_SOURCES.len().max(self.reports.len()) + 3) as u16
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let header = Row::new(["table", "outcome", "inserted", "key-skipped", "duplicate", "discarded"])
            .style(Style::default().add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = self
            .reports
            .iter()
            .map(|report| {
                let (label, color) = match &report.outcome {
                    FileOutcome::Loaded => ("loaded".to_string(), Color::Green),
                    FileOutcome::Skipped { reason } => (format!("skipped: {}", reason), Color::Yellow),
                    FileOutcome::Failed { reason } => (format!("failed: {}", reason), Color::Red),
                };
                let stats = &report.stats;
                Row::new(vec![
                    Cell::from(report.table),
                    Cell::from(label).style(Style::default().fg(color)),
                    Cell::from(stats.inserted.to_string()),
                    Cell::from(stats.fk_skipped.to_string()),
                    Cell::from(stats.pk_ignored.to_string()),
                    Cell::from(stats.discarded.to_string()),
                ])
            })
            .collect();

        let widths = [
            Constraint::Length(12),
            Constraint::Min(20),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(10),
        ];

        let table = Table::new(rows, widths).header(header).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Tables ")
                .border_style(Style::default().fg(Color::Blue)),
        );
        frame.render_widget(table, area);
    }
}

/// Scrolling activity history, newest entry highlighted
pub struct LogPanel {
    entries: Vec<String>,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.entries.push(message.into());
        if self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.remove(0);
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Activity (q to cancel) ")
            .border_style(Style::default().fg(Color::Blue));

        let visible = area.height.saturating_sub(2) as usize;
        let start = self.entries.len().saturating_sub(visible);
        let last = self.entries.len().saturating_sub(1);

        let items: Vec<ListItem> = self.entries[start..]
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let style = if start + i == last {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Span::styled(format!(" {}", entry), style))
            })
            .collect();

        frame.render_widget(List::new(items).block(block), area);
    }
}

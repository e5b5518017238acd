//! UI Components for the terminal interface

use chrono::Local;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph};
use ratatui::Frame;
use std::collections::VecDeque;

use super::{Phase, Progress};

/// Status panel showing current phase, file and queue tallies
pub struct StatusPanel {
    phase: Phase,
    info: String,
    parsed: usize,
    failed: usize,
}

impl StatusPanel {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            info: String::new(),
            parsed: 0,
            failed: 0,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Done => self.parsed += 1,
            Phase::Failed => self.failed += 1,
            _ => {}
        }
        self.phase = phase;
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let color = match self.phase {
            Phase::Done => Color::Green,
            Phase::Failed => Color::Red,
            Phase::Idle => Color::Gray,
            _ => Color::Cyan,
        };
        let phase_style = Style::default().fg(color).add_modifier(Modifier::BOLD);

        let phase_indicator = match self.phase {
            Phase::Idle => "·",
            Phase::Streaming => "↓",
            Phase::Finalizing => "⚙",
            Phase::Done => "✓",
            Phase::Failed => "✗",
        };

        let lines = vec![
            Line::from(vec![
                Span::styled(format!(" {} ", phase_indicator), phase_style),
                Span::styled(self.phase.to_string(), phase_style),
                Span::styled(
                    format!("   parsed {} / failed {}", self.parsed, self.failed),
                    Style::default().fg(Color::DarkGray),
                ),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::raw("   "),
                Span::styled(&self.info, Style::default().fg(Color::Gray)),
            ]),
        ];

        let block = Block::default()
            .borders(Borders::ALL)
            .title(" X4 Savegame to SQLite ")
            .border_style(Style::default().fg(Color::Blue));

        let paragraph = Paragraph::new(lines).block(block);
        frame.render_widget(paragraph, area);
    }
}

/// Gauge of compressed bytes consumed
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

        match &self.progress {
            Some(progress) => {
                let gauge = Gauge::default()
                    .block(block)
                    .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
                    .ratio(progress.ratio().min(1.0))
                    .label(progress.describe());

                frame.render_widget(gauge, area);
            }
            None => {
                let paragraph = Paragraph::new("").block(block);
                frame.render_widget(paragraph, area);
            }
        }
    }
}

/// Log panel showing the most recent activity
pub struct LogPanel {
    entries: VecDeque<String>,
    max_entries: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: 200,
        }
    }

    pub fn add(&mut self, message: impl Into<String>) {
        let stamp = Local::now().format("%H:%M:%S");
        self.entries.push_back(format!("{} {}", stamp, message.into()));
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Activity ")
            .border_style(Style::default().fg(Color::Blue));

        let visible_height = area.height.saturating_sub(2) as usize;
        let start = self.entries.len().saturating_sub(visible_height);
        let last = self.entries.len().saturating_sub(1);

        let items: Vec<ListItem> = self
            .entries
            .iter()
            .enumerate()
            .skip(start)
            .map(|(i, entry)| {
                let style = if i == last {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Span::styled(format!(" {}", entry), style))
            })
            .collect();

        let list = List::new(items).block(block);
        frame.render_widget(list, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn rendered(status: &StatusPanel) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 5)).unwrap();
        terminal.draw(|frame| status.render(frame, frame.area())).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_status_counts_terminal_phases() {
        let mut status = StatusPanel::new();
        status.set_phase(Phase::Streaming);
        status.set_phase(Phase::Done);
        status.set_phase(Phase::Streaming);
        status.set_phase(Phase::Failed);
        status.set_info("quicksave.xml.gz");

        let screen = rendered(&status);
        assert!(screen.contains("Failed"));
        assert!(screen.contains("parsed 1 / failed 1"));
        assert!(screen.contains("quicksave.xml.gz"));
    }

    #[test]
    fn test_log_panel_is_bounded() {
        let mut log = LogPanel::new();
        for i in 0..250 {
            log.add(format!("line {}", i));
        }
        assert_eq!(log.len(), 200);
        assert!(log.entries.front().unwrap().ends_with("line 50"));
    }
}

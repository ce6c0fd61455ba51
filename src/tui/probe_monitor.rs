//! TUI monitor for a running probe

use crate::probe::{ProbeEngine, ProbeEvent, RunOutcome, StatsSnapshot};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Duration;

/// Maximum number of lines kept per panel
const MAX_RECENT_LINES: usize = 200;

/// Live view of a probe run
pub struct ProbeMonitorApp {
    engine: Arc<ProbeEngine>,
    events: UnboundedReceiver<ProbeEvent>,
    /// File that hits are appended to as they arrive
    hits_output: Option<PathBuf>,
    stats: StatsSnapshot,
    recent_hits: VecDeque<String>,
    recent_activity: VecDeque<String>,
    /// Selected panel (0 = hits, 1 = activity)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl ProbeMonitorApp {
    pub fn new(
        engine: Arc<ProbeEngine>,
        events: UnboundedReceiver<ProbeEvent>,
        hits_output: Option<PathBuf>,
    ) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            engine,
            events,
            hits_output,
            stats: StatsSnapshot::default(),
            recent_hits: VecDeque::new(),
            recent_activity: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Running... Press 'q' to stop.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the TUI until the user quits
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        // Make sure nothing is left in flight once the screen is gone.
        self.engine.stop().await;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut hits_file = self
            .hits_output
            .as_ref()
            .map(|p| OpenOptions::new().create(true).append(true).open(p))
            .transpose()?;

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                    }
                }
            }

            loop {
                match self.events.try_recv() {
                    Ok(event) => self.apply(event, hits_file.as_mut())?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.is_complete = true;
                        break;
                    }
                }
            }

            if self.should_quit && self.is_complete {
                break;
            }

            // Let the workers make progress between frames.
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn apply(&mut self, event: ProbeEvent, hits_file: Option<&mut File>) -> Result<()> {
        match event {
            ProbeEvent::Hit { candidate, kind } => {
                if let Some(file) = hits_file {
                    writeln!(file, "{}", candidate)?;
                    file.flush()?;
                }
                let line = format!("[{}] {}", kind.to_uppercase(), candidate);
                self.log(format!("HIT {}", line));
                push_bounded(&mut self.recent_hits, line);
            }
            ProbeEvent::Checked {
                candidate,
                kind,
                result,
            } => {
                self.log(format!(
                    "[{}] {} - {}",
                    kind.to_uppercase(),
                    candidate,
                    result.message
                ));
            }
            ProbeEvent::SourceExhausted { kind } => {
                self.log(format!("Source {} exhausted", kind));
            }
            ProbeEvent::Stats(stats) => {
                self.stats = stats;
            }
            ProbeEvent::Notified {
                candidate,
                delivered,
            } => {
                let verdict = if delivered { "sent" } else { "failed" };
                self.log(format!("Webhook {}: {}", verdict, candidate));
            }
            ProbeEvent::Finished(outcome) => {
                self.is_complete = true;
                let reason = match outcome {
                    RunOutcome::Stopped => "Stopped",
                    RunOutcome::Exhausted => "All sources exhausted",
                };
                self.status_message = format!(
                    "{}! Checks: {} | Hits: {} | Errors: {} | Press 'q' to quit",
                    reason, self.stats.checks, self.stats.hits, self.stats.errors
                );
            }
        }
        Ok(())
    }

    fn log(&mut self, line: String) {
        push_bounded(&mut self.recent_activity, line);
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                if !self.is_complete {
                    self.engine.cancel_run();
                    self.status_message =
                        "Stopping... waiting for in-flight checks to finish".to_string();
                }
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_hits.len()
        } else {
            self.recent_activity.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Stats
                Constraint::Min(0),    // Panels
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Handle Scout")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let stats_line = format!(
            "Checks: {} | Hits: {} | Errors: {} | CPM: {} | Proxies: {}",
            self.stats.checks,
            self.stats.hits,
            self.stats.errors,
            self.stats.cpm,
            self.stats.proxy_count
        );
        let stats = Paragraph::new(stats_line)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Stats"));
        f.render_widget(stats, chunks[1]);

        let panels = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(chunks[2]);

        Self::render_lines(
            f,
            panels[0],
            "Hits",
            &self.recent_hits,
            self.selected_list == 0,
            Color::Green,
            if self.selected_list == 0 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        Self::render_lines(
            f,
            panels[1],
            "Activity",
            &self.recent_activity,
            self.selected_list == 1,
            Color::Gray,
            if self.selected_list == 1 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    #[allow(clippy::too_many_arguments)]
    fn render_lines(
        f: &mut Frame,
        area: Rect,
        title: &str,
        lines: &VecDeque<String>,
        is_selected: bool,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = lines
            .iter()
            .rev() // Newest first
            .map(|line| ListItem::new(line.clone()).style(Style::default().fg(color)))
            .collect();

        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({})", title, lines.len()))
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}

fn push_bounded(lines: &mut VecDeque<String>, line: String) {
    lines.push_back(line);
    if lines.len() > MAX_RECENT_LINES {
        lines.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_bounded_drops_oldest() {
        let mut lines = VecDeque::new();
        for i in 0..(MAX_RECENT_LINES + 5) {
            push_bounded(&mut lines, i.to_string());
        }
        assert_eq!(lines.len(), MAX_RECENT_LINES);
        assert_eq!(lines.front().map(String::as_str), Some("5"));
    }
}

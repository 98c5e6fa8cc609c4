//! Ratatui-based terminal dashboard.
//!
//! One panel per feed: the balance in the band's theme color, the Rupiah
//! text, a status indicator and a sparkline of published values. Feeds are
//! driven by the `Monitor` on the runtime workers; this loop only reads their
//! watch channels and forwards refresh requests.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Sparkline},
};

use crate::domain::{BalanceEvent, BandThresholds, EngineConfig, MonitorConfig, StatusLevel, ThemeBand};
use crate::engine::EngineStatus;
use crate::error::AppError;
use crate::monitor::{FeedHandle, Monitor};
use crate::report::format_compact;

/// Published values kept per feed for the sparkline.
const HISTORY_LEN: usize = 120;

/// Run the dashboard until the user quits.
pub fn run(monitor: &Monitor, config: &MonitorConfig) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(monitor, config);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct FeedView {
    handle: FeedHandle,
    current: Option<BalanceEvent>,
    engine_status: EngineStatus,
    history: VecDeque<u64>,
}

impl FeedView {
    fn new(handle: FeedHandle) -> Self {
        let mut view = Self {
            current: None,
            engine_status: handle.status(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            handle,
        };
        view.sync();
        view
    }

    /// Pull the latest event and status; `true` when anything changed.
    fn sync(&mut self) -> bool {
        let mut changed = false;

        let status = self.handle.status();
        if status != self.engine_status {
            self.engine_status = status;
            changed = true;
        }

        let latest = self.handle.current();
        if latest != self.current {
            if let Some(event) = &latest {
                push_history(&mut self.history, event);
            }
            self.current = latest;
            changed = true;
        }
        changed
    }
}

fn push_history(history: &mut VecDeque<u64>, event: &BalanceEvent) {
    if history.len() == HISTORY_LEN {
        history.pop_front();
    }
    history.push_back(event.value.value().round() as u64);
}

struct App {
    feeds: Vec<FeedView>,
    bands: BandThresholds,
    engine: EngineConfig,
    interval: Duration,
    selected: usize,
    status: String,
}

impl App {
    fn new(monitor: &Monitor, config: &MonitorConfig) -> Self {
        Self {
            feeds: monitor.feeds().iter().cloned().map(FeedView::new).collect(),
            bands: config.bands,
            engine: config.engine.clone(),
            interval: config.interval,
            selected: 0,
            status: "Waiting for the first reading...".to_string(),
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            for feed in &mut self.feeds {
                needs_redraw |= feed.sync();
            }

            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(200))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected + 1 < self.feeds.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('r') => {
                if let Some(feed) = self.feeds.get(self.selected) {
                    self.status = if feed.handle.refresh() {
                        format!("Refreshing {}...", feed.handle.name())
                    } else {
                        format!("{} is already updating.", feed.handle.name())
                    };
                }
            }
            KeyCode::Char('R') => {
                let queued = self.feeds.iter().filter(|f| f.handle.refresh()).count();
                self.status = format!("Refreshing {queued} of {} feeds.", self.feeds.len());
            }
            KeyCode::Char('d') => {
                if let Some(feed) = self.feeds.get(self.selected) {
                    match crate::debug::write_debug_bundle(&feed.handle.state(), &self.engine) {
                        Ok(path) => {
                            self.status = format!("Wrote debug bundle: {}", path.display());
                        }
                        Err(err) => {
                            self.status = format!("Debug write failed: {err}");
                        }
                    }
                }
            }
            _ => {}
        }
        false
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let line = Line::from(vec![
            Span::styled("bw", Style::default().fg(Color::Cyan)),
            Span::raw(" - treasury balance"),
            Span::styled(
                format!(
                    " | feeds: {} | every {}s | {} samples x {} rounds",
                    self.feeds.len(),
                    self.interval.as_secs(),
                    self.engine.sample_count,
                    self.engine.max_attempts,
                ),
                Style::default().fg(Color::Gray),
            ),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        if self.feeds.len() <= 1 {
            if let Some(feed) = self.feeds.first() {
                self.draw_feed(frame, area, feed);
            }
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(area);
        self.draw_feed_list(frame, chunks[0]);
        if let Some(feed) = self.feeds.get(self.selected) {
            self.draw_feed(frame, chunks[1], feed);
        }
    }

    fn draw_feed_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .feeds
            .iter()
            .map(|feed| {
                let (text, color) = match &feed.current {
                    Some(event) => (
                        format_compact(event.value),
                        band_color(ThemeBand::for_balance(event.value, &self.bands)),
                    ),
                    None => ("-".to_string(), Color::Gray),
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{:<12}", feed.handle.name())),
                    Span::styled(text, Style::default().fg(color)),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Feeds").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_feed(&self, frame: &mut ratatui::Frame<'_>, area: Rect, feed: &FeedView) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(8), Constraint::Min(3)])
            .split(area);

        let (indicator, indicator_color) = indicator(feed.engine_status, feed.current.as_ref());
        let mut lines: Vec<Line> = Vec::new();

        let accent = match &feed.current {
            Some(event) => {
                let band = ThemeBand::for_balance(event.value, &self.bands);
                let color = band_color(band);
                lines.push(Line::from(Span::styled(
                    format_compact(event.value),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(event.formatted_text.clone()));
                let label = StatusLevel::for_balance(event.value).label();
                lines.push(Line::from(Span::styled(label, Style::default().fg(color))));
                color
            }
            None => {
                lines.push(Line::from(Span::styled(
                    "--",
                    Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from("No balance yet"));
                lines.push(Line::from(""));
                Color::Gray
            }
        };
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(indicator, Style::default().fg(indicator_color))));

        let panel = Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .title(feed.handle.name().to_string())
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(accent)),
            );
        frame.render_widget(panel, chunks[0]);

        let data: Vec<u64> = feed.history.iter().copied().collect();
        let spark = Sparkline::default()
            .block(Block::default().title("Published values").borders(Borders::ALL))
            .data(&data)
            .style(Style::default().fg(accent));
        frame.render_widget(spark, chunks[1]);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = if self.feeds.len() > 1 {
            "↑/↓ feed  r refresh  R refresh all  d debug  q quit"
        } else {
            "r refresh  d debug  q quit"
        };
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Theme colors: red, yellow-orange, teal.
fn band_color(band: ThemeBand) -> Color {
    match band {
        ThemeBand::Low => Color::Rgb(0xdc, 0x26, 0x26),
        ThemeBand::Medium => Color::Rgb(0xf5, 0x9e, 0x0b),
        ThemeBand::High => Color::Rgb(0x0d, 0x94, 0x88),
    }
}

/// Status line under the balance. Never shows raw feed errors.
fn indicator(status: EngineStatus, current: Option<&BalanceEvent>) -> (String, Color) {
    match status {
        EngineStatus::Sampling { attempt: 1 } => ("Updating...".to_string(), Color::Cyan),
        EngineStatus::Sampling { attempt } => (format!("Retrying (round {attempt})..."), Color::Yellow),
        EngineStatus::Retrying { attempt, disagreed } => {
            let text = if disagreed {
                format!("Readings disagreed in round {attempt}, retrying...")
            } else {
                format!("No readings in round {attempt}, retrying...")
            };
            (text, Color::Yellow)
        }
        EngineStatus::Offline {
            consecutive_failures,
        } => {
            let text = match current {
                Some(_) => format!("Offline, showing last known value ({consecutive_failures} failed updates)"),
                None => format!("Offline, no data yet ({consecutive_failures} failed updates)"),
            };
            (text, Color::Red)
        }
        EngineStatus::Idle => match current {
            Some(event) => (
                format!("Updated {} ({})", event.timestamp, event.source.label()),
                Color::Gray,
            ),
            None => ("Waiting for the first reading".to_string(), Color::Gray),
        },
    }
}

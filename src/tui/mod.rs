use crate::actions;
use crate::config::Config;
use crate::error::{HbError, Result};
use crate::habit::{CountDirection, Habit, HabitDraft, HabitId, HabitPatch};
use crate::parser;
use crate::state::Theme;
use crate::timer::{Countdown, TickOutcome, TimerState};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::*;

use std::collections::HashMap;
use std::io::stdout;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Normal,
    AddName,
    AddTimer,
    ConfirmDelete,
}

/// A countdown plus the minutes it was built from, so edits can be noticed.
struct CardTimer {
    minutes: u32,
    countdown: Countdown,
}

struct App {
    habits: Vec<Habit>,
    theme: Theme,
    timers: HashMap<HabitId, CardTimer>,
    idx: usize,
    mode: Mode,
    input: String,
    add_name: String,
    status_msg: String,
    should_quit: bool,
}

impl App {
    fn new() -> Result<Self> {
        let mut app = App {
            habits: Vec::new(),
            theme: Theme::default(),
            timers: HashMap::new(),
            idx: 0,
            mode: Mode::Normal,
            input: String::new(),
            add_name: String::new(),
            status_msg: String::from("? for help"),
            should_quit: false,
        };
        app.refresh()?;
        Ok(app)
    }

    fn refresh(&mut self) -> Result<()> {
        let (habits, theme, persistent) = actions::with_store(|store, _| {
            Ok((store.habits().to_vec(), store.theme(), store.is_persistent()))
        })?;
        self.habits = habits;
        self.theme = theme;
        if !persistent {
            self.status_msg = "Storage unavailable: changes will not be saved".to_string();
        }
        self.sync_timers();

        if self.idx >= self.habits.len() {
            self.idx = self.habits.len().saturating_sub(1);
        }
        Ok(())
    }

    /// Keep one countdown per timed habit. Running timers survive a refresh
    /// unless their duration changed.
    fn sync_timers(&mut self) {
        let mut timers = std::mem::take(&mut self.timers);
        for habit in &self.habits {
            let Some(minutes) = habit.timer_minutes() else {
                continue;
            };
            let timer = match timers.remove(&habit.id) {
                Some(existing) if existing.minutes == minutes => existing,
                _ => CardTimer {
                    minutes,
                    countdown: Countdown::from_minutes(minutes),
                },
            };
            self.timers.insert(habit.id.clone(), timer);
        }
    }

    fn selected(&self) -> Option<&Habit> {
        self.habits.get(self.idx)
    }

    fn selected_id(&self) -> Option<String> {
        self.selected().map(|h| h.id.to_string())
    }

    /// Advance every running countdown by one second; finished ones count.
    fn on_tick(&mut self) -> Result<()> {
        let finished: Vec<HabitId> = self
            .timers
            .iter_mut()
            .filter_map(|(id, timer)| (timer.countdown.tick() == TickOutcome::Finished).then(|| id.clone()))
            .collect();

        for id in finished {
            self.increment(&id.to_string())?;
        }
        Ok(())
    }

    fn increment(&mut self, id: &str) -> Result<()> {
        match actions::with_store(|store, _| actions::increment(store, id)) {
            Ok(habit) => {
                self.status_msg = format!("{}: {} (streak {})", habit.name, habit.count, habit.streak);
                self.refresh()?;
            }
            Err(e) => self.status_msg = format!("Error: {}", e),
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::AddName => self.handle_add_name_key(key),
            Mode::AddTimer => self.handle_add_timer_key(key),
            Mode::ConfirmDelete => self.handle_confirm_delete_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.habits.is_empty() {
                    self.idx = (self.idx + 1).min(self.habits.len() - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.idx = self.idx.saturating_sub(1);
            }
            KeyCode::Char('g') => self.idx = 0,
            KeyCode::Char('G') => self.idx = self.habits.len().saturating_sub(1),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(habit) = self.selected() {
                    let id = habit.id.clone();
                    if let Some(timer) = self.timers.get_mut(&id) {
                        timer.countdown.toggle();
                        self.status_msg = if timer.countdown.is_running() {
                            "Timer running".to_string()
                        } else {
                            "Timer paused".to_string()
                        };
                    } else {
                        self.increment(&id.to_string())?;
                    }
                }
            }
            KeyCode::Char('+') => {
                if let Some(id) = self.selected_id() {
                    self.increment(&id)?;
                }
            }
            KeyCode::Char('r') => {
                if let Some(habit) = self.selected() {
                    let id = habit.id.clone();
                    if let Some(timer) = self.timers.get_mut(&id) {
                        timer.countdown.reset();
                    }
                    match actions::with_store(|store, _| actions::reset(store, &id.to_string())) {
                        Ok(habit) => {
                            self.status_msg = format!("Reset {}", habit.name);
                            self.refresh()?;
                        }
                        Err(e) => self.status_msg = format!("Error: {}", e),
                    }
                }
            }
            KeyCode::Char('x') => {
                if let Some(habit) = self.selected() {
                    self.status_msg = format!("Delete {}? (y/n)", habit.name);
                    self.mode = Mode::ConfirmDelete;
                }
            }
            KeyCode::Char('c') => {
                if let Some(habit) = self.selected() {
                    let id = habit.id.to_string();
                    let patch = HabitPatch {
                        bg_color: Some(parser::next_color(&habit.bg_color).to_string()),
                        ..Default::default()
                    };
                    match actions::with_store(|store, _| actions::edit(store, &id, &patch)) {
                        Ok(_) => self.refresh()?,
                        Err(e) => self.status_msg = format!("Error: {}", e),
                    }
                }
            }
            KeyCode::Char('t') => {
                match actions::with_store(|store, _| Ok(actions::theme(store, None))) {
                    Ok(theme) => {
                        self.theme = theme;
                        self.status_msg = format!("Theme: {}", theme.as_str());
                    }
                    Err(e) => self.status_msg = format!("Error: {}", e),
                }
            }
            KeyCode::Char('a') => {
                self.mode = Mode::AddName;
                self.input.clear();
                self.add_name.clear();
                self.status_msg = "Enter name (then Enter for timer):".to_string();
            }
            KeyCode::Char('R') => {
                self.refresh()?;
                self.status_msg = "Refreshed".to_string();
            }
            KeyCode::Char('?') => {
                self.status_msg =
                    "j/k:nav Enter:count/timer +:count r:reset x:delete a:add c:color t:theme R:refresh q:quit"
                        .to_string();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_add_name_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.status_msg = "Cancelled".to_string();
            }
            KeyCode::Enter => {
                if self.input.trim().is_empty() {
                    self.status_msg = "Name cannot be empty".to_string();
                } else {
                    self.add_name = self.input.trim().to_string();
                    self.input.clear();
                    self.mode = Mode::AddTimer;
                    self.status_msg = format!("{} | Timer (e.g. 25m, empty for none):", self.add_name);
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                self.input.push(c);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_add_timer_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.status_msg = "Cancelled".to_string();
            }
            KeyCode::Enter => {
                let timer = if self.input.trim().is_empty() {
                    Ok(None)
                } else {
                    parser::parse_minutes(&self.input)
                };
                self.mode = Mode::Normal;
                match timer {
                    Ok(timer_duration) => {
                        let draft = HabitDraft {
                            timer_duration,
                            ..HabitDraft::named(self.add_name.clone())
                        };
                        match actions::with_store(|store, _| actions::add(store, &draft)) {
                            Ok(habit) => {
                                self.status_msg = format!("Created {}", habit.name);
                                self.refresh()?;
                                self.idx = self.habits.len().saturating_sub(1);
                            }
                            Err(e) => self.status_msg = format!("Error: {}", e),
                        }
                    }
                    Err(e) => self.status_msg = format!("Error: {}", e),
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                self.input.push(c);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_confirm_delete_key(&mut self, key: KeyEvent) -> Result<()> {
        self.mode = Mode::Normal;
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(id) = self.selected_id() {
                    match actions::with_store(|store, _| actions::remove(store, &id)) {
                        Ok(habit) => {
                            self.status_msg = format!("Deleted {}", habit.name);
                            self.refresh()?;
                        }
                        Err(e) => self.status_msg = format!("Error: {}", e),
                    }
                }
            }
            _ => self.status_msg = "Cancelled".to_string(),
        }
        Ok(())
    }
}

fn base_style(theme: Theme) -> Style {
    match theme {
        Theme::Light => Style::default().bg(Color::White).fg(Color::Black),
        Theme::Dark => Style::default().bg(Color::Black).fg(Color::White),
    }
}

/// Card colors: the habit's own background with readable text, or the theme.
fn card_style(habit: &Habit, theme: Theme) -> Style {
    match parser::rgb(&habit.bg_color) {
        Some((r, g, b)) => {
            let fg = if parser::is_light_color(&habit.bg_color) {
                Color::Black
            } else {
                Color::White
            };
            Style::default().bg(Color::Rgb(r, g, b)).fg(fg)
        }
        None => base_style(theme),
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let base = base_style(app.theme);
    frame.render_widget(Block::default().style(base), frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(5),   // main
            Constraint::Length(3), // status
        ])
        .split(frame.area());

    let best_streak = app.habits.iter().map(|h| h.streak).max().unwrap_or(0);
    let header = Paragraph::new(format!(
        " {} habits | best streak {} | {} theme | ? for help",
        app.habits.len(),
        best_streak,
        app.theme.as_str(),
    ))
    .style(base)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" habitbox ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(header, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);

    let items: Vec<ListItem> = app
        .habits
        .iter()
        .enumerate()
        .map(|(i, habit)| {
            let timer = app
                .timers
                .get(&habit.id)
                .map(|t| format!("  {}{}", t.countdown.display(), timer_marker(t.countdown.state())))
                .unwrap_or_default();
            let label = format!(
                "{:<18} {:>5}  streak {}{}",
                habit.name, habit.count, habit.streak, timer
            );
            let mut style = card_style(habit, app.theme);
            if i == app.idx {
                style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
            }
            ListItem::new(label).style(style)
        })
        .collect();

    let list = if items.is_empty() {
        List::new(vec![ListItem::new("No habits yet. Press a to add one.")])
    } else {
        List::new(items)
    };
    frame.render_widget(
        list.style(base).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Habits ")
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        main_chunks[0],
    );

    render_detail(frame, app, main_chunks[1], base);

    let input_text = match app.mode {
        Mode::Normal | Mode::ConfirmDelete => app.status_msg.clone(),
        Mode::AddName => format!("Name: {}_", app.input),
        Mode::AddTimer => format!("[{}] Timer: {}_", app.add_name, app.input),
    };
    let mode_label = match app.mode {
        Mode::Normal => "NORMAL",
        Mode::AddName | Mode::AddTimer => "ADD",
        Mode::ConfirmDelete => "DELETE",
    };
    let status = Paragraph::new(input_text).style(base).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", mode_label))
            .border_style(Style::default().fg(if app.mode == Mode::Normal {
                Color::Gray
            } else {
                Color::Green
            })),
    );
    frame.render_widget(status, chunks[2]);
}

fn timer_marker(state: TimerState) -> &'static str {
    match state {
        TimerState::Idle => "",
        TimerState::Running => " >",
        TimerState::Paused => " ||",
        TimerState::Completed => " done",
    }
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect, base: Style) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Detail ")
        .border_style(Style::default().fg(Color::Magenta));

    let Some(habit) = app.selected() else {
        frame.render_widget(Paragraph::new("").style(base).block(block), area);
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let step = match habit.count_direction {
        CountDirection::Up => format!("+{}", habit.count_amount),
        CountDirection::Down => format!("-{}", habit.count_amount),
    };
    let mut lines = vec![
        Line::from(vec![Span::styled("Name: ", label), Span::raw(&habit.name)]),
        Line::from(vec![Span::styled("Count: ", label), Span::raw(habit.count.to_string())]),
        Line::from(vec![Span::styled("Step: ", label), Span::raw(step)]),
        Line::from(vec![Span::styled("Streak: ", label), Span::raw(habit.streak.to_string())]),
    ];
    if !habit.description.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("About: ", label),
            Span::raw(&habit.description),
        ]));
    }
    if let Some(last) = habit.history.last() {
        lines.push(Line::from(vec![
            Span::styled("Last: ", label),
            Span::raw(format!("{} ({})", last.date, last.count)),
        ]));
    }

    let timer = app.timers.get(&habit.id);
    let inner = block.inner(area);
    frame.render_widget(block.style(base), area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(if timer.is_some() { 1 } else { 0 })])
        .split(inner);
    frame.render_widget(Paragraph::new(Text::from(lines)).style(base), parts[0]);

    if let Some(timer) = timer {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(timer.countdown.progress().clamp(0.0, 1.0))
            .label(format!("{} / {}m", timer.countdown.display(), timer.minutes));
        frame.render_widget(gauge, parts[1]);
    }
}

/// Raw mode and the alternate screen, undone on drop so an early `?` still
/// hands back a usable terminal.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().map_err(|e| HbError::Other(e.to_string()))?;
        let guard = TerminalGuard;
        stdout()
            .execute(EnterAlternateScreen)
            .map_err(|e| HbError::Other(e.to_string()))?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::warn!(error = %e, "failed to leave raw mode");
        }
        if let Err(e) = stdout().execute(LeaveAlternateScreen) {
            tracing::warn!(error = %e, "failed to leave alternate screen");
        }
    }
}

pub fn run() -> Result<()> {
    if !Config::config_path().exists() {
        return Err(HbError::NotInitialized);
    }

    let _guard = TerminalGuard::enter()?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend).map_err(|e| HbError::Other(e.to_string()))?;

    let mut app = App::new()?;
    let mut last_tick = Instant::now();

    loop {
        terminal
            .draw(|f| ui(f, &app))
            .map_err(|e| HbError::Other(e.to_string()))?;

        if event::poll(Duration::from_millis(100))
            .map_err(|e| HbError::Other(e.to_string()))?
        {
            if let Event::Key(key) = event::read().map_err(|e| HbError::Other(e.to_string()))? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key)?;
                }
            }
        }
        if app.should_quit {
            break;
        }

        while last_tick.elapsed() >= TICK {
            last_tick += TICK;
            app.on_tick()?;
        }
    }

    Ok(())
}

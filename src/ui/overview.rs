use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::controller::{Command, RunEvent};
use crate::ui::display::DisplayState;

pub const FOOTER: &str = "r/Enter: run test | x/Esc: cancel | q: quit | ↑/↓/Home: scroll events | c: clear events";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Run(Command),
    ScrollUp,
    ScrollDown,
    ScrollHome,
    ClearLog,
}

/// Maps a key press to an action. The trigger is ignored while a run is active.
pub fn key_action(key: KeyEvent, trigger_enabled: bool) -> Option<KeyAction> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(KeyAction::Run(Command::Quit));
    }
    match key.code {
        KeyCode::Char('q') => Some(KeyAction::Run(Command::Quit)),
        KeyCode::Char('r') | KeyCode::Enter if trigger_enabled => Some(KeyAction::Run(Command::Trigger)),
        KeyCode::Char('x') | KeyCode::Esc => Some(KeyAction::Run(Command::Cancel)),
        KeyCode::Up => Some(KeyAction::ScrollUp),
        KeyCode::Down => Some(KeyAction::ScrollDown),
        KeyCode::Home => Some(KeyAction::ScrollHome),
        KeyCode::Char('c') => Some(KeyAction::ClearLog),
        _ => None,
    }
}

pub fn run_tui(
    events: Receiver<RunEvent>,
    commands: UnboundedSender<Command>,
    autostart: bool,
    target: String,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut display = DisplayState::new();
    let mut log_scroll: usize = 0;

    if autostart {
        display.on_trigger();
        let _ = commands.send(Command::Trigger);
    }

    loop {
        while let Ok(ev) = events.try_recv() {
            display.apply(ev);
        }

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1), // Target
                    Constraint::Length(3), // Rates
                    Constraint::Length(3), // Status
                    Constraint::Min(0),    // Events
                    Constraint::Length(1), // Footer
                ].as_ref())
                .split(f.size());

            f.render_widget(Paragraph::new(format!("target: {target}")), outer[0]);

            let rates = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Ratio(1, 3),
                    Constraint::Ratio(1, 3),
                    Constraint::Ratio(1, 3),
                ].as_ref())
                .split(outer[1]);
            for (area, (title, value)) in rates.iter().zip([
                ("Bits", &display.bits),
                ("Kilobits", &display.kbits),
                ("Megabits", &display.mbits),
            ]) {
                let panel = Paragraph::new(value.as_str())
                    .block(Block::default().title(title).borders(Borders::ALL));
                f.render_widget(panel, *area);
            }

            let status = Paragraph::new(display.status.as_str())
                .block(Block::default().title("Status").borders(Borders::ALL));
            f.render_widget(status, outer[2]);

            let viewport = outer[3].height.saturating_sub(2) as usize;
            let start = display.logs.len().saturating_sub(viewport + log_scroll);
            let log_items: Vec<ListItem> = display.logs.iter().skip(start).map(|l| ListItem::new(l.clone())).collect();
            let log_list = List::new(log_items).block(Block::default().title("Events").borders(Borders::ALL));
            f.render_widget(log_list, outer[3]);

            let trigger_style = if display.trigger_enabled() {
                Style::default()
            } else {
                Style::default().add_modifier(Modifier::DIM)
            };
            let footer = Paragraph::new(FOOTER).style(trigger_style);
            f.render_widget(footer, outer[4]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key_action(key, display.trigger_enabled()) {
                    Some(KeyAction::Run(Command::Quit)) => {
                        let _ = commands.send(Command::Quit);
                        break;
                    }
                    Some(KeyAction::Run(Command::Trigger)) => {
                        display.on_trigger();
                        let _ = commands.send(Command::Trigger);
                    }
                    Some(KeyAction::Run(cmd)) => {
                        let _ = commands.send(cmd);
                    }
                    Some(KeyAction::ScrollUp) => log_scroll = log_scroll.saturating_add(1),
                    Some(KeyAction::ScrollDown) => log_scroll = log_scroll.saturating_sub(1),
                    Some(KeyAction::ScrollHome) => log_scroll = 0,
                    Some(KeyAction::ClearLog) => {
                        display.logs.clear();
                        log_scroll = 0;
                    }
                    None => {}
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

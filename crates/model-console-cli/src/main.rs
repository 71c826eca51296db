//! Model console - terminal UI for the federated house-price platform.
//!
//! This is the entry point for the `mlconsole` binary.

mod app;
mod chat;
mod client;
mod config;
mod forms;
mod report;
mod types;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use model_console_core::ExchangeMode;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use app::{App, Focus, InputMode, PickKind, ResourceTab};
use chat::{ChatEvent, CHAT_CHANNEL_CAPACITY};
use client::ApiClient;
use config::ConsoleConfig;

/// Model console - terminal UI for the federated house-price platform.
#[derive(Parser, Debug)]
#[command(name = "mlconsole")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL.
    #[arg(long, env = "MLCONSOLE_API_URL", default_value = "http://localhost:5000")]
    api_url: String,

    /// Request timeout in seconds.
    #[arg(long, env = "MLCONSOLE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Chat reply delivery: stream or normal.
    #[arg(long, env = "MLCONSOLE_MODE", default_value = "stream")]
    mode: ExchangeMode,

    /// Directory downloads are saved to.
    #[arg(long, env = "MLCONSOLE_DOWNLOAD_DIR", default_value = ".")]
    download_dir: PathBuf,

    /// Rows shown when previewing a data file.
    #[arg(long, default_value_t = 10)]
    preview_rows: u32,

    /// Seconds between background refreshes.
    #[arg(long, default_value_t = 5)]
    refresh_secs: u64,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> ConsoleConfig {
        ConsoleConfig {
            api_url: self.api_url,
            request_timeout_seconds: self.timeout_secs,
            chat_mode: self.mode,
            download_dir: self.download_dir,
            preview_rows: self.preview_rows,
            refresh_interval_seconds: self.refresh_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they stay out of the alternate screen.
    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("mlconsole=debug,model_console_core=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let config = args.into_config();
    let client = ApiClient::new(&config.api_url, config.request_timeout())?;
    tracing::info!(api_url = %config.api_url, mode = %config.chat_mode, "Starting console");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (chat_tx, chat_rx) = mpsc::channel::<ChatEvent>(CHAT_CHANNEL_CAPACITY);
    let refresh_every = config.refresh_interval();
    let mut app = App::new(client, config, chat_tx);

    if let Err(e) = app.refresh_all().await {
        app.refresh_error = Some(format!("加载失败: {}", e.user_message()));
    }

    let result = run_event_loop(&mut terminal, &mut app, chat_rx, refresh_every).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop.
///
/// Chat events redraw immediately so streamed text appears as it arrives.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut chat_rx: mpsc::Receiver<ChatEvent>,
    refresh_every: Duration,
) -> anyhow::Result<()> {
    let mut refresh_interval = tokio::time::interval(refresh_every);
    refresh_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately and the initial load already ran.
    refresh_interval.tick().await;

    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.is_sending() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            Some(event) = chat_rx.recv() => {
                if app.handle_chat_event(event) {
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }

            _ = refresh_interval.tick() => {
                if app.input_mode == InputMode::Normal {
                    if let Err(e) = app.refresh_all().await {
                        tracing::warn!(error = %e, "Failed to refresh resources");
                        app.refresh_error = Some(format!("刷新失败: {}", e.user_message()));
                    } else {
                        app.refresh_error = None;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle input events.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) => {
            if key.kind != KeyEventKind::Press {
                return;
            }

            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return;
            }

            match app.input_mode {
                InputMode::Normal => match app.focus {
                    Focus::Resources => handle_command_mode(app, key.code).await,
                    Focus::Chat => handle_chat_input(app, key),
                },
                InputMode::Form(_) => handle_form_mode(app, key).await,
                InputMode::ConfirmingDelete(_) => handle_confirm_delete_mode(app, key.code).await,
                InputMode::Picking(_) => handle_picker_mode(app, key.code).await,
                InputMode::Report { .. } => handle_report_mode(app, key.code),
            }
        }
        Event::Mouse(mouse) => {
            let in_report = matches!(app.input_mode, InputMode::Report { .. });
            match (in_report, mouse.kind) {
                (true, MouseEventKind::ScrollUp) => app.scroll_report(-3),
                (true, MouseEventKind::ScrollDown) => app.scroll_report(3),
                (false, MouseEventKind::ScrollUp) => app.scroll_chat_up(3),
                (false, MouseEventKind::ScrollDown) => app.scroll_chat_down(3),
                _ => {}
            }
        }
        _ => {}
    }
}

/// Report an operation's failure on the status bar.
fn report_failure(app: &mut App, result: Result<(), impl Into<app::ActionError>>) {
    if let Err(e) = result {
        let e = e.into();
        tracing::warn!(error = %e, "Action failed");
        app.set_error(e.user_message());
    }
}

/// Single-key commands while the resource panel has focus.
async fn handle_command_mode(app: &mut App, code: KeyCode) {
    if app.error_message.is_some() && code == KeyCode::Esc {
        app.clear_error();
        return;
    }
    app.status_message = None;

    match code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.next_tab(),
        KeyCode::BackTab => {
            app.next_tab();
            app.next_tab();
        }
        KeyCode::Char('1') => app.tab = ResourceTab::DataFiles,
        KeyCode::Char('2') => app.tab = ResourceTab::Models,
        KeyCode::Char('3') => app.tab = ResourceTab::Clients,
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::Char('i' | 'c') => app.set_focus(Focus::Chat),
        KeyCode::Char('u') => app.begin_upload(),
        KeyCode::Char('n') => app.begin_create_client(),
        KeyCode::Char('e') => {
            app.tab = ResourceTab::Models;
            app.begin_edit_model();
        }
        KeyCode::Char('d') => app.begin_delete(),
        KeyCode::Char('s') => {
            let result = app.download_selected().await;
            report_failure(app, result);
        }
        KeyCode::Char('p') => {
            app.tab = ResourceTab::DataFiles;
            let result = app.preview_selected().await;
            report_failure(app, result);
        }
        KeyCode::Char('b') => with_clients(app, |app| app.begin_bind(PickKind::DataFile)),
        KeyCode::Char('m') => with_clients(app, |app| app.begin_bind(PickKind::Model)),
        KeyCode::Char('B') => {
            app.tab = ResourceTab::Clients;
            let result = app.unbind_selected(PickKind::DataFile).await;
            report_failure(app, result);
        }
        KeyCode::Char('M') => {
            app.tab = ResourceTab::Clients;
            let result = app.unbind_selected(PickKind::Model).await;
            report_failure(app, result);
        }
        KeyCode::Char('t') => with_clients(app, App::begin_train),
        KeyCode::Char(' ') => with_clients(app, App::toggle_mark_selected_client),
        KeyCode::Char('v') => app.begin_evaluate(),
        KeyCode::Char('o') => app.toggle_chat_mode(),
        KeyCode::Char('x') => app.clear_chat().await,
        KeyCode::Char('r') => {
            match app.refresh_all().await {
                Ok(()) => {
                    app.refresh_error = None;
                    app.set_status("已刷新");
                }
                Err(e) => app.set_error(e.user_message()),
            }
        }
        KeyCode::Char('h') => {
            let result = app.show_agent_report().await;
            report_failure(app, result);
        }
        KeyCode::Enter => {
            let result = app.show_selected_details().await;
            report_failure(app, result);
        }
        _ => {}
    }
}

/// Client commands act on the Clients tab.
fn with_clients(app: &mut App, action: impl FnOnce(&mut App)) {
    app.tab = ResourceTab::Clients;
    action(app);
}

/// Typing while the chat has focus.
fn handle_chat_input(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc | KeyCode::Tab => app.set_focus(Focus::Resources),
        KeyCode::Enter => app.send_message(),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('a') if ctrl => app.input.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.input.move_cursor_end(),
        KeyCode::Char('u') if ctrl => {
            app.input.take();
        }
        KeyCode::Char(c) => app.input.insert_char(c),
        KeyCode::Backspace => app.input.delete_char(),
        KeyCode::Delete => app.input.delete_char_forward(),
        KeyCode::Left => app.input.move_cursor_left(),
        KeyCode::Right => app.input.move_cursor_right(),
        KeyCode::Home => app.input.move_cursor_start(),
        KeyCode::End => app.input.move_cursor_end(),
        _ => {}
    }
}

/// Handle input in a form dialog.
async fn handle_form_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            let result = app.submit_form().await;
            report_failure(app, result);
            return;
        }
        KeyCode::Esc => {
            app.close_dialog();
            return;
        }
        _ => {}
    }

    let InputMode::Form(form) = &mut app.input_mode else {
        return;
    };
    match key.code {
        KeyCode::Tab | KeyCode::Down => form.next_field(),
        KeyCode::BackTab | KeyCode::Up => form.prev_field(),
        KeyCode::Char(c) => form.active_mut().insert_char(c),
        KeyCode::Backspace => form.active_mut().delete_char(),
        KeyCode::Delete => form.active_mut().delete_char_forward(),
        KeyCode::Left => form.active_mut().move_cursor_left(),
        KeyCode::Right => form.active_mut().move_cursor_right(),
        KeyCode::Home => form.active_mut().move_cursor_start(),
        KeyCode::End => form.active_mut().move_cursor_end(),
        _ => {}
    }
}

/// Handle input in confirm delete mode.
async fn handle_confirm_delete_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('y' | 'Y') => {
            let result = app.confirm_delete().await;
            report_failure(app, result);
        }
        KeyCode::Char('n' | 'N') | KeyCode::Esc => app.close_dialog(),
        _ => {}
    }
}

/// Handle input in the bind picker.
async fn handle_picker_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.move_picker(false),
        KeyCode::Down | KeyCode::Char('j') => app.move_picker(true),
        KeyCode::Enter => {
            let result = app.confirm_pick().await;
            report_failure(app, result);
        }
        KeyCode::Esc => app.close_dialog(),
        _ => {}
    }
}

/// Handle input in a report popup.
fn handle_report_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.scroll_report(-1),
        KeyCode::Down | KeyCode::Char('j') => app.scroll_report(1),
        KeyCode::PageUp => app.scroll_report(-10),
        KeyCode::PageDown => app.scroll_report(10),
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => app.close_dialog(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["mlconsole"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.chat_mode, ExchangeMode::Stream);
        assert_eq!(config.download_dir, PathBuf::from("."));
    }

    #[test]
    fn args_parse_mode() {
        let args = Args::try_parse_from(["mlconsole", "--mode", "normal", "--api-url", "http://h:1"])
            .unwrap();
        assert_eq!(args.mode, ExchangeMode::Normal);
        assert_eq!(args.api_url, "http://h:1");
        assert!(Args::try_parse_from(["mlconsole", "--mode", "fast"]).is_err());
    }
}

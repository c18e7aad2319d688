use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use groupchat_core::session::SessionHandle;
use groupchat_service::HttpService;
use groupchat_tui::app::{App, AppOptions};
use groupchat_tui::config::ChatConfig;
use ratatui::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let config = ChatConfig::parse();
    init_tracing(&config)?;

    let token = config
        .bearer_token()
        .context("no credentials: pass --token (or GROUPCHAT_TOKEN) or --admin")?
        .to_string();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let session = SessionHandle::new();
    let service = Arc::new(HttpService::with_timeout(
        &config.server_url,
        session.clone(),
        config.timeout(),
    )?);
    let user = rt
        .block_on(service.sign_in(&token))
        .with_context(|| format!("sign-in rejected by {}", config.server_url))?;
    info!(uid = %user.uid, role = %user.role, "session started");

    let options = AppOptions {
        group: config.group.clone(),
        poll_interval: config.poll_interval(),
        download_dir: config.download_dir(),
    };
    let app = App::new(rt, service.clone(), service, user, options)?;

    let result = run_tui(app);
    session.sign_out();
    result
}

/// The terminal belongs to the UI, so logs only go to `--log-file`.
fn init_tracing(config: &ChatConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .init();
        }
    }
    Ok(())
}

fn run_tui(app: App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(ref e) = result {
        eprintln!("Error: {e}");
    }

    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| app.render(frame))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            // Ctrl+C always quits
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }
            // q quits unless we're in an input mode
            if key.code == KeyCode::Char('q') && !app.is_input_mode() {
                break;
            }
            app.handle_key(key);
        }
    }

    app.close();
    Ok(())
}

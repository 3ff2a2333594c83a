use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod api;
mod app;
mod config;
mod debounce;
mod error;
mod feed;
mod models;
mod palette;
mod prefs;
mod progress;
mod tui;

use api::ApiClient;
use app::App;
use config::Config;
use error::Result;
use tui::{draw, handle_key_event};

const LOG_PATH: &str = "/tmp/feedprism-errors.log";

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings and errors go to stderr and /tmp/feedprism-errors.log
    use std::fs::OpenOptions;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    let log_file = match OpenOptions::new().create(true).append(true).open(LOG_PATH) {
        Ok(file) => Some(std::sync::Arc::new(std::sync::Mutex::new(file))),
        Err(err) => {
            eprintln!("Warning: unable to open {LOG_PATH}: {err}");
            None
        }
    };

    struct DualWriter {
        file: Option<std::sync::Arc<std::sync::Mutex<std::fs::File>>>,
        tui_active: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl Write for DualWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(file) = &self.file {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(buf);
                }
            }
            // stderr would scribble over the alternate screen
            if self.tui_active.load(std::sync::atomic::Ordering::Relaxed) {
                return Ok(buf.len());
            }
            std::io::stderr().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            if let Some(file) = &self.file {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            std::io::stderr().flush()
        }
    }

    impl<'a> MakeWriter<'a> for DualWriter {
        type Writer = DualWriter;

        fn make_writer(&'a self) -> Self::Writer {
            DualWriter {
                file: self.file.clone(),
                tui_active: self.tui_active.clone(),
            }
        }
    }

    let tui_active = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let dual_writer = DualWriter {
        file: log_file,
        tui_active: tui_active.clone(),
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(dual_writer)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;

    // Headless modes print and exit
    match args.get(1).map(String::as_str) {
        Some("--health") => return print_health(&config).await,
        Some("--metrics") => return print_metrics(&config).await,
        Some("--recent") => {
            let limit = args.get(2).and_then(|n| n.parse().ok()).unwrap_or(10);
            return print_recent(&config, limit).await;
        }
        Some("--help") | Some("-h") => {
            println!("Usage: feedprism [--health | --metrics | --recent [N]]");
            println!("Backend: {} (set FEEDPRISM_API_URL to override)", config.api_base_url);
            return Ok(());
        }
        _ => {}
    }

    let mut app = App::new(&config).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    tui_active.store(true, std::sync::atomic::Ordering::Relaxed);

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    tui_active.store(false, std::sync::atomic::Ordering::Relaxed);
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        app.tick_spinner();

        // Drain finished fetches, extraction progress and preference changes
        app.poll_background();
        app.poll_progress();
        app.poll_preferences();

        app.check_status_timeout();

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(action) = handle_key_event(key, app.input_mode()) {
                    if app.handle_action(action)? {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn client(config: &Config) -> Result<ApiClient> {
    ApiClient::new(&config.api_base_url, config.request_timeout())
}

async fn print_health(config: &Config) -> Result<()> {
    let health = client(config)?.get_health().await?;
    println!("status:       {}", health.status);
    println!("vector store: {}", health.qdrant);
    println!("checked at:   {}", health.timestamp);
    if !health.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_metrics(config: &Config) -> Result<()> {
    let metrics = client(config)?.get_metrics(app::METRICS_DAYS).await?;
    println!("emails processed: {}", metrics.total_emails_processed);
    println!("items extracted:  {}", metrics.total_items_extracted);
    for category in &metrics.categories {
        println!("  {:<10} {}", category.category, category.count);
    }
    let tags: Vec<String> = metrics
        .top_tags_sorted(10)
        .into_iter()
        .map(|(tag, count)| format!("{tag}({count})"))
        .collect();
    if !tags.is_empty() {
        println!("top tags: {}", tags.join(" "));
    }
    Ok(())
}

async fn print_recent(config: &Config, limit: u32) -> Result<()> {
    let emails = client(config)?.get_recent_emails(limit).await?;
    for email in emails {
        let received = email
            .received_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{received:<16}  {:<24.24}  {}  [{} items]",
            email.sender, email.subject, email.extracted_count
        );
    }
    Ok(())
}

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

mod app;
mod assistant;
mod config;
mod handler;
mod logging;
mod session;
mod tui;
mod ui;

use app::App;
use assistant::AssistantClient;
use config::Config;
use session::Session;

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "sinhgad", version)]
#[command(about = "Terminal client for the SinhgadConnect campus assistant")]
struct Cli {
    /// Chat endpoint to POST questions to
    #[arg(long, global = true, env = "SINHGAD_CHAT_URL")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive assistant (default)
    Chat,
    /// Ask one question and print the answer
    Ask {
        /// Your question
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Show the saved configuration, optionally updating it
    Config {
        /// Save a new default chat endpoint
        #[arg(long)]
        set_endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(err) => (Config::new(), Some(err)),
    };
    let _log_guard = logging::init(&config);
    if let Some(err) = config_error {
        tracing::warn!(error = %err, "ignoring unreadable config");
        eprintln!("Warning: using default settings ({:#})", err);
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let client = build_client(&config, cli.endpoint.as_deref())?;
            run_tui(App::new(client, &config.web_base_url())).await
        }
        Commands::Ask { question } => {
            let client = build_client(&config, cli.endpoint.as_deref())?;
            ask_once(&client, &config.web_base_url(), &question.join(" ")).await
        }
        Commands::Config { set_endpoint } => show_config(set_endpoint),
    }
}

fn build_client(config: &Config, endpoint_override: Option<&str>) -> Result<AssistantClient> {
    let endpoint = config.resolve_endpoint(endpoint_override);
    let client = AssistantClient::with_timeout(&endpoint, config.request_timeout())?;
    tracing::info!(endpoint = client.endpoint(), "assistant endpoint");
    Ok(client)
}

async fn run_tui(mut app: App) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(TICK_RATE);

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn event_loop(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
        app.poll_chat_task().await;
    }
    Ok(())
}

async fn ask_once(client: &AssistantClient, web_base_url: &str, question: &str) -> Result<()> {
    let mut session = Session::new();
    if !session.submit(client, question).await {
        bail!("Nothing to ask: the question is empty");
    }

    let Some(reply) = session.transcript().last() else {
        bail!("No reply recorded");
    };

    println!("{}", reply.content);
    if let Some(mode) = reply.mode {
        println!("\n[{}]", mode.label());
    }
    if !reply.sources.is_empty() {
        println!("\nSources:");
        for source in &reply.sources {
            match source.post_url(web_base_url) {
                Some(url) => println!("  • {} ({})", source.display_title(), url),
                None => println!("  • {}", source.display_title()),
            }
        }
    }

    Ok(())
}

/// Works on the file itself rather than the startup fallback, so a broken
/// file is reported instead of being overwritten with defaults.
fn show_config(set_endpoint: Option<String>) -> Result<()> {
    let path = Config::get_config_path()?;

    let config = match set_endpoint {
        Some(endpoint) => {
            let config = Config::update_endpoint(&path, &endpoint)?;
            tracing::info!(path = %path.display(), "config saved");
            println!("Saved {}", path.display());
            config
        }
        None => {
            println!("{}", path.display());
            Config::load_from(&path)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

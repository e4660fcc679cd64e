// League desk entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file, stdout carries command output)
// 3. Load config, apply overrides
// 4. Open database
// 5. Run the subcommand: serve until Ctrl+C, or answer one request and exit

use std::sync::Arc;

use anyhow::Context;
use leaguedesk_server::app::App;
use leaguedesk_server::cli::{self, flag_pair, Command};
use leaguedesk_server::config;
use leaguedesk_server::context::RequestContext;
use leaguedesk_server::db;
use leaguedesk_server::import;
use leaguedesk_server::protocol::{BadgesQuery, CompareQuery, Request, Response};
use leaguedesk_server::ws_server;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse arguments
    let args = cli::parse_args();

    // 2. Initialize tracing
    init_tracing()?;
    info!("League desk starting up");

    // 3. Load config
    let mut config = config::load_config().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(
        "Config loaded: league={}, season={}, {} badges",
        config.league.name,
        config.league.season,
        config.badges.len()
    );

    // 4. Open database
    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let app = Arc::new(App::new(config, db));

    // 5. Run the subcommand
    match args.command() {
        Command::Serve => serve(app).await,
        Command::ImportRosters { path } => {
            let rosters = import::load_rosters(&path)?;
            let count = import::store_rosters(app.db(), &rosters)?;
            println!("Imported {count} rosters from {}", path.display());
            Ok(())
        }
        Command::ImportHistory { path } => {
            let records = import::load_history(&path)?;
            let count = import::store_history(app.db(), &records)?;
            println!("Imported {count} gameweeks from {}", path.display());
            Ok(())
        }
        Command::Compare {
            team1,
            team2,
            by_email,
            by_name,
        } => {
            let (search_by_email, search_by_name) = flag_pair(by_email, by_name);
            print_response(
                &app,
                Request::Compare(CompareQuery {
                    team1: Some(team1),
                    team2: Some(team2),
                    compare_all: false,
                    search_by_email,
                    search_by_name,
                }),
            )
        }
        Command::Scan { by_email, by_name } => {
            let (search_by_email, search_by_name) = flag_pair(by_email, by_name);
            print_response(
                &app,
                Request::Compare(CompareQuery {
                    compare_all: true,
                    search_by_email,
                    search_by_name,
                    ..CompareQuery::default()
                }),
            )
        }
        Command::Badges { user } => print_response(
            &app,
            Request::Badges(BadgesQuery {
                user_id: Some(user),
            }),
        ),
    }
}

/// Serve WebSocket clients until Ctrl+C.
async fn serve(app: Arc<App>) -> anyhow::Result<()> {
    let port = app.config().port;
    let listener = ws_server::bind(port)
        .await
        .with_context(|| format!("failed to bind WebSocket server on port {port}"))?;

    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, app).await {
            error!("WebSocket server error: {}", e);
        }
    });

    println!("League desk listening on ws://127.0.0.1:{port} (Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    // The accept loop runs forever.
    ws_handle.abort();

    info!("League desk shut down cleanly");
    Ok(())
}

/// Run one request and print its JSON response to stdout.
fn print_response(app: &App, request: Request) -> anyhow::Result<()> {
    let ctx = RequestContext::new("cli");
    let response = app.dispatch(&ctx, request);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Response::Error(body) = &response {
        anyhow::bail!("request failed ({} {}): {}", body.status, body.code, body.message);
    }
    Ok(())
}

/// Initialize tracing to log to a file (stdout is reserved for command output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("leaguedesk.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leaguedesk=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

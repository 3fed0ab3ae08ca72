// Ballot client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open the local store
// 4. Viewer mode: build the API client, signal bus and AppState, spawn the
//    app loop, then read commands from stdin
//    Admin mode: build the admin controller and run its console
// 5. Cleanup on exit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use ballot_app::admin::AdminController;
use ballot_app::api::admin::{AdminClient, HttpAdminTransport};
use ballot_app::api::HttpApi;
use ballot_app::app::{self, AppState};
use ballot_cli::console::{ConsoleRenderer, ViewContext};
use ballot_cli::{admin, input};
use ballot_core::bus::{SignalBus, StoreSignalBus};
use ballot_core::config::{self, Config};
use ballot_core::local::UserKey;
use ballot_core::storage::{KeyValueStore, SqliteStore};

enum Mode {
    Viewer,
    Admin,
}

fn parse_mode() -> anyhow::Result<Mode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => Ok(Mode::Viewer),
        Some("admin") => Ok(Mode::Admin),
        Some(other) => bail!("unknown argument `{other}` (usage: ballot [admin])"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Ballot client starting up");

    let mode = parse_mode()?;

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!("Config loaded: server={}", config.server.base_url);

    // 3. Open the local store
    let store = open_store(&config)?;

    // 4. Run the selected front end
    match mode {
        Mode::Viewer => run_viewer(&config, store).await,
        Mode::Admin => run_admin(&config, store).await,
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let path: PathBuf = config.storage.resolved_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&path.to_string_lossy()).context("failed to open local store")?;
    info!("Local store opened at {}", path.display());
    Ok(Arc::new(store))
}

async fn run_viewer(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<()> {
    let user_key =
        UserKey::load_or_create(store.as_ref()).context("failed to load user key")?;
    let api = HttpApi::new(&config.server.base_url, config.server.request_timeout())
        .context("failed to build HTTP client")?;

    let bus = StoreSignalBus::new(Arc::clone(&store), config.sync.signal_check_interval());
    let signal_rx = bus.subscribe();

    let (events_tx, events_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (context_tx, context_rx) = watch::channel(ViewContext::default());

    let renderer = ConsoleRenderer::new(std::io::stdout(), context_tx);
    let state = AppState::new(
        Arc::new(api),
        store,
        user_key,
        Box::new(renderer),
        events_tx,
        config.sync.poll_interval(),
    );

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, events_rx, signal_rx, state).await {
            error!("Application loop error: {e}");
        }
    });

    info!("Viewer ready");
    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = input::read_user_commands(stdin, std::io::stderr(), cmd_tx, context_rx).await
    {
        error!("Input error: {e}");
    }

    // 5. Cleanup: wait for the app task to finish (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Ballot client shut down cleanly");
    Ok(())
}

async fn run_admin(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<()> {
    let Some(cookie) = config.credentials.admin_session_cookie.clone() else {
        bail!("admin_session_cookie is not set in config/credentials.toml");
    };
    let transport = HttpAdminTransport::new(
        &config.server.base_url,
        Some(cookie),
        config.server.request_timeout(),
    )
    .context("failed to build HTTP client")?;
    let bus: Arc<dyn SignalBus> = Arc::new(StoreSignalBus::new(
        Arc::clone(&store),
        config.sync.signal_check_interval(),
    ));
    let mut controller = AdminController::new(AdminClient::new(transport), bus, store);

    info!("Admin console ready");
    let stdin = BufReader::new(tokio::io::stdin());
    admin::run_admin(&mut controller, stdin, std::io::stdout()).await?;

    info!("Ballot admin shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which the console
/// front end writes to).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("ballot.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ballot=info,warn")),
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

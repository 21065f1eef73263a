use std::sync::Arc;

use image_agent::account;
use image_agent::chat::ChatLoop;
use image_agent::config::AgentConfig;
use image_agent::notify::{spawn_payment_forwarder, Notifier};
use image_agent::remote::{payment_channel, JobClient, McpJobClient};
use image_agent::server::agent_routes;
use image_agent::store::{Database, LibSqlBackend};
use image_agent::task::{spawn_poll_pump, LifecycleManager, PollScheduler, TokioScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Resolve the account credential up front; nothing works without it.
    let account = account::resolve_from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export {}=<connection URL or JSON credential>", account::CONNECTION_ENV_VAR);
        std::process::exit(1);
    });

    eprintln!("🖼  Image Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Account: {}", account.account_id);
    eprintln!("   WS: ws://0.0.0.0:{}/ws", config.ws_port);
    eprintln!("   API: http://0.0.0.0:{}/api/tasks", config.ws_port);
    eprintln!("   Type an image prompt and press Enter. /tasks to list, /quit to exit.\n");

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap_or_else(
        |e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        },
    ));
    eprintln!("   Database: {}", config.db_path);

    // ── Notifications ────────────────────────────────────────────────────
    let notifier = Notifier::new(Arc::clone(&db));

    // ── Remote client + payment forwarding ───────────────────────────────
    let (payments_tx, payments_rx) = payment_channel();
    let client: Arc<dyn JobClient> = Arc::new(McpJobClient::new(
        account,
        config.image_service_url.clone(),
        config.filestore_service_url.clone(),
        payments_tx,
    ));
    let _payment_handle = spawn_payment_forwarder(Arc::clone(&notifier), payments_rx);

    // ── Lifecycle manager + poll pump ────────────────────────────────────
    let (scheduler, poll_rx) = TokioScheduler::new();
    let scheduler: Arc<dyn PollScheduler> = Arc::new(scheduler);
    let manager = LifecycleManager::new(
        Arc::clone(&db),
        client,
        scheduler,
        Arc::clone(&notifier),
        config.clone(),
    );
    let _pump_handle = spawn_poll_pump(Arc::clone(&manager), poll_rx);

    // ── Startup recovery: resume polling for tasks left running ──────────
    let recovered = manager.recover().await;
    if recovered > 0 {
        eprintln!("   Recovered {} running task(s) from DB", recovered);
    }

    // ── WS/REST server ───────────────────────────────────────────────────
    let app = agent_routes(
        Arc::clone(&manager),
        Arc::clone(&db),
        Arc::clone(&notifier),
    );
    let ws_port = config.ws_port;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", ws_port))
            .await
            .expect("Failed to bind server port");
        tracing::info!(port = ws_port, "WebSocket server started");
        axum::serve(listener, app).await.ok();
    });

    // ── Chat loop ────────────────────────────────────────────────────────
    ChatLoop::new(manager, db, notifier).run().await;

    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use roster_api::AppStateInner;
use roster_notify::{LogMailer, Notifier};
use roster_store::{SqliteStore, Store};
use roster_types::Config;
use roster_users::UserService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster=debug,roster_users=debug,roster_notify=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.user_table.is_empty() {
        warn!("ROSTER_USER_TABLE is blank; every user request will fail");
    }

    let store = SqliteStore::open(&config.db_path)?;
    let shutdown = CancellationToken::new();

    // Activation mail rides on the store's change stream
    let notifier = Notifier::new(
        LogMailer,
        &config.activation_url,
        config.email_sender.clone(),
        config.user_table.clone(),
    )?;
    let notifier_task = tokio::spawn(notifier.run(store.subscribe(), shutdown.clone()));

    let state = Arc::new(AppStateInner {
        users: UserService::new(Arc::new(store) as Arc<dyn Store>),
        user_table: config.user_table.clone(),
        shutdown: shutdown.clone(),
    });

    let app = roster_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Roster server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    notifier_task.await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
    shutdown.cancel();
}

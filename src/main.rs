//! EventSub Relay server
//!
//! Serves the webhook endpoint plus health/status routes, and runs the
//! subscription socket listener when credentials and broadcasters are set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use eventsub_relay::config::RelayConfig;
use eventsub_relay::dispatch::LoggingHandler;
use eventsub_relay::handlers::{status_router, RelayStats};
use eventsub_relay::socket::SocketListener;
use eventsub_relay::webhook::{webhook_router, WebhookReceiver};

/// EventSub Relay
#[derive(Parser, Debug)]
#[command(name = "eventsub-relay")]
#[command(version)]
#[command(about = "Authenticated EventSub webhook and socket ingestion")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// How long the listener gets to finish after a shutdown signal
const LISTENER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let stats = Arc::new(RelayStats::new());

    let receiver = WebhookReceiver::new(&config.webhook)?.with_stats(stats.clone());
    receiver.register(config.listener.event_type.as_str(), LoggingHandler);
    let receiver = Arc::new(receiver);

    let listener = match SocketListener::from_relay_config(&config)? {
        Some(listener) => {
            let listener = Arc::new(listener.with_stats(stats.clone()));

            let ids = config.broadcaster_ids.clone();
            let task = {
                let listener = listener.clone();
                tokio::spawn(async move { listener.run(&ids, Arc::new(LoggingHandler)).await })
            };
            Some((listener, task))
        }
        None => {
            tracing::info!("Socket listener disabled (needs EVENTSUB_CLIENT_ID and EVENTSUB_BROADCASTER_IDS)");
            None
        }
    };

    let app = webhook_router(receiver, &config.webhook.path)
        .merge(status_router(stats))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", args.host, args.port);
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(
        "EventSub Relay listening on {} (webhook path {})",
        addr,
        config.webhook.path
    );

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some((listener, mut task)) = listener {
        listener.stop();
        if tokio::time::timeout(LISTENER_SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("Socket listener still blocked on a read; aborting");
            task.abort();
        }
    }

    tracing::info!("EventSub Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

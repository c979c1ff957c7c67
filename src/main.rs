use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notifyd::client::listener::StreamClient;
use notifyd::client::store::NotificationStore;
use notifyd::identity::{ttl_from_minutes, JwtIdentity};
use notifyd::{api, config, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // Export spans over OTLP only when a collector is configured
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "notifyd"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "notifyd=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Watch {
            url,
            token,
            user,
            min_backoff_secs,
            max_backoff_secs,
        }) => {
            run_watch(
                url,
                token,
                user,
                Duration::from_secs(min_backoff_secs),
                Duration::from_secs(max_backoff_secs),
            )
            .await
        }
        Some(cli::Commands::Token { user, ttl_minutes }) => {
            let identity = JwtIdentity::new(&cfg.jwt_secret);
            let token = identity.mint(&user, ttl_from_minutes(ttl_minutes)?)?;
            println!("{}", token);
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(
        max_subscriptions = cfg.max_subscriptions,
        stream_buffer = cfg.stream_buffer,
        "Initializing event bus..."
    );
    let state = Arc::new(AppState::new(cfg));
    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("notifyd listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("notifyd stopped");
    Ok(())
}

async fn run_watch(
    url: String,
    token: String,
    user: String,
    min_backoff: Duration,
    max_backoff: Duration,
) -> anyhow::Result<()> {
    let store = Arc::new(NotificationStore::new(user));
    let mut updates = store.subscribe();
    let client = StreamClient::new(url, token, store).with_backoff(min_backoff, max_backoff);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = *updates.borrow_and_update();
            println!("unread: {} (hasUnread: {})", state.count(), state.has_unread());
        }
    });

    client.run(stop_rx).await;

    // Dropping the client drops the store, which ends the printer loop
    drop(client);
    let _ = printer.await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

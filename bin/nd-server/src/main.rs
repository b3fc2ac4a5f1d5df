//! nats-dispatch server
//!
//! Serves the cats subscriptions over NATS until SIGINT/SIGTERM, then drains
//! the subscriptions and flushes the connection.
//!
//! Subcommands:
//! - `serve` (default): run the service
//! - `request <subject> --data <json>`: send one reply-style request and print the reply
//! - `example-config`: print a documented config file

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{error, info, warn};

use nd_cats::{register_subscriptions, CatService};
use nd_config::{AppConfig, ConfigLoader};
use nd_dispatch::{
    DispatchClient, DispatchMetrics, Dispatcher, NatsConnectOptions, NatsTransport, ReplyOutcome, ReplyRequest,
    SubscriptionRegistry,
};

/// NATS JSON message dispatch service
#[derive(Parser, Debug)]
#[command(name = "nd-server")]
#[command(about = "NATS JSON message dispatch service")]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "ND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registered subscriptions
    Serve,
    /// Send one reply-style request and print the reply
    Request {
        /// Target subject, e.g. find.ads-kotlin-service-template.cats
        subject: String,

        /// JSON placed in the request's `data` field
        #[arg(long, default_value = "{}")]
        data: String,

        /// Overrides nats.request_timeout_ms
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Serve);

    if let Command::ExampleConfig = command {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    nd_common::logging::init_logging("nd-server");

    let loader = match args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;

    match command {
        Command::Request {
            subject,
            data,
            timeout_ms,
        } => send_request(&config, &subject, &data, timeout_ms).await,
        _ => serve(config).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!(
        service = %config.service.name,
        queue_group = %config.nats.queue_group,
        "Starting nats-dispatch server"
    );

    if config.metrics.enabled {
        install_metrics_exporter(&config.metrics.listen_addr)?;
    } else {
        info!("Metrics exporter disabled");
    }

    let transport = Arc::new(NatsTransport::connect(connect_options(&config)).await?);

    let mut registry = SubscriptionRegistry::new(config.nats.queue_group.clone());
    register_subscriptions(&mut registry, &config.service.name, Arc::new(CatService::default()))?;

    let dispatcher = Arc::new(Dispatcher::new(registry, transport.clone()));
    let handle = transport.serve(dispatcher.clone()).await?;
    info!(subjects = dispatcher.registry().len(), "nats-dispatch server ready");

    shutdown_signal().await;
    info!("Shutdown signal received, draining subscriptions");

    handle.shutdown().await;
    if let Err(e) = transport.flush().await {
        warn!(error = %e, "Failed to flush NATS connection");
    }

    info!(
        handled = dispatcher.metrics().total_success(),
        failed = dispatcher.metrics().total_failure(),
        "nats-dispatch server stopped"
    );
    Ok(())
}

async fn send_request(config: &AppConfig, subject: &str, data: &str, timeout_ms: Option<u64>) -> Result<()> {
    let data: serde_json::Value = serde_json::from_str(data).context("--data must be valid JSON")?;
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.nats.request_timeout());

    let transport = Arc::new(NatsTransport::connect(connect_options(config)).await?);
    let client = DispatchClient::new(transport, timeout);

    let request = ReplyRequest::new(data);
    info!(subject, correlation_id = %request.correlation_id, "Sending request");

    match client.request_json(subject, &request).await? {
        ReplyOutcome::Success(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        ReplyOutcome::Error(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Err(anyhow::anyhow!("Request failed with {}", reply.error.name))
        }
    }
}

fn connect_options(config: &AppConfig) -> NatsConnectOptions {
    NatsConnectOptions {
        servers: config.nats.server_urls(),
        connection_name: config.nats.connection_name.clone(),
        max_reconnects: config.nats.max_reconnects,
    }
}

fn install_metrics_exporter(listen_addr: &str) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", listen_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    DispatchMetrics::describe();

    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! wsgate CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::signal;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;
use wsgate::auth::ExpectedToken;
use wsgate::server::{GatewayConfig, GatewayServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            auth_url,
            auth_timeout_ms,
            broadcast_ms,
            expected_token,
            no_token_route,
        } => {
            let config = GatewayConfig {
                bind_addr: bind.parse().context("Invalid bind address")?,
                auth_url,
                auth_timeout: Duration::from_millis(auth_timeout_ms),
                broadcast_period: Duration::from_millis(broadcast_ms),
                expected_token: (!no_token_route).then(|| ExpectedToken::new(expected_token)),
                ..GatewayConfig::default()
            };
            serve(config).await
        }
        Commands::Probe {
            url,
            token,
            message,
            duration_secs,
        } => probe(&url, token.as_deref(), message, Duration::from_secs(duration_secs)).await,
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let server = GatewayServer::new(config);

    info!("Starting gateway...");
    server
        .run(shutdown_signal())
        .await
        .context("Gateway server failed")?;

    Ok(())
}

async fn probe(url: &str, token: Option<&str>, message: String, duration: Duration) -> Result<()> {
    let mut url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    let (stream, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(tungstenite::Error::Http(response)) => {
            warn!(status = %response.status(), "Handshake rejected");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to connect"),
    };

    info!(url = %url, "Connected");
    let (mut sender, mut receiver) = stream.split();

    sender
        .send(Message::Text(message.into()))
        .await
        .context("Failed to send message")?;

    let read_loop = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => info!(text = text.as_str(), "Received"),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Connection error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = read_loop => info!("Connection closed"),
        _ = tokio::time::sleep(duration) => {
            let _ = sender.send(Message::Close(None)).await;
            info!("Probe finished");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}

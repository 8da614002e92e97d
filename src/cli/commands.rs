//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wsgate")]
#[command(about = "Token-authenticated WebSocket gateway", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (used when RUST_LOG is not set)
    #[arg(long, env = "WSGATE_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:3000", env = "WSGATE_BIND")]
        bind: String,

        /// Authorization check endpoint (defaults to this server's own /token route)
        #[arg(long, env = "WSGATE_AUTH_URL")]
        auth_url: Option<String>,

        /// Authorization timeout in milliseconds
        #[arg(long, default_value_t = 5000, env = "WSGATE_AUTH_TIMEOUT_MS")]
        auth_timeout_ms: u64,

        /// Broadcast period in milliseconds
        #[arg(long, default_value_t = 4000, env = "WSGATE_BROADCAST_MS")]
        broadcast_ms: u64,

        /// Token accepted by the built-in /token check route
        #[arg(long, default_value = "token", env = "WSGATE_EXPECTED_TOKEN")]
        expected_token: String,

        /// Disable the built-in /token check route
        #[arg(long)]
        no_token_route: bool,
    },

    /// Connect a test client and log everything it receives
    ///
    /// Examples:
    ///   wsgate probe --token token
    ///   wsgate probe --url ws://127.0.0.1:3000 --message hi --duration-secs 10
    Probe {
        /// Gateway URL
        #[arg(long, default_value = "ws://127.0.0.1:3000")]
        url: String,

        /// Token to present (omitted from the query when not given)
        #[arg(long)]
        token: Option<String>,

        /// Message sent once the channel opens
        #[arg(long, default_value = "hello")]
        message: String,

        /// How long to stay connected
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
    },
}

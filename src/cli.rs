use clap::{Parser, Subcommand};

/// notifyd — real-time unread-message notifications
#[derive(Parser)]
#[command(name = "notifyd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the notification server
    Serve {
        /// Port to bind (defaults to NOTIFY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Follow a notification stream and print unread-count changes
    Watch {
        /// Stream URL
        #[arg(long, default_value = "http://127.0.0.1:8080/api/v1/notifications/stream")]
        url: String,
        /// Bearer token
        #[arg(long, env = "NOTIFY_TOKEN")]
        token: String,
        /// User id the token was issued for (self-authored messages are not counted)
        #[arg(long)]
        user: String,
        /// First reconnect delay in seconds (never below 1)
        #[arg(long, default_value = "1")]
        min_backoff_secs: u64,
        /// Longest reconnect delay in seconds
        #[arg(long, default_value = "30")]
        max_backoff_secs: u64,
    },

    /// Mint a development bearer token signed with NOTIFY_JWT_SECRET
    Token {
        #[arg(long)]
        user: String,
        /// Lifetime in minutes
        #[arg(long, default_value = "60")]
        ttl_minutes: i64,
    },
}

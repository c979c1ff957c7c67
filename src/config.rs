use serde::Deserialize;

use crate::bus::DEFAULT_MAX_SUBSCRIPTIONS;

const PLACEHOLDER_SECRET: &str = "CHANGE_ME_NOTIFY_JWT_SECRET";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// HS256 secret shared with the identity provider that issues bearers.
    pub jwt_secret: String,
    /// Ceiling on concurrent notification streams per process.
    /// Set via NOTIFY_MAX_SUBSCRIPTIONS. Default: 100.
    pub max_subscriptions: usize,
    /// Frames buffered per stream before the oldest is dropped.
    pub stream_buffer: usize,
    /// Seconds between keep-alive comments on an idle stream.
    pub keepalive_secs: u64,
    pub allowed_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            jwt_secret: PLACEHOLDER_SECRET.into(),
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            stream_buffer: 64,
            keepalive_secs: 15,
            allowed_origin: "http://localhost:3000".into(),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let jwt_secret = std::env::var("NOTIFY_JWT_SECRET").unwrap_or_else(|_| PLACEHOLDER_SECRET.into());

    if jwt_secret == PLACEHOLDER_SECRET {
        let env_mode = std::env::var("NOTIFY_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "NOTIFY_JWT_SECRET is still the insecure placeholder. \
                 Set the identity provider's signing secret before running in production."
            );
        }
        eprintln!("⚠️  NOTIFY_JWT_SECRET is not set — using insecure placeholder. Do not use in production.");
    }

    let max_subscriptions = env_or("NOTIFY_MAX_SUBSCRIPTIONS", defaults.max_subscriptions);
    if max_subscriptions == 0 {
        anyhow::bail!("NOTIFY_MAX_SUBSCRIPTIONS must be at least 1");
    }

    Ok(Config {
        port: env_or("NOTIFY_PORT", defaults.port),
        jwt_secret,
        max_subscriptions,
        stream_buffer: env_or("NOTIFY_STREAM_BUFFER", defaults.stream_buffer).max(1),
        keepalive_secs: env_or("NOTIFY_KEEPALIVE_SECS", defaults.keepalive_secs).max(1),
        allowed_origin: std::env::var("NOTIFY_ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
    })
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

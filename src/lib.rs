//! notifyd — real-time unread-message notifications.
//!
//! Message writes publish onto an in-process [`bus::EventBus`]; each open
//! SSE connection holds a [`stream::session::StreamSession`] subscribed to
//! it; clients fold the stream into a [`client::store::NotificationStore`].

use std::sync::Arc;

pub mod api;
pub mod bus;
pub mod client;
pub mod config;
pub mod errors;
pub mod identity;
pub mod models;
pub mod stream;
pub mod wire;

use bus::EventBus;
use identity::{IdentityProvider, JwtIdentity};
use stream::directory::{ChannelDirectory, OpenDirectory};

/// Shared application state passed to handlers.
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub identity: Arc<dyn IdentityProvider>,
    pub directory: Arc<dyn ChannelDirectory>,
    pub config: config::Config,
}

impl AppState {
    /// State with HS256 bearer verification and open channel membership.
    pub fn new(config: config::Config) -> Self {
        Self {
            bus: Arc::new(EventBus::new(config.max_subscriptions)),
            identity: Arc::new(JwtIdentity::new(&config.jwt_secret)),
            directory: Arc::new(OpenDirectory),
            config,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn ChannelDirectory>) -> Self {
        self.directory = directory;
        self
    }
}

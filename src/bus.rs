//! In-process event bus: synchronous fan-out of [`NotificationEvent`]s.
//!
//! The bus is constructed once at startup and shared through `AppState`.
//! It keeps no history: an event published while nobody is listening is
//! dropped. Listeners are invoked in registration order from the publishing
//! task, against a snapshot of the listener list, so the lock is never held
//! while a listener runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::models::event::NotificationEvent;

/// Default ceiling on concurrent subscriptions.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 100;

pub type Listener = Arc<dyn Fn(&Arc<NotificationEvent>) + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("subscription limit reached ({limit} active listeners)")]
    CapacityExceeded { limit: usize },
}

/// Opaque handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionHandle, Listener)>>,
    next_id: AtomicU64,
    max_subscriptions: usize,
}

impl EventBus {
    pub fn new(max_subscriptions: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            max_subscriptions,
        }
    }

    /// Deliver `event` to every currently registered listener.
    /// Returns how many listeners were invoked.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        let event = Arc::new(event);
        let snapshot: Vec<Listener> = self
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        if snapshot.is_empty() {
            tracing::debug!(kind = event.kind(), "no listeners, event dropped");
            return 0;
        }

        for listener in &snapshot {
            listener(&event);
        }
        tracing::trace!(kind = event.kind(), listeners = snapshot.len(), "event published");
        snapshot.len()
    }

    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&Arc<NotificationEvent>) + Send + Sync + 'static,
    {
        let mut listeners = self.write();
        if listeners.len() >= self.max_subscriptions {
            tracing::warn!(
                limit = self.max_subscriptions,
                "event bus subscription limit reached, rejecting listener"
            );
            return Err(BusError::CapacityExceeded {
                limit: self.max_subscriptions,
            });
        }

        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        listeners.push((handle, Arc::new(listener)));
        Ok(handle)
    }

    /// Remove a listener. Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listeners = self.write();
        match listeners.iter().position(|(h, _)| *h == handle) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Like [`subscribe`](Self::subscribe), but the listener is removed when
    /// the returned guard is dropped.
    pub fn subscribe_scoped<F>(self: &Arc<Self>, listener: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Arc<NotificationEvent>) + Send + Sync + 'static,
    {
        let handle = self.subscribe(listener)?;
        Ok(Subscription {
            bus: Arc::clone(self),
            handle,
        })
    }

    pub fn listener_count(&self) -> usize {
        self.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.max_subscriptions
    }

    // A listener that panicked mid-publish never held the lock, so a
    // poisoned guard still protects a consistent list.
    fn read(&self) -> RwLockReadGuard<'_, Vec<(SubscriptionHandle, Listener)>> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(SubscriptionHandle, Listener)>> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBSCRIPTIONS)
    }
}

/// RAII subscription: unsubscribes from the bus on drop.
pub struct Subscription {
    bus: Arc<EventBus>,
    handle: SubscriptionHandle,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.handle);
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::models::event::NotificationEvent;

/// Bounded per-connection queue between the bus and a stream writer.
///
/// `push` never blocks: when the queue is full the oldest frame is dropped.
/// There is a single consumer per buffer.
pub struct FrameBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Arc<NotificationEvent>>,
    dropped: u64,
    closed: bool,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                ..Inner::default()
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a frame. Returns `false` if the buffer is closed.
    pub fn push(&self, event: Arc<NotificationEvent>) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            if inner.queue.len() >= self.capacity {
                inner.queue.pop_front();
                inner.dropped += 1;
            }
            inner.queue.push_back(event);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next frame. Returns `None` once the buffer is closed.
    pub async fn recv(&self) -> Option<Arc<NotificationEvent>> {
        loop {
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(event) = inner.queue.pop_front() {
                    return Some(event);
                }
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Frames discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Close the buffer, discard pending frames and wake the consumer.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.queue.clear();
            inner.queue.shrink_to_fit();
        }
        self.notify.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Chat ingestion buffer.
//!
//! Collects inbound chat events between summarization cycles. The buffer is
//! an explicit component instance shared by handle between the ingestion
//! path (appends) and the scheduler path (drains); a single coarse lock
//! around both guarantees no event is ever both summarized and left behind,
//! and none is dropped between read and clear.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::types::ChatEvent;

#[derive(Default)]
struct BufferInner {
    events: Vec<ChatEvent>,
    /// When the current window opened (first append after a drain).
    opened_at: Option<DateTime<Utc>>,
}

/// In-memory ordered buffer of chat events awaiting transfer-tier
/// summarization.
#[derive(Default)]
pub struct ChatBuffer {
    inner: Mutex<BufferInner>,
}

impl ChatBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chat event. Returns the buffered count after the append.
    pub fn append(&self, event: ChatEvent) -> Result<usize> {
        if event.content.trim().is_empty() {
            return Err(Error::EmptyEvent);
        }

        let mut inner = self.lock()?;
        if inner.events.is_empty() {
            inner.opened_at = Some(event.timestamp);
        }
        inner.events.push(event);
        Ok(inner.events.len())
    }

    /// Atomically take and clear the buffered events, closing the window.
    pub fn drain(&self) -> Result<Vec<ChatEvent>> {
        let mut inner = self.lock()?;
        inner.opened_at = None;
        Ok(std::mem::take(&mut inner.events))
    }

    /// Put drained events back at the front of the queue.
    ///
    /// Used when the summarization engine fails after a drain, so chat
    /// content is retried on the next cycle instead of silently lost.
    pub fn restore(&self, events: Vec<ChatEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut inner = self.lock()?;
        let opened_at = events.first().map(|e| e.timestamp);
        let newer = std::mem::replace(&mut inner.events, events);
        inner.events.extend(newer);
        if inner.opened_at.is_none() || inner.opened_at > opened_at {
            inner.opened_at = opened_at;
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.events.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.events.is_empty())
    }

    /// Age of the current window, if any events are buffered.
    pub fn age(&self, now: DateTime<Utc>) -> Result<Option<Duration>> {
        Ok(self.lock()?.opened_at.map(|opened| now - opened))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BufferInner>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }
}

//! Application state.

use std::sync::Arc;
use std::time::Instant;

use chronicle_core::{ChatBuffer, ControlChannel, TierStore};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Chat ingestion buffer, shared with the scheduler
    pub buffer: Arc<ChatBuffer>,
    /// Tier store client
    pub store: Arc<dyn TierStore>,
    /// Operator control-signal channel
    pub signals: Arc<dyn ControlChannel>,
    /// Server start time (health uptime)
    pub start_time: Instant,
}

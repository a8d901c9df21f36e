//! Summarization engine boundary.
//!
//! The engine is an external collaborator: given a transcript and the tier
//! being produced, it returns free-text prose. Failure is a typed result at
//! this boundary — the pipeline never scans summary text for error markers.

mod gemini;

pub use gemini::{GeminiConfig, GeminiEngine};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::MemoryTier;

/// A transcript handed to the engine, with the tier it will become.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// Framing instructions plus the rendered source material.
    pub transcript: String,
    /// Destination tier, passed through as a hint for model selection
    /// and observability.
    pub tier: MemoryTier,
}

/// Why a summarization attempt produced no usable prose.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine returned no usable text")]
    Empty,

    #[error("engine flagged the request: {0}")]
    Flagged(String),

    #[error("engine transport failed: {0}")]
    Transport(String),

    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
}

/// External summarization collaborator.
///
/// Implementations may be non-deterministic and may fail; the pipeline's
/// only recovery is to preserve its sources and retry on the next run.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> std::result::Result<String, EngineError>;
}

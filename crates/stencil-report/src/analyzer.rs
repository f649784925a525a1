//! Optional AI-assisted fault analysis.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an analysis capability.
///
/// Analyzer failures are always caught by the report builder; they never
/// propagate out of the reporting path.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The capability is configured but currently unreachable.
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    /// The capability ran but failed to produce a narrative.
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// An external capability that narrates template failures.
///
/// Implementations receive a fully assembled prompt (role instruction,
/// failing script, cleaned fault, earlier phase errors, and a data-context
/// inventory) and return a plain-text narrative.
#[async_trait]
pub trait FaultAnalyzer: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalyzerError>;
}

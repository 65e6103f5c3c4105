use thiserror::Error;

/// Failure taxonomy for the triage pipeline.
///
/// Item-level failures (`GenerationFailure`) are accumulated into per-phase
/// summaries and never propagate past the pipeline; only configuration-level
/// failures reach the process boundary with a non-zero exit.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("backend `{root}` unavailable: {reason}")]
    BackendUnavailable { root: String, reason: String },
    #[error("no notes source available: every configured root is unreachable")]
    NoSourceAvailable,
    #[error(
        "no unanalyzed notes found in any configured root; image/PDF files need a sync pass to convert them to text first"
    )]
    NothingToProcess,
    #[error("model call failed: {0}")]
    GenerationFailure(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

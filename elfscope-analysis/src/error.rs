use thiserror::Error;

/// Errors the analyzer surfaces. Decode-level and heuristic-level
/// uncertainty never reaches here — it is encoded in the result
/// (`dynamic_alloca`, confidence fields, `@unresolved` nodes) instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("function not found: {0}")]
    UnknownFunction(String),

    #[error("analysis aborted: {0}")]
    AnalysisAborted(String),
}

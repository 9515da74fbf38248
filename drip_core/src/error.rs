use thiserror::Error;

/// Outcome classes of every controller operation.
///
/// Validation, Conflict and Configuration errors reject a command without
/// touching state. TransientIo is logged and the affected sample or report is
/// dropped. Fatal means the process should exit and be restarted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DripError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transient io error: {0}")]
    TransientIo(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl DripError {
    /// Errors that reject a command outright, as opposed to I/O trouble.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::Configuration(_)
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing valves")]
    MissingValves,
    #[error("missing publisher")]
    MissingPublisher,
    #[error("missing config store")]
    MissingStore,
}

pub type Result<T, E = DripError> = std::result::Result<T, E>;

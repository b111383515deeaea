use thiserror::Error;

/// Error kinds surfaced by coordinator operations. The HTTP layer maps each
/// variant onto a status code; display strings are shown to the caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("storage failure")]
    Storage(#[from] anyhow::Error),
}

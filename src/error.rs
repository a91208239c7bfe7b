use thiserror::Error;

/// Result type alias for gradebook core operations.
pub type GradebookResult<T> = Result<T, GradebookError>;

/// Error taxonomy surfaced by the core. The IPC layer translates these into
/// protocol codes; nothing here is retried internally.
#[derive(Error, Debug)]
pub enum GradebookError {
    /// A referenced section/assignment/term/enrollment/grade id does not resolve.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The actor lacks ownership/enrollment for the target. Never collapsed
    /// into NotFound: the target may well exist.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed input: empty title, invalid date, out-of-range score.
    #[error("{0}")]
    Validation(String),

    /// The request is valid but collides with existing data, e.g. deleting
    /// an assignment that still has recorded scores.
    #[error("{0}")]
    Conflict(String),

    /// Persistence failure from the entity store.
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl GradebookError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

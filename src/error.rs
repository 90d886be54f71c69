//! Error types for the referral engine
//!
//! Store errors keep unique-constraint conflicts distinct from transport
//! failures so callers can turn a racy double-submit into a duplicate
//! rejection instead of a retry storm.

use thiserror::Error;

/// Errors surfaced by the attribution store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate edge, duplicate
    /// user id or referral token). Never retried automatically.
    #[error("duplicate {entity}")]
    Conflict { entity: &'static str },

    /// The row a mutation depended on does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The store could not be reached or the query failed outright.
    /// Fatal to the in-flight request only.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl StoreError {
    /// Map a sqlx error from a write path, separating unique violations
    /// from everything else. Write paths call this with the entity they
    /// were inserting; there is no blanket `From` impl.
    pub fn from_sqlx(entity: &'static str, err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation {
                return StoreError::Conflict { entity };
            }
        }
        StoreError::Unavailable(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by the event-facing engine. Validation failures are not
/// errors; they come back as rejected outcomes with a reason.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ran out of retries while looking for a free referral token.
    #[error("could not allocate a referral token for user {user_id}")]
    TokenAllocation { user_id: i64 },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

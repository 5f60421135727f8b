use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

type BoxedSource = Box<dyn Error + Send + Sync>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: BoxedSource,
    },
    /// A unit of work was refused and rolled back; nothing it staged persists.
    #[error("transaction aborted: {message}")]
    Aborted {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        StorageError::Aborted {
            message: message.into(),
            source: None,
        }
    }

    /// Like [`StorageError::aborted`], keeping the backend failure as the source.
    pub fn aborted_by(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Aborted {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, StorageError::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn aborted_errors_keep_their_cause() {
        let err = StorageError::aborted_by("bulk insert", io::Error::other("duplicate key"));
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "transaction aborted: bulk insert");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("duplicate key")
        );
    }

    #[test]
    fn plain_aborts_have_no_source() {
        let err = StorageError::aborted("rejected");
        assert!(err.source().is_none());
        assert!(!StorageError::unavailable("ping", io::Error::other("down")).is_aborted());
    }
}

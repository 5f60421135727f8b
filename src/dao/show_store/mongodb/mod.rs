mod config;
mod connection;
mod error;
mod models;
pub mod store;
mod transaction;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoShowStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Transaction { .. } => StorageError::aborted_by(err.to_string(), err),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

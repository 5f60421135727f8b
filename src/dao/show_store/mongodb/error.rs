use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load shows")]
    LoadShow {
        #[source]
        source: MongoError,
    },
    #[error("failed to save show `{id}`")]
    SaveShow {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("show `{id}` does not exist")]
    MissingShow { id: String },
    #[error("failed to save timer `{id}`")]
    SaveTimer {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to stop timers titled `{title}`")]
    StopTimers {
        title: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list expired timers")]
    ListExpiredTimers {
        #[source]
        source: MongoError,
    },
    #[error("failed to save tile confirmation `{id}`")]
    SaveConfirmation {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save message `{id}`")]
    SaveMessage {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("transaction step `{stage}` failed")]
    Transaction {
        stage: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("tile document is missing field `{field}`")]
    MalformedTile { field: &'static str },
}

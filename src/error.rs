use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("document provider error: {0}")]
    Provider(String),

    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    #[error("search index is not initialized")]
    NotInitialized,

    #[error("configuration error: {0}")]
    Config(String),

    /// Reported to callers that waited on an initialization attempt which
    /// failed; the caller that ran the attempt gets the original error.
    #[error("search index initialization failed: {0}")]
    InitFailed(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// True when the failure came from the local cache store rather than
    /// the remote provider.
    pub fn is_cache_failure(&self) -> bool {
        matches!(
            self,
            Error::RedbDatabase(_)
                | Error::RedbStorage(_)
                | Error::RedbTransaction(_)
                | Error::RedbTable(_)
                | Error::RedbCommit(_)
                | Error::CacheUnavailable(_)
        )
    }
}

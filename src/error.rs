use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

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

    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("slug already in use: {0}")]
    DuplicateSlug(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn term_not_found(id: u64) -> Self {
        Error::NotFound {
            kind: "term",
            name: id.to_string(),
        }
    }

    /// Whether the underlying store or index could not be used.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Redb(_)
                | Error::RedbStorage(_)
                | Error::RedbTransaction(_)
                | Error::RedbTable(_)
                | Error::RedbCommit(_)
                | Error::Tantivy(_)
                | Error::Json(_)
        )
    }

    /// HTTP-equivalent status code for callers that speak HTTP.
    pub fn status(&self) -> u16 {
        match self {
            Error::InvalidParameter { .. } => 400,
            Error::NotFound { .. } => 404,
            Error::DuplicateSlug(_) => 409,
            Error::Config(_) | Error::DataDir(_) => 500,
            _ => 503,
        }
    }
}

//! Typed errors for the ranking core.

use sled::transaction::TransactionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Persisted-store read or write failed
    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted key or value does not have the expected shape
    #[error("corrupt entry in tree {tree}: {reason}")]
    Corrupt { tree: &'static str, reason: String },

    #[error("unknown document: {url}")]
    UnknownDocument { url: String },

    #[error("selected url is not among the candidates: {url}")]
    SelectionNotCandidate { url: String },

    /// Concurrent training kept changing the weights this step read
    #[error("training for {key} gave up after {attempts} attempts")]
    TrainingContended { key: String, attempts: usize },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn corrupt(tree: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt { tree, reason: reason.into() }
    }
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Store(e),
        }
    }
}

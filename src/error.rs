use serde_derive::{Deserialize, Serialize};

/// Result returning Error
pub type Result<T> = std::result::Result<T, Error>;

/// heapdb errors. Deadlock and CacheExhausted require the caller to abort the transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A lock wait formed a cycle or exceeded the wait bound.
    Deadlock(String),
    /// Every cached page is dirty or locked. Carries the cache capacity.
    CacheExhausted(usize),
    Config(String),
    Internal(String),
    /// A read or write against a backing file failed.
    Io(String),
    SchemaMismatch(String),
    Value(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Deadlock(s) => write!(f, "Transaction aborted: {}", s),
            Error::CacheExhausted(n) => {
                write!(f, "Buffer pool exhausted: all {} cached pages are dirty or locked", n)
            }
            Error::Config(s) | Error::Internal(s) | Error::Value(s) => write!(f, "{}", s),
            Error::Io(s) => write!(f, "I/O error: {}", s),
            Error::SchemaMismatch(s) => write!(f, "Schema mismatch: {}", s),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Value(err.to_string())
    }
}

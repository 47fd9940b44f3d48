use thiserror::Error;

/// SDK 本地错误
///
/// 远端失败不走这里，见 [`crate::remote::RemoteError`]：同步过程内部消化，不外抛给写路径。
#[derive(Debug, Error)]
pub enum LiftlogSDKError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    JsonError(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Other error: {0}")]
    Other(String),
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Shutting down: {0}")]
    ShuttingDown(String),
}

impl From<serde_json::Error> for LiftlogSDKError {
    fn from(error: serde_json::Error) -> Self {
        LiftlogSDKError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for LiftlogSDKError {
    fn from(error: std::io::Error) -> Self {
        LiftlogSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for LiftlogSDKError {
    fn from(error: sled::Error) -> Self {
        LiftlogSDKError::KvStore(error.to_string())
    }
}

impl From<refinery::Error> for LiftlogSDKError {
    fn from(error: refinery::Error) -> Self {
        LiftlogSDKError::Migration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LiftlogSDKError>;

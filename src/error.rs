//! Error types shared by the model and storage layers

use thiserror::Error;

/// An entity field combination that breaks a model invariant
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("working workshops ({working}) must be between 0 and the total ({total})")]
    InvalidWorkshops { total: i64, working: i64 },

    #[error("pipe length must be positive, got {0}")]
    InvalidLength(f64),

    #[error("pipe diameter must be positive, got {0}")]
    InvalidDiameter(i64),

    /// Names are written into `|`-delimited records
    #[error("name {0:?} must be non-empty and must not contain '|'")]
    InvalidName(String),
}

/// Storage layer error type
#[derive(Debug, Error)]
pub enum StorageError {
    /// A database operation failed.
    #[error("database operation failed")]
    Database(#[from] rusqlite::Error),

    /// An I/O operation failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("invalid name filter")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

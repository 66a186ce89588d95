//! Error types for the chamber domain model

use thiserror::Error;

/// Errors from register-map construction and snapshot decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A name in a read/write request or required set has no register
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// Two registers share a name; the table is rejected at construction
    #[error("Duplicate register name: {0}")]
    DuplicateRegister(String),

    /// A required register has no value in the raw snapshot
    #[error("Snapshot missing value for register: {0}")]
    MissingValue(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

//! Error types for parsing, planning, storage, and session sequencing.

use thiserror::Error;

use crate::{reconcile::DuplicateKind, session::Step, sheet::SourceFormat};

/// Failures while turning upload bytes into a [`crate::sheet::ParsedSheet`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// Declared MIME type is outside the accepted CSV/XLS/XLSX set.
    #[error("unsupported file type '{mime}': only CSV, XLS, or XLSX uploads are accepted")]
    UnsupportedFormat { mime: String },

    /// Spreadsheet binary could not be opened or its first sheet read.
    #[error("could not decode {format} upload: {message}")]
    Undecodable {
        format: SourceFormat,
        message: String,
    },

    /// Delimited text is not valid in the configured encoding.
    #[error("upload is not valid {encoding} text")]
    Encoding { encoding: &'static str },

    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),
}

/// Problems with a column plan or the payload built from it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no column named '{name}' in the uploaded file")]
    UnknownColumn { name: String },

    #[error("at least one column must be selected")]
    NoColumnsSelected,

    #[error("column '{name}' is selected more than once")]
    DuplicateColumn { name: String },

    #[error("column {position} has an empty name")]
    EmptyColumnName { position: usize },

    #[error("column plan covers {plan} column(s) but the file has {header}")]
    HeaderMismatch { plan: usize, header: usize },
}

/// Failures reported by the storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid table name '{name}'")]
    InvalidTableName { name: String },

    #[error("table '{name}' not found")]
    TableNotFound { name: String },

    #[error("table '{name}' already exists")]
    TableExists { name: String },

    #[error("user '{name}' not found")]
    UserNotFound { name: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Failures raised by [`crate::session::IngestionSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while on the {step} step")]
    InvalidTransition { step: Step, action: &'static str },

    #[error(transparent)]
    Validation(#[from] crate::profile::ProfileErrors),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("the uploaded file has no data rows")]
    NoDataRows,

    #[error("{0}")]
    Duplicate(DuplicateKind),

    #[error("remote call failed: {0}")]
    Remote(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Rejections for additional uploads made from the dashboard.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("table with name \"{name}\" already exists; file name cannot be the same")]
    NameTaken { name: String },

    #[error("headers do not match the existing table structure")]
    HeaderMismatch,

    #[error("uploaded data matches existing data")]
    DataOverlap,

    #[error("the uploaded file has no data rows")]
    NoDataRows,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

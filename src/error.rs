use sea_orm::DbErr;
use thiserror::Error;

/// Failure signal of the import engine and the lifecycle operations around it.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Table [{0}] is not allowed for import.")]
    TableNotAllowed(String),
    #[error("Column [{column}] does not exist on table [{table}].")]
    UnknownColumn { table: String, column: String },
    #[error("Sheet {0} was not found in the document")]
    SheetNotFound(usize),
    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Import {0} was not found")]
    ImportNotFound(i32),
    #[error("Import status cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Unknown import status: {0}")]
    UnknownStatus(String),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error("Import run exceeded its time limit of {0} seconds")]
    Timeout(u64),
}

pub type ImportResult<T> = Result<T, ImportError>;

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::Spreadsheet(err.to_string())
    }
}

/// Problems with a human-confirmed mapping, surfaced before anything is committed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("No columns were mapped. Please assign at least one header.")]
    Empty,
    #[error("Duplicate mapping detected: {table}.{column} is assigned to headers {first} and {second}")]
    DuplicateTarget {
        table: String,
        column: String,
        first: usize,
        second: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} must be a valid number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("DATABASE_URL must be a PostgreSQL or SQLite connection string")]
    UnsupportedDatabase,
}

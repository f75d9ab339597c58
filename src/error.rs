use thiserror::Error;

use crate::parse::Cells;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Error occurred while processing input stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("Row conversion failed: {message} (row: {cells:?})")]
    RowConversion { message: String, cells: Cells },
    #[error("Column conversion failed: {0}")]
    ColumnConversion(String),
    #[error("Data source error: {0}")]
    DataSource(String),
    #[error("No data source initialized, use /loadcsv to load a file")]
    NotLoaded,
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Helper conversions
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self { Self::Fetch(e.to_string()) }
}
impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

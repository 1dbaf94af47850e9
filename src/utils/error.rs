// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum EdgarError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 500 Internal Server Error

    #[error("SEC rate limit likely exceeded")]
    RateLimited, // 403 from EDGAR almost always means a bad User-Agent or too many requests

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to parse EDGAR response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid storage URI '{0}': {1}")]
    InvalidUri(String, String),

    #[error("Lock exists at {0}. Another job may be running.")]
    LockHeld(String),
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column '{0}' in {1}")]
    MissingColumn(String, String),

    #[error("Column '{0}' could not be represented as text")]
    Cast(String),

    #[error("Schema mismatch: {0}")]
    Schema(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("EDGAR interaction failed: {0}")]
    Edgar(#[from] EdgarError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

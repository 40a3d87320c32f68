//! Error types for the Honyaku application.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use crate::state::PageStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for translation operations.
#[derive(Error, Debug)]
pub enum TranslationError {
    /// HTTP request to API failed
    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The model produced no text
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// A placeholder was dropped, altered or duplicated by the model
    #[error("Placeholder {placeholder} appears {count} times in model output (expected once)")]
    PlaceholderMismatch { placeholder: String, count: usize },

    /// All retry attempts exhausted
    #[error("All retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Invalid API configuration
    #[error("Invalid API configuration: {0}")]
    InvalidConfig(String),
}

/// Error type for the job state file.
#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to read the state file
    #[error("Failed to read state file: {0}")]
    ReadError(#[from] std::io::Error),

    /// State file is not valid JSON for the expected structure
    #[error("Failed to parse state file JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to write the state file
    #[error("Failed to save state file: {0}")]
    WriteError(String),

    /// A status change that the page lifecycle does not allow
    #[error("Page {page} cannot move from {from} to {to}")]
    InvalidTransition {
        page: u32,
        from: PageStatus,
        to: PageStatus,
    },
}

/// Error type for the translation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source document does not exist
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// Reading the source or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state store failed
    #[error(transparent)]
    State(#[from] StateError),
}

/// Error type for chapter splitting.
#[derive(Error, Debug)]
pub enum ChapterError {
    /// Reading the document or writing chapter files failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chapter catalog file is invalid
    #[error("Failed to parse chapter catalog: {0}")]
    Catalog(String),

    /// A heading pattern could not be compiled
    #[error("Invalid chapter heading pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Error type for the static site index updater.
#[derive(Error, Debug)]
pub enum SiteError {
    /// Reading or writing a site file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chapters directory does not exist
    #[error("Chapters directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// No chapter files were found
    #[error("No chapter files found in {}", .0.display())]
    NoChapters(PathBuf),

    /// index.html has no chapter list element
    #[error("Chapter list <ul id=\"chapterList\"> not found in index.html")]
    ChapterListNotFound,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;

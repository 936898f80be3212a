use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GutenError {
    #[error("Gutendex request failed: {0}")]
    ApiHttp(String),

    #[error("Gutendex returned status {status} for {url}")]
    ApiStatus { status: u16, url: String },

    #[error("malformed Gutendex page from {url}: {message}")]
    ApiParse { url: String, message: String },

    #[error("invalid book record: {0}")]
    InvalidRecord(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status} for {url}")]
    DownloadStatus { status: u16, url: String },

    #[error("giving up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid setting: {0}")]
    InvalidSettings(String),

    #[error("interrupted by user")]
    Interrupted,
}

impl GutenError {
    /// Errors raised while paginating metadata; these abort a run.
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            GutenError::ApiHttp(_)
                | GutenError::ApiStatus { .. }
                | GutenError::ApiParse { .. }
                | GutenError::InvalidRecord(_)
        )
    }
}

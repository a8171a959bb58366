use std::{path::PathBuf, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF text layer error in {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("OCR failed on page {page}: {message}")]
    Ocr { page: u32, message: String },

    #[error("OCR on page {page} exceeded {budget:?}")]
    OcrTimeout { page: u32, budget: Duration },

    #[error("persisted index {path} is corrupt: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("index build cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is a recoverable extraction failure: the unit
    /// (document or page) that raised it is skipped and the build goes on.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Pdf { .. }
                | Error::Ocr { .. }
                | Error::OcrTimeout { .. }
        )
    }
}

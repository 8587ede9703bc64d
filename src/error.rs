use std::path::PathBuf;
use thiserror::Error;

/// The main error type for synthesis runs.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to serialize class mapping for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No {empty} found in {dir}")]
    EmptyPool { empty: &'static str, dir: PathBuf },

    #[error("Class mapping is not contiguous: no label has index {missing}")]
    NonContiguousMapping { missing: usize },
}

impl SynthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SynthError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;

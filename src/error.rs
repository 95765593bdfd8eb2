//! Error type shared by the reader, the renderers and timestamp parsing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by this crate.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse GPX file {path}: {message}")]
    GpxParse { path: PathBuf, message: String },
    #[error("unrecognised timestamp: {input:?}")]
    InvalidTimestamp { input: String },
    #[error("track has no points")]
    EmptyTrack,
    #[error("failed to encode GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

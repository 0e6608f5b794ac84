//! Error types for the tile crate.

use crate::Coordinate;
use thiserror::Error;

/// Errors that can occur when caching, fetching or decoding tiles.
#[derive(Debug, Error)]
pub enum TileError {
    /// I/O error reading or writing a cache file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index file could not be encoded or decoded.
    #[error("Index serialization error: {0}")]
    Index(#[from] bincode::Error),

    /// HTTP transport error when fetching tiles.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("Remote request failed with status {status}: {url}")]
    RemoteFailure {
        /// HTTP status code.
        status: u16,
        /// Requested URL with credentials stripped.
        url: String,
    },

    /// The local request quota has reached zero.
    #[error("Request quota exhausted")]
    QuotaExhausted,

    /// The quota file does not contain a single integer.
    #[error("Invalid quota file {path}: {reason}")]
    InvalidQuota {
        /// Path to the quota file.
        path: String,
        /// Parse failure.
        reason: String,
    },

    /// The signing secret is not valid base64url.
    #[error("Invalid signing secret: {0}")]
    InvalidSecret(String),

    /// Image bytes for a tile could not be decoded.
    #[error("Failed to decode image for {coord}: {source}")]
    Decode {
        /// Coordinate of the tile.
        coord: Coordinate,
        /// Codec error.
        source: image::ImageError,
    },

    /// The in-memory image could not be encoded for writing.
    #[error("Failed to encode image for {coord}: {source}")]
    Encode {
        /// Coordinate of the tile.
        coord: Coordinate,
        /// Codec error.
        source: image::ImageError,
    },
}

impl TileError {
    /// Whether this error means no further remote requests can succeed this run.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, TileError::QuotaExhausted)
    }
}

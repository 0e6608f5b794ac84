//! Error types for grid construction.

use satgrid_tiles::TileError;
use thiserror::Error;

/// Errors that can occur when resolving boundaries or building grids.
#[derive(Debug, Error)]
pub enum GridError {
    /// The boundary lookup returned nothing usable for a query.
    #[error("Geocoding failed for {query}: {reason}")]
    Geocode {
        /// Human-readable form of the query.
        query: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// HTTP transport error talking to the geocoder.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Grid parameters are out of range.
    #[error("Invalid grid parameters: {0}")]
    InvalidParams(String),

    /// A tile could not be loaded or saved.
    #[error(transparent)]
    Tile(#[from] TileError),
}

impl GridError {
    /// Whether this error means no further remote requests can succeed this run.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, GridError::Tile(e) if e.is_quota_exhausted())
    }

    /// Whether this error came from the boundary lookup.
    pub fn is_geocode(&self) -> bool {
        matches!(self, GridError::Geocode { .. } | GridError::HttpRequest(_))
    }
}

//! Error types for the runner.

use satgrid_grid::GridError;
use satgrid_tiles::TileError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a harvest.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("City table error: {0}")]
    Cities(#[from] csv::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl RunnerError {
    /// Whether the run stopped because the request quota ran out.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            RunnerError::Tile(e) => e.is_quota_exhausted(),
            RunnerError::Grid(e) => e.is_quota_exhausted(),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_quota_exhausted() {
            2
        } else {
            1
        }
    }
}

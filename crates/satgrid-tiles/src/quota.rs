//! Persisted remote request quota.
//!
//! The quota file holds a single decimal integer: the number of remote
//! fetches still allowed. It is read once when opened and overwritten when
//! the quota is closed or dropped.

use crate::{Result, TileError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default quota file location.
pub const DEFAULT_QUOTA_FILE: &str = "request_count_left.int";

/// Remaining remote request budget.
#[derive(Debug)]
pub struct RequestQuota {
    path: PathBuf,
    remaining: u64,
    closed: bool,
}

impl RequestQuota {
    /// Load the quota from `path`, or start at `initial` if the file is absent.
    pub fn open<P: AsRef<Path>>(path: P, initial: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let remaining = if path.exists() {
            let text = fs::read_to_string(&path)?;
            text.trim().parse::<u64>().map_err(|e| TileError::InvalidQuota {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            info!(path = %path.display(), initial, "No quota file, using initial quota");
            initial
        };

        Ok(Self {
            path,
            remaining,
            closed: false,
        })
    }

    /// Quota file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Requests still allowed.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Fail with [`TileError::QuotaExhausted`] if no requests are left.
    pub fn check(&self) -> Result<()> {
        if self.remaining == 0 {
            return Err(TileError::QuotaExhausted);
        }
        Ok(())
    }

    /// Record one successful request.
    pub fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Replace the remaining count.
    pub fn set(&mut self, remaining: u64) {
        self.remaining = remaining;
    }

    /// Overwrite the quota file with the current count.
    pub fn flush(&self) -> Result<()> {
        fs::write(&self.path, self.remaining.to_string())?;
        info!(path = %self.path.display(), remaining = self.remaining, "Saved request quota");
        Ok(())
    }

    /// Flush and close.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for RequestQuota {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to save request quota on drop");
        }
    }
}

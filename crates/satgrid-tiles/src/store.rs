//! On-disk tile cache with a bucketed path index.
//!
//! Every cached image lives at a path derived only from its coordinate:
//!
//! ```text
//! <data_dir>/<round(lat)>/<round(lng)>/<|lat|>_<N|S> <|lng|>_<E|W>.png
//! ```
//!
//! where both magnitudes are printed with six decimals and the decimal point
//! replaced by `_`, e.g. `data/49/2/48_856600_N 2_352200_E.png`.
//!
//! Lookups never touch the filesystem. Instead, every saved path is recorded
//! under a coarse [`bucket_key`] and `exists` answers from that index. The index
//! is loaded once in [`TileStore::open`] and written back by
//! [`TileStore::close`] (or on drop, whichever comes first).
//!
//! ## Bucket keys
//!
//! The key packs `|round(lat * 100)|` and `|round(lng * 100)|` into one
//! integer, so one bucket spans roughly 1.1 km x 1.1 km. The absolute values
//! drop the hemisphere: `(48.85, 2.35)`, `(-48.85, 2.35)`, `(48.85, -2.35)` and
//! `(-48.85, -2.35)` all share a bucket. The full path still differs, so this
//! only widens the bucket, it never produces a false hit.
//!
//! The store is not safe to share between processes.

use crate::{Coordinate, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Default cache directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default index file name inside the cache directory.
pub const DEFAULT_INDEX_FILE: &str = "index.bin";

/// File extension of cached images.
pub const IMAGE_EXTENSION: &str = "png";

/// Multiplier applied to each component before rounding into a bucket.
const BUCKET_SCALE: f64 = 100.0;

/// Stride separating the latitude part from the longitude part of a key.
/// Must exceed the largest longitude part (18000).
const BUCKET_LAT_STRIDE: u64 = 100_000;

/// Bucket key to the set of cached path strings in that bucket.
pub type PathIndex = BTreeMap<u64, BTreeSet<String>>;

/// Where the store keeps its files.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for images and the index file.
    ///
    /// Index entries are stored with this prefix as given. `./` components
    /// are dropped when the store opens, but a relative and an absolute
    /// spelling of the same directory still index as different paths, so
    /// reopen a cache the way it was written.
    pub data_dir: PathBuf,
    /// Index file name, relative to `data_dir`.
    pub index_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            index_file: DEFAULT_INDEX_FILE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Config rooted at `data_dir` with the default index file name.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Full path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }
}

/// Outcome of [`TileStore::rescan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Paths still backed by a file.
    pub retained: usize,
    /// Paths removed because their file is gone.
    pub pruned: usize,
}

/// Compute the index bucket for a coordinate.
///
/// ```
/// use satgrid_tiles::{bucket_key, Coordinate};
///
/// // 4259 (lat part) * 100000 + 15068 (lng part)
/// assert_eq!(bucket_key(&Coordinate::new(-42.5923, 150.6814)), 425_915_068);
/// ```
pub fn bucket_key(coord: &Coordinate) -> u64 {
    let lat_part = (coord.lat * BUCKET_SCALE).round_ties_even().abs() as u64;
    let lng_part = (coord.lng * BUCKET_SCALE).round_ties_even().abs() as u64;
    lat_part * BUCKET_LAT_STRIDE + lng_part
}

/// File name for a coordinate, without directories.
pub fn file_name(coord: &Coordinate) -> String {
    let ns = if coord.lat > 0.0 { 'N' } else { 'S' };
    let ew = if coord.lng > 0.0 { 'E' } else { 'W' };
    let lat = format!("{:.6}", coord.lat.abs()).replace('.', "_");
    let lng = format!("{:.6}", coord.lng.abs()).replace('.', "_");
    format!("{}_{} {}_{}.{}", lat, ns, lng, ew, IMAGE_EXTENSION)
}

/// Directory partition for a coordinate, relative to the data directory.
fn partition(coord: &Coordinate) -> PathBuf {
    let lat = coord.lat.round_ties_even() as i64;
    let lng = coord.lng.round_ties_even() as i64;
    PathBuf::from(lat.to_string()).join(lng.to_string())
}

/// Drop `.` components so `data` and `./data` produce the same entries.
fn normalize_dir(dir: &Path) -> PathBuf {
    let normalized: PathBuf = dir
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// String form of a path as stored in the index.
fn index_entry(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Coordinate-addressed image cache.
///
/// Open once, pass by reference to everything that reads or writes tiles,
/// then [`close`](TileStore::close). Dropping an open store flushes the
/// index as well, so early returns do not lose entries.
///
/// # Example
///
/// ```no_run
/// use satgrid_tiles::{Coordinate, StoreConfig, TileStore};
///
/// let mut store = TileStore::open(StoreConfig::new("data"))?;
/// let paris = Coordinate::new(48.8566, 2.3522);
/// if !store.exists(&paris) {
///     store.save(&paris, b"PNGDATA")?;
/// }
/// let bytes = store.load(&paris)?;
/// store.close()?;
/// # Ok::<(), satgrid_tiles::TileError>(())
/// ```
#[derive(Debug)]
pub struct TileStore {
    config: StoreConfig,
    index: PathIndex,
    dirty: bool,
    closed: bool,
}

impl TileStore {
    /// Open the store, creating the data directory and an empty index file
    /// if they do not exist yet.
    pub fn open(mut config: StoreConfig) -> Result<Self> {
        config.data_dir = normalize_dir(&config.data_dir);
        fs::create_dir_all(&config.data_dir)?;

        let index_path = config.index_path();
        if !index_path.exists() {
            info!(path = %index_path.display(), "Creating empty tile index");
            write_index(&index_path, &PathIndex::new())?;
        }

        let index = read_index(&index_path)?;
        info!(
            path = %index_path.display(),
            buckets = index.len(),
            "Loaded tile index"
        );

        Ok(Self {
            config,
            index,
            dirty: false,
            closed: false,
        })
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Read-only view of the index.
    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.index.values().map(BTreeSet::len).sum()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.index.values().all(BTreeSet::is_empty)
    }

    /// Deterministic on-disk path for a coordinate.
    ///
    /// With `create` set, the containing directories are created.
    pub fn full_path(&self, coord: &Coordinate, create: bool) -> Result<PathBuf> {
        let dir = self.config.data_dir.join(partition(coord));
        if create {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir.join(file_name(coord)))
    }

    /// Whether an image for `coord` is indexed.
    ///
    /// This consults only the in-memory index, not the filesystem.
    pub fn exists(&self, coord: &Coordinate) -> bool {
        let key = bucket_key(coord);
        let Some(bucket) = self.index.get(&key) else {
            return false;
        };
        let path = self.config.data_dir.join(partition(coord)).join(file_name(coord));
        bucket.contains(&index_entry(&path))
    }

    /// Write image bytes for `coord` and record the path in the index.
    pub fn save(&mut self, coord: &Coordinate, data: &[u8]) -> Result<()> {
        let path = self.full_path(coord, true)?;
        fs::write(&path, data)?;
        debug!(path = %path.display(), bytes = data.len(), "Saved tile");

        self.index
            .entry(bucket_key(coord))
            .or_default()
            .insert(index_entry(&path));
        self.dirty = true;
        Ok(())
    }

    /// Read the cached bytes for `coord`.
    ///
    /// Fails with an I/O error if the file is missing; callers are expected
    /// to check [`exists`](TileStore::exists) first.
    pub fn load(&self, coord: &Coordinate) -> Result<Vec<u8>> {
        let path = self.full_path(coord, false)?;
        debug!(path = %path.display(), "Loading cached tile");
        Ok(fs::read(path)?)
    }

    /// Drop index entries whose file no longer exists.
    pub fn rescan(&mut self) -> RescanReport {
        let mut report = RescanReport::default();

        for paths in self.index.values_mut() {
            paths.retain(|p| {
                let keep = Path::new(p).is_file();
                if keep {
                    report.retained += 1;
                } else {
                    report.pruned += 1;
                }
                keep
            });
        }
        self.index.retain(|_, paths| !paths.is_empty());

        if report.pruned > 0 {
            self.dirty = true;
        }
        info!(
            retained = report.retained,
            pruned = report.pruned,
            "Rescanned tile index"
        );
        report
    }

    /// Write the index to disk if it changed since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let path = self.config.index_path();
        write_index(&path, &self.index)?;
        info!(path = %path.display(), entries = self.len(), "Saved tile index");
        self.dirty = false;
        Ok(())
    }

    /// Flush the index and close the store.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        self.closed = true;
        result
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to flush tile index on drop");
        }
    }
}

/// Read a persisted index.
pub fn read_index(path: &Path) -> Result<PathIndex> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(PathIndex::new());
    }
    Ok(bincode::deserialize(&bytes)?)
}

/// Overwrite a persisted index.
pub fn write_index(path: &Path, index: &PathIndex) -> Result<()> {
    let bytes = bincode::serialize(index)?;
    fs::write(path, bytes)?;
    Ok(())
}

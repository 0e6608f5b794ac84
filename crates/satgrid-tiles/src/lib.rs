//! # satgrid-tiles
//!
//! Coordinate-addressed satellite image cache.
//!
//! This crate provides:
//! - [`Coordinate`] and the haversine [`distance_km`]
//! - [`TileStore`], an on-disk image cache with a bucketed path index that is
//!   loaded on open and flushed on close
//! - [`StaticMapClient`], a quota-limited, optionally URL-signed static map
//!   client implementing [`TileSource`]
//! - [`SatelliteTile`], one coordinate's image, loaded cache-first on demand
//!
//! ## Example
//!
//! ```no_run
//! use satgrid_tiles::{
//!     Coordinate, Credentials, FetchConfig, RequestQuota, SatelliteTile, StaticMapClient,
//!     StoreConfig, TileStore,
//! };
//!
//! let mut store = TileStore::open(StoreConfig::new("data"))?;
//! let quota = RequestQuota::open("request_count_left.int", 0)?;
//! let credentials = Credentials {
//!     api_key: std::env::var("MAPS_API_KEY_NULP").unwrap_or_default(),
//!     signing_secret: None,
//! };
//! let mut client = StaticMapClient::new(FetchConfig::default(), credentials, quota)?;
//!
//! let mut tile = SatelliteTile::new(Coordinate::new(48.8566, 2.3522));
//! tile.save_if_missing(&mut store, &mut client)?;
//!
//! client.close()?;
//! store.close()?;
//! # Ok::<(), satgrid_tiles::TileError>(())
//! ```

mod coord;
mod error;
mod fetch;
mod quota;
mod store;
mod tile;

pub use coord::{distance_km, round_to, Coordinate, EARTH_RADIUS_KM};
pub use error::TileError;
pub use fetch::{
    decode_secret, query_string, request_url, sign, Credentials, FetchConfig, FetchStats,
    StaticMapClient, TileSource, DEFAULT_BASE_URL, DEFAULT_SCALE, DEFAULT_SIZE,
    DEFAULT_TIMEOUT_SECS, DEFAULT_ZOOM,
};
pub use quota::{RequestQuota, DEFAULT_QUOTA_FILE};
pub use store::{
    bucket_key, file_name, read_index, write_index, PathIndex, RescanReport, StoreConfig,
    TileStore, DEFAULT_DATA_DIR, DEFAULT_INDEX_FILE, IMAGE_EXTENSION,
};
pub use tile::{decode_image, encode_image, LoadOrigin, SatelliteTile, TileState};

/// Result type for tile operations.
pub type Result<T> = std::result::Result<T, TileError>;

//! # satgrid-grid
//!
//! Tile grids around city centres.
//!
//! Given a city's centre and boundary, [`ImageGrid`] enumerates the image
//! centres needed to cover everything within a radius of the centre that also
//! falls inside the city, and saves each of them through a
//! [`satgrid_tiles::TileStore`].
//!
//! ## Example
//!
//! ```no_run
//! use satgrid_grid::{GridParams, ImageGrid, NominatimLookup};
//! use satgrid_tiles::Coordinate;
//!
//! let lookup = NominatimLookup::new()?;
//! let grid = ImageGrid::for_city(
//!     &lookup,
//!     "Vienna",
//!     "Austria",
//!     Coordinate::new(48.2083, 16.3731),
//!     GridParams::default(),
//! )?;
//! println!("{}", grid.markers_json());
//! # Ok::<(), satgrid_grid::GridError>(())
//! ```

mod boundary;
mod error;
mod grid;

pub use boundary::{
    parse_search_response, resolve_boundary, BoundaryLookup, BoundaryQuery, CityBoundary,
    NominatimLookup, DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT, SEARCH_LIMIT,
};
pub use error::GridError;
pub use grid::{
    candidate_cells, CellIndex, GridParams, ImageGrid, ProgressCallback, SaveSummary,
    DEFAULT_RADIUS_KM, DEFAULT_TILE_SCALE_KM,
};

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

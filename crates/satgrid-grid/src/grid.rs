//! Tile grid around a city centre.
//!
//! The grid is a square of cells indexed by `(i, j)` in `[-swing, swing]`,
//! spaced so that neighbouring images touch:
//!
//! - one image covers [`DEFAULT_TILE_SCALE_KM`] per 512 rendered pixels
//! - `swing = floor(radius / 2 / scale)`
//! - a cell is `2 * i * dlat` north and `2 * j * dlng` east of the centre,
//!   with `dlat = scale / 110` degrees and `dlng = dlat / |cos(lat)|`
//!
//! Each candidate is rounded to six decimals and kept only if it lies within
//! `radius` km of the centre and inside the city boundary.

use crate::{resolve_boundary, BoundaryLookup, CityBoundary, GridError, Result};
use geo::{Intersects, Point};
use satgrid_tiles::{distance_km, Coordinate, SatelliteTile, TileSource, TileStore};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Ground distance covered by 512 rendered pixels, in km.
pub const DEFAULT_TILE_SCALE_KM: f64 = 0.190;

/// Default grid radius around the centre, in km.
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Kilometres per degree of latitude used for spacing.
const KM_PER_DEGREE: f64 = 110.0;

/// Decimal places kept for cell coordinates.
const CELL_PRECISION: i32 = 6;

/// Marker colour used by [`ImageGrid::markers_json`].
const MARKER_COLOR: &str = "#a24ac3";

/// Grid cell index: `(i, j)` = (rows north, columns east) of the centre.
pub type CellIndex = (i32, i32);

/// Callback for save progress: `(done, total)`.
pub type ProgressCallback = Box<dyn Fn(usize, usize)>;

/// Grid geometry parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    /// km covered by one 512 px image edge.
    pub tile_scale_km: f64,
    /// Maximum distance from the centre, in km.
    pub radius_km: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            tile_scale_km: DEFAULT_TILE_SCALE_KM,
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

impl GridParams {
    /// Default scale with a custom radius.
    pub fn with_radius(radius_km: f64) -> Self {
        Self {
            radius_km,
            ..Self::default()
        }
    }

    /// Reject non-finite or out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(self.tile_scale_km.is_finite() && self.tile_scale_km > 0.0) {
            return Err(GridError::InvalidParams(format!(
                "tile scale must be positive, got {}",
                self.tile_scale_km
            )));
        }
        if !(self.radius_km.is_finite() && self.radius_km >= 0.0) {
            return Err(GridError::InvalidParams(format!(
                "radius must be non-negative, got {}",
                self.radius_km
            )));
        }
        Ok(())
    }

    /// Cells on each side of the centre along one axis.
    pub fn swing(&self) -> i32 {
        (self.radius_km / 2.0 / self.tile_scale_km).floor() as i32
    }
}

/// Outcome of [`ImageGrid::save_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Tiles fetched and written.
    pub saved: usize,
    /// Tiles already in the store.
    pub skipped: usize,
}

#[derive(Serialize)]
struct Marker {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "latLng")]
    lat_lng: MarkerLatLng,
    color: &'static str,
}

#[derive(Serialize)]
struct MarkerLatLng {
    lat: f64,
    lng: f64,
}

/// Every candidate cell of the square grid, before any filtering.
///
/// Yields cells in row-major order (`i` outer, `j` inner).
pub fn candidate_cells(
    center: Coordinate,
    params: &GridParams,
) -> Result<impl Iterator<Item = (CellIndex, Coordinate)>> {
    params.validate()?;
    if !(center.lat.is_finite() && center.lng.is_finite() && center.lat.abs() < 90.0) {
        return Err(GridError::InvalidParams(format!(
            "centre {} must have |lat| < 90",
            center
        )));
    }

    let swing = params.swing();
    let offset_lat = params.tile_scale_km / KM_PER_DEGREE;
    let offset_lng = offset_lat / center.lat.to_radians().cos().abs();

    Ok((-swing..=swing).flat_map(move |i| {
        (-swing..=swing).map(move |j| {
            let cell = Coordinate::new(
                center.lat + 2.0 * i as f64 * offset_lat,
                center.lng + 2.0 * j as f64 * offset_lng,
            )
            .rounded(CELL_PRECISION);
            ((i, j), cell)
        })
    }))
}

/// Tiles covering a city.
#[derive(Debug, Clone)]
pub struct ImageGrid {
    center: Coordinate,
    params: GridParams,
    tiles: BTreeMap<CellIndex, SatelliteTile>,
}

impl ImageGrid {
    /// Build the grid against a known boundary.
    pub fn build(boundary: &CityBoundary, center: Coordinate, params: GridParams) -> Result<Self> {
        let mut tiles = BTreeMap::new();
        let mut candidates = 0usize;

        for (index, cell) in candidate_cells(center, &params)? {
            candidates += 1;
            if distance_km(&center, &cell) <= params.radius_km
                && boundary.intersects(&Point::new(cell.lng, cell.lat))
            {
                tiles.insert(index, SatelliteTile::new(cell));
            }
        }

        debug!(%center, candidates, accepted = tiles.len(), "Built image grid");
        Ok(Self {
            center,
            params,
            tiles,
        })
    }

    /// Resolve the city's boundary, then build the grid.
    ///
    /// Geocoding failures are returned to the caller so a batch can skip the
    /// city and continue.
    pub fn for_city(
        lookup: &dyn BoundaryLookup,
        city: &str,
        country: &str,
        center: Coordinate,
        params: GridParams,
    ) -> Result<Self> {
        let boundary = resolve_boundary(lookup, city, country)?;
        let grid = Self::build(&boundary, center, params)?;
        info!(city, country, tiles = grid.len(), "Grid ready");
        Ok(grid)
    }

    /// Grid centre.
    pub fn center(&self) -> Coordinate {
        self.center
    }

    /// Parameters the grid was built with.
    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// Number of accepted cells.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no cell was accepted.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile at a cell, if accepted.
    pub fn get(&self, i: i32, j: i32) -> Option<&SatelliteTile> {
        self.tiles.get(&(i, j))
    }

    /// Accepted cells in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (&CellIndex, &SatelliteTile)> {
        self.tiles.iter()
    }

    /// Coordinates of all accepted cells in row-major order.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.tiles.values().map(SatelliteTile::coord).collect()
    }

    /// Persist every tile, fetching those not yet cached.
    pub fn save_all(
        &mut self,
        store: &mut TileStore,
        source: &mut dyn TileSource,
    ) -> Result<SaveSummary> {
        self.save_all_with_callback(store, source, None)
    }

    /// Persist every tile with an optional progress callback.
    ///
    /// Tiles are processed strictly in order and the first error stops the
    /// run. Images are released from memory once written.
    pub fn save_all_with_callback(
        &mut self,
        store: &mut TileStore,
        source: &mut dyn TileSource,
        callback: Option<&ProgressCallback>,
    ) -> Result<SaveSummary> {
        let total = self.tiles.len();
        let mut summary = SaveSummary::default();

        for (done, tile) in self.tiles.values_mut().enumerate() {
            if tile.save_if_missing(store, source)? {
                summary.saved += 1;
            } else {
                summary.skipped += 1;
            }
            tile.unload();

            if let Some(cb) = callback {
                cb(done + 1, total);
            }
        }

        info!(
            center = %self.center,
            saved = summary.saved,
            skipped = summary.skipped,
            "Saved grid"
        );
        Ok(summary)
    }

    /// Accepted cells as a JSON array of map markers.
    pub fn markers_json(&self) -> String {
        let markers: Vec<Marker> = self
            .tiles
            .values()
            .map(|tile| Marker {
                kind: "marker",
                lat_lng: MarkerLatLng {
                    lat: tile.coord().lat,
                    lng: tile.coord().lng,
                },
                color: MARKER_COLOR,
            })
            .collect();
        serde_json::to_string(&markers).unwrap_or_else(|_| "[]".to_string())
    }
}

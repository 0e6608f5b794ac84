//! Sequential city harvesting.
//!
//! Cities are processed one at a time. A city whose boundary cannot be
//! resolved is skipped, other per-city failures are logged and the run
//! moves on, and an exhausted request quota stops the run.

use crate::cities::CityRecord;
use crate::error::RunnerError;
use satgrid_grid::{
    BoundaryLookup, GridError, GridParams, ImageGrid, ProgressCallback, SaveSummary,
};
use satgrid_tiles::{Coordinate, TileSource, TileStore};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tiles between progress log lines.
const PROGRESS_EVERY: usize = 50;

/// Settings shared by every city in a run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub params: GridParams,
    /// Pause after building each grid, before any tile is requested.
    pub city_delay: Duration,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub cities: usize,
    pub completed: usize,
    /// Boundary could not be resolved.
    pub skipped: usize,
    pub failed: usize,
    pub tiles_saved: usize,
    pub tiles_cached: usize,
    /// The run stopped early because the quota ran out.
    pub quota_exhausted: bool,
}

/// Build the grid for one city and save every tile.
pub fn harvest_city(
    lookup: &dyn BoundaryLookup,
    store: &mut TileStore,
    source: &mut dyn TileSource,
    city: &str,
    country: &str,
    center: Coordinate,
    options: &BatchOptions,
) -> Result<SaveSummary, GridError> {
    let mut grid = ImageGrid::for_city(lookup, city, country, center, options.params)?;
    info!(city, country, tiles = grid.len(), "Saving city");

    if !options.city_delay.is_zero() {
        thread::sleep(options.city_delay);
    }

    let progress: ProgressCallback = Box::new(|done: usize, total: usize| {
        if done % PROGRESS_EVERY == 0 || done == total {
            debug!(done, total, "Tile progress");
        }
    });
    grid.save_all_with_callback(store, source, Some(&progress))
}

/// Harvest every city in order.
///
/// The index is flushed after each city so an interrupted run keeps what it
/// has written.
pub fn run_batch(
    cities: &[CityRecord],
    lookup: &dyn BoundaryLookup,
    store: &mut TileStore,
    source: &mut dyn TileSource,
    options: &BatchOptions,
) -> Result<BatchReport, RunnerError> {
    let mut report = BatchReport {
        cities: cities.len(),
        ..BatchReport::default()
    };

    for (n, record) in cities.iter().enumerate() {
        info!(
            city = %record.city,
            country = %record.country,
            "City {}/{}",
            n + 1,
            cities.len()
        );

        let outcome = harvest_city(
            lookup,
            store,
            source,
            &record.city_ascii,
            &record.country,
            record.center(),
            options,
        );

        match outcome {
            Ok(summary) => {
                report.completed += 1;
                report.tiles_saved += summary.saved;
                report.tiles_cached += summary.skipped;
            }
            Err(e) if e.is_quota_exhausted() => {
                warn!(city = %record.city, "Request quota exhausted, stopping");
                report.quota_exhausted = true;
                store.flush()?;
                break;
            }
            Err(e) if e.is_geocode() => {
                warn!(
                    city = %record.city,
                    country = %record.country,
                    error = %e,
                    "Skipping city"
                );
                report.skipped += 1;
            }
            Err(e) => {
                error!(
                    city = %record.city,
                    country = %record.country,
                    error = %e,
                    "City failed"
                );
                report.failed += 1;
            }
        }

        store.flush()?;
    }

    info!(
        completed = report.completed,
        skipped = report.skipped,
        failed = report.failed,
        saved = report.tiles_saved,
        cached = report.tiles_cached,
        "Batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, MultiPolygon, Polygon};
    use satgrid_grid::{BoundaryQuery, CityBoundary};
    use satgrid_tiles::{encode_image, StoreConfig, TileError};
    use tempfile::TempDir;

    /// Square boundary of half-width 0.2 degrees around known centres.
    struct SquareLookup {
        known: Vec<(&'static str, Coordinate)>,
    }

    impl BoundaryLookup for SquareLookup {
        fn lookup(&self, query: &BoundaryQuery) -> satgrid_grid::Result<CityBoundary> {
            let hit = self.known.iter().find(|(name, _)| *name == query.city);
            match hit {
                Some((_, c)) => {
                    let d = 0.2;
                    let ring = vec![
                        Coord { x: c.lng - d, y: c.lat - d },
                        Coord { x: c.lng + d, y: c.lat - d },
                        Coord { x: c.lng + d, y: c.lat + d },
                        Coord { x: c.lng - d, y: c.lat + d },
                        Coord { x: c.lng - d, y: c.lat - d },
                    ];
                    Ok(MultiPolygon::new(vec![Polygon::new(LineString::new(ring), vec![])]))
                }
                None => Err(GridError::Geocode {
                    query: query.to_string(),
                    reason: "no results".to_string(),
                }),
            }
        }
    }

    /// Serves a fixed image for a limited number of requests.
    struct LimitedSource {
        png: Vec<u8>,
        remaining: usize,
        requests: usize,
    }

    impl TileSource for LimitedSource {
        fn fetch(&mut self, _coord: &Coordinate) -> satgrid_tiles::Result<Vec<u8>> {
            if self.remaining == 0 {
                return Err(TileError::QuotaExhausted);
            }
            self.remaining -= 1;
            self.requests += 1;
            Ok(self.png.clone())
        }
    }

    fn source(limit: usize) -> LimitedSource {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        LimitedSource {
            png: encode_image(&Coordinate::new(0.0, 0.0), &img).unwrap(),
            remaining: limit,
            requests: 0,
        }
    }

    fn record(name: &str, country: &str, center: Coordinate) -> CityRecord {
        CityRecord {
            city: name.to_string(),
            city_ascii: name.to_string(),
            lat: center.lat,
            lng: center.lng,
            country: country.to_string(),
            population: Some(250_000.0),
        }
    }

    fn options() -> BatchOptions {
        BatchOptions {
            params: GridParams::with_radius(1.0),
            city_delay: Duration::ZERO,
        }
    }

    const OSTRAVA: Coordinate = Coordinate {
        lat: 49.8347,
        lng: 18.2820,
    };
    const GRAZ: Coordinate = Coordinate {
        lat: 47.0707,
        lng: 15.4395,
    };

    #[test]
    fn test_unknown_city_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let lookup = SquareLookup {
            known: vec![("Graz", GRAZ)],
        };
        let mut src = source(10_000);
        let cities = vec![
            record("Atlantis", "Nowhere", OSTRAVA),
            record("Graz", "Austria", GRAZ),
        ];

        let report = run_batch(&cities, &lookup, &mut store, &mut src, &options()).unwrap();

        assert_eq!(report.cities, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 1);
        assert!(!report.quota_exhausted);
        assert_eq!(report.tiles_saved, src.requests);
        assert_eq!(store.len(), src.requests);
    }

    #[test]
    fn test_second_run_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let lookup = SquareLookup {
            known: vec![("Graz", GRAZ)],
        };
        let cities = vec![record("Graz", "Austria", GRAZ)];

        let first = {
            let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
            let mut src = source(10_000);
            let report = run_batch(&cities, &lookup, &mut store, &mut src, &options()).unwrap();
            store.close().unwrap();
            report
        };
        assert!(first.tiles_saved > 0);

        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut src = source(0);
        let second = run_batch(&cities, &lookup, &mut store, &mut src, &options()).unwrap();
        assert_eq!(src.requests, 0);
        assert_eq!(second.tiles_saved, 0);
        assert_eq!(second.tiles_cached, first.tiles_saved);
    }

    #[test]
    fn test_quota_exhaustion_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let lookup = SquareLookup {
            known: vec![("Graz", GRAZ), ("Ostrava", OSTRAVA)],
        };
        let mut src = source(3);
        let cities = vec![
            record("Graz", "Austria", GRAZ),
            record("Ostrava", "Czechia", OSTRAVA),
        ];

        let report = run_batch(&cities, &lookup, &mut store, &mut src, &options()).unwrap();

        assert!(report.quota_exhausted);
        assert_eq!(report.completed, 0);
        assert_eq!(src.requests, 3);
        // Tiles written before the quota ran out are indexed and flushed.
        drop(store);
        let reopened = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_harvest_city_respects_radius() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let lookup = SquareLookup {
            known: vec![("Ostrava", OSTRAVA)],
        };
        let mut src = source(10_000);

        let summary = harvest_city(
            &lookup,
            &mut store,
            &mut src,
            "Ostrava",
            "Czechia",
            OSTRAVA,
            &options(),
        )
        .unwrap();

        assert_eq!(summary.saved, src.requests);
        assert_eq!(summary.skipped, 0);
        for paths in store.index().values() {
            assert!(paths.iter().all(|p| p.ends_with(".png")));
        }
    }
}

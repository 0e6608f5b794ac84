//! A single satellite image for one coordinate.

use crate::{Coordinate, Result, TileError, TileSource, TileStore};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Load state of a [`SatelliteTile`].
#[derive(Debug, Clone)]
pub enum TileState {
    /// Nothing has been read or fetched yet.
    Unloaded,
    /// Decoded image held in memory.
    Loaded(DynamicImage),
    /// The last load attempt failed with this message.
    Failed(String),
}

/// Where the bytes of a successful load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Read from the tile store.
    Cache,
    /// Downloaded from the tile source.
    Remote,
}

/// One coordinate's image, materialized on demand.
///
/// The image is loaded at most once per tile: cache first, remote second.
/// Failures are kept in the state so they can be inspected, and a later
/// [`ensure_loaded`](SatelliteTile::ensure_loaded) tries again.
#[derive(Debug, Clone)]
pub struct SatelliteTile {
    coord: Coordinate,
    state: TileState,
}

impl SatelliteTile {
    /// Create an unloaded tile.
    pub fn new(coord: Coordinate) -> Self {
        Self {
            coord,
            state: TileState::Unloaded,
        }
    }

    /// Tile centre.
    pub fn coord(&self) -> Coordinate {
        self.coord
    }

    /// Current load state.
    pub fn state(&self) -> &TileState {
        &self.state
    }

    /// Whether the image is in memory.
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, TileState::Loaded(_))
    }

    /// The image, if already loaded.
    pub fn get(&self) -> Option<&DynamicImage> {
        match &self.state {
            TileState::Loaded(image) => Some(image),
            _ => None,
        }
    }

    /// Load the image if needed and return it.
    pub fn ensure_loaded(
        &mut self,
        store: &TileStore,
        source: &mut dyn TileSource,
    ) -> Result<&DynamicImage> {
        match self.state {
            TileState::Loaded(ref image) => Ok(image),
            TileState::Unloaded | TileState::Failed(_) => {
                let loaded = self.read_bytes(store, source).and_then(|(bytes, origin)| {
                    debug!(coord = %self.coord, ?origin, "Decoding tile");
                    decode_image(&self.coord, &bytes)
                });
                match loaded {
                    Ok(image) => self.state = TileState::Loaded(image),
                    Err(e) => {
                        self.state = TileState::Failed(e.to_string());
                        return Err(e);
                    }
                }
                // Loaded now, so this takes the first arm.
                self.ensure_loaded(store, source)
            }
        }
    }

    /// Encode the image (loading it first if needed) and write it to the store.
    pub fn save(&mut self, store: &mut TileStore, source: &mut dyn TileSource) -> Result<()> {
        let coord = self.coord;
        let image = self.ensure_loaded(store, source)?;
        let bytes = encode_image(&coord, image)?;
        store.save(&coord, &bytes)
    }

    /// Save unless the store already has this coordinate.
    ///
    /// Returns whether anything was written.
    pub fn save_if_missing(
        &mut self,
        store: &mut TileStore,
        source: &mut dyn TileSource,
    ) -> Result<bool> {
        if store.exists(&self.coord) {
            debug!(coord = %self.coord, "Tile already cached");
            return Ok(false);
        }
        self.save(store, source)?;
        Ok(true)
    }

    /// Forget the in-memory image.
    pub fn unload(&mut self) {
        self.state = TileState::Unloaded;
    }

    fn read_bytes(
        &self,
        store: &TileStore,
        source: &mut dyn TileSource,
    ) -> Result<(Vec<u8>, LoadOrigin)> {
        if store.exists(&self.coord) {
            Ok((store.load(&self.coord)?, LoadOrigin::Cache))
        } else {
            Ok((source.fetch(&self.coord)?, LoadOrigin::Remote))
        }
    }
}

/// Decode PNG bytes.
pub fn decode_image(coord: &Coordinate, data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory_with_format(data, ImageFormat::Png).map_err(|source| {
        TileError::Decode {
            coord: *coord,
            source,
        }
    })
}

/// Encode an image as PNG.
pub fn encode_image(coord: &Coordinate, image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|source| TileError::Encode {
            coord: *coord,
            source,
        })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    struct FakeSource {
        payload: Vec<u8>,
        calls: usize,
    }

    impl TileSource for FakeSource {
        fn fetch(&mut self, _coord: &Coordinate) -> Result<Vec<u8>> {
            self.calls += 1;
            Ok(self.payload.clone())
        }
    }

    struct FailingSource;

    impl TileSource for FailingSource {
        fn fetch(&mut self, _coord: &Coordinate) -> Result<Vec<u8>> {
            Err(TileError::QuotaExhausted)
        }
    }

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(color)));
        encode_image(&Coordinate::new(0.0, 0.0), &img).unwrap()
    }

    #[test]
    fn test_fetches_when_not_cached() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut source = FakeSource {
            payload: png_bytes([10, 20, 30, 255]),
            calls: 0,
        };
        let mut tile = SatelliteTile::new(Coordinate::new(48.8566, 2.3522));

        assert!(tile.get().is_none());
        let image = tile.ensure_loaded(&store, &mut source).unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(source.calls, 1);

        // Second access does not fetch again
        tile.ensure_loaded(&store, &mut source).unwrap();
        assert_eq!(source.calls, 1);

        tile.save(&mut store, &mut source).unwrap();
        assert!(store.exists(&tile.coord()));
    }

    #[test]
    fn test_prefers_cache_over_source() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let coord = Coordinate::new(50.0755, 14.4378);
        store.save(&coord, &png_bytes([1, 2, 3, 255])).unwrap();

        let mut tile = SatelliteTile::new(coord);
        let image = tile.ensure_loaded(&store, &mut FailingSource).unwrap();
        assert_eq!(image.to_rgba8().get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_fetch_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut tile = SatelliteTile::new(Coordinate::new(1.0, 1.0));

        let err = tile.ensure_loaded(&store, &mut FailingSource).unwrap_err();
        assert!(err.is_quota_exhausted());
        assert!(matches!(tile.state(), TileState::Failed(_)));
    }

    #[test]
    fn test_decode_failure_marks_tile_failed() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut source = FakeSource {
            payload: b"not a png".to_vec(),
            calls: 0,
        };
        let mut tile = SatelliteTile::new(Coordinate::new(1.0, 1.0));

        let err = tile.ensure_loaded(&store, &mut source).unwrap_err();
        assert!(matches!(err, TileError::Decode { .. }));
        assert!(matches!(tile.state(), TileState::Failed(_)));

        // A later attempt is allowed and may succeed
        source.payload = png_bytes([0, 0, 0, 255]);
        tile.ensure_loaded(&store, &mut source).unwrap();
        assert!(tile.is_loaded());
        assert_eq!(source.calls, 2);
    }

    #[test]
    fn test_failed_tile_reloads_fresh_image() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut tile = SatelliteTile::new(Coordinate::new(50.0755, 14.4378));
        tile.ensure_loaded(&store, &mut FailingSource).unwrap_err();

        let mut source = FakeSource {
            payload: png_bytes([200, 100, 50, 255]),
            calls: 0,
        };
        let image = tile.ensure_loaded(&store, &mut source).unwrap();
        assert_eq!(*image.to_rgba8().get_pixel(0, 0), Rgba([200, 100, 50, 255]));
        assert!(matches!(tile.state(), TileState::Loaded(_)));
        assert!(tile.get().is_some());
        assert_eq!(source.calls, 1);
    }

    #[test]
    fn test_save_if_missing_skips_cached() {
        let dir = TempDir::new().unwrap();
        let mut store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let coord = Coordinate::new(47.4979, 19.0402);
        store.save(&coord, &png_bytes([9, 9, 9, 255])).unwrap();

        let mut tile = SatelliteTile::new(coord);
        let written = tile.save_if_missing(&mut store, &mut FailingSource).unwrap();
        assert!(!written);
        assert!(!tile.is_loaded());
    }

    #[test]
    fn test_unload_resets_state() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(StoreConfig::new(dir.path())).unwrap();
        let mut source = FakeSource {
            payload: png_bytes([0, 0, 0, 255]),
            calls: 0,
        };
        let mut tile = SatelliteTile::new(Coordinate::new(1.0, 1.0));
        tile.ensure_loaded(&store, &mut source).unwrap();

        tile.unload();
        assert!(matches!(tile.state(), TileState::Unloaded));
    }
}

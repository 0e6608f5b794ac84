//! Runner configuration loaded from YAML.
//!
//! Every field is optional; a missing file section falls back to the
//! library defaults.

use crate::error::RunnerError;
use satgrid_grid::{GridParams, DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT};
use satgrid_tiles::{
    FetchConfig, StoreConfig, DEFAULT_BASE_URL, DEFAULT_DATA_DIR, DEFAULT_INDEX_FILE,
    DEFAULT_QUOTA_FILE, DEFAULT_SCALE, DEFAULT_SIZE, DEFAULT_TIMEOUT_SECS, DEFAULT_ZOOM,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the API key by default.
pub const DEFAULT_KEY_ENV: &str = "MAPS_API_KEY_NULP";

/// Environment variable holding the URL signing secret by default.
pub const DEFAULT_SECRET_ENV: &str = "MAPS_API_SECRET_NULP";

/// Countries harvested by `batch` unless configured otherwise.
pub const DEFAULT_COUNTRIES: [&str; 13] = [
    "Austria",
    "Belgium",
    "Czechia",
    "Denmark",
    "France",
    "Germany",
    "Hungary",
    "Luxembourg",
    "Netherlands",
    "Poland",
    "Romania",
    "Slovakia",
    "Slovenia",
];

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub storage: StorageSection,
    pub api: ApiSection,
    pub grid: GridSection,
    pub geocoder: GeocoderSection,
    pub batch: BatchSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: PathBuf,
    pub index_file: String,
    pub quota_file: PathBuf,
    /// Quota assumed when the quota file does not exist yet.
    pub initial_quota: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            quota_file: PathBuf::from(DEFAULT_QUOTA_FILE),
            initial_quota: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    pub zoom: u8,
    pub scale: u8,
    pub size: String,
    pub maptype: String,
    pub format: String,
    pub visual_refresh: bool,
    pub timeout_secs: u64,
    pub key_env: String,
    pub secret_env: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        ApiSection {
            base_url: DEFAULT_BASE_URL.to_string(),
            zoom: DEFAULT_ZOOM,
            scale: DEFAULT_SCALE,
            size: DEFAULT_SIZE.to_string(),
            maptype: "satellite".to_string(),
            format: "png".to_string(),
            visual_refresh: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            key_env: DEFAULT_KEY_ENV.to_string(),
            secret_env: DEFAULT_SECRET_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridSection {
    pub tile_scale_km: f64,
    pub radius_km: f64,
}

impl Default for GridSection {
    fn default() -> Self {
        let params = GridParams::default();
        GridSection {
            tile_scale_km: params.tile_scale_km,
            radius_km: params.radius_km,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeocoderSection {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for GeocoderSection {
    fn default() -> Self {
        GeocoderSection {
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub countries: Vec<String>,
    pub min_population: f64,
    pub city_delay_ms: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        BatchSection {
            countries: DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            min_population: 100_000.0,
            city_delay_ms: 100,
        }
    }
}

impl RunnerConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an empty map.
        if text.trim().is_empty() {
            return Ok(RunnerConfig::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load a configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, RunnerError> {
        let Some(path) = path else {
            return Ok(RunnerConfig::default());
        };
        let text = std::fs::read_to_string(path)?;
        RunnerConfig::from_yaml(&text).map_err(|source| RunnerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.storage.data_dir.clone(),
            index_file: self.storage.index_file.clone(),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            base_url: self.api.base_url.clone(),
            zoom: self.api.zoom,
            scale: self.api.scale,
            size: self.api.size.clone(),
            maptype: self.api.maptype.clone(),
            format: self.api.format.clone(),
            visual_refresh: self.api.visual_refresh,
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    /// Grid parameters, optionally overriding the configured radius.
    pub fn grid_params(&self, radius_km: Option<f64>) -> GridParams {
        GridParams {
            tile_scale_km: self.grid.tile_scale_km,
            radius_km: radius_km.unwrap_or(self.grid.radius_km),
        }
    }

    pub fn city_delay(&self) -> Duration {
        Duration::from_millis(self.batch.city_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RunnerConfig::from_yaml("").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.batch.countries.len(), 13);
        assert_eq!(config.api.key_env, "MAPS_API_KEY_NULP");
        assert_eq!(config.storage.quota_file, PathBuf::from("request_count_left.int"));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
storage:
  data_dir: /tmp/tiles
  initial_quota: 2500
grid:
  radius_km: 4.5
batch:
  countries: [Czechia]
"#;
        let config = RunnerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/tiles"));
        assert_eq!(config.storage.index_file, "index.bin");
        assert_eq!(config.storage.initial_quota, 2500);
        assert_relative_eq!(config.grid.radius_km, 4.5);
        assert_relative_eq!(config.grid.tile_scale_km, 0.190);
        assert_eq!(config.batch.countries, vec!["Czechia".to_string()]);
        assert_relative_eq!(config.batch.min_population, 100_000.0);
        assert_eq!(config.api, ApiSection::default());
    }

    #[test]
    fn test_library_configs_follow_sections() {
        let yaml = r#"
api:
  zoom: 18
  timeout_secs: 5
  visual_refresh: false
"#;
        let config = RunnerConfig::from_yaml(yaml).unwrap();
        let fetch = config.fetch_config();
        assert_eq!(fetch.zoom, 18);
        assert_eq!(fetch.scale, 2);
        assert_eq!(fetch.timeout, Duration::from_secs(5));
        assert!(!fetch.visual_refresh);

        let store = config.store_config();
        assert_eq!(store.data_dir, PathBuf::from("data"));

        assert_relative_eq!(config.grid_params(None).radius_km, 10.0);
        assert_relative_eq!(config.grid_params(Some(2.0)).radius_km, 2.0);
        assert_eq!(config.city_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("satgrid.yaml");
        std::fs::write(&path, "grid: [not, a, map]\n").unwrap();

        let err = RunnerConfig::load(Some(path.as_path())).unwrap_err();
        match err {
            RunnerError::Config { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_path_gives_defaults() {
        assert_eq!(RunnerConfig::load(None).unwrap(), RunnerConfig::default());
    }
}

//! # satgrid-runner
//!
//! Support library for the `satgrid` binary: YAML configuration, logging
//! setup, credential resolution, the city table, and the sequential batch
//! loop that drives [`satgrid_grid::ImageGrid`] over many cities.

pub mod batch;
pub mod cities;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;

pub use batch::{harvest_city, run_batch, BatchOptions, BatchReport};
pub use cities::{load_cities, read_cities, CityFilter, CityRecord};
pub use config::RunnerConfig;
pub use credentials::{credentials_from_env, resolve_credentials};
pub use error::RunnerError;
pub use logging::init_logging;

//! City table loading and selection.
//!
//! The table is a `worldcities.csv`-shaped file. Only the columns below are
//! read; any others are ignored.

use crate::config::BatchSection;
use crate::error::RunnerError;
use satgrid_tiles::Coordinate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

/// One row of the city table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CityRecord {
    pub city: String,
    /// ASCII spelling, used for geocoding.
    pub city_ascii: String,
    pub lat: f64,
    pub lng: f64,
    pub country: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub population: Option<f64>,
}

impl CityRecord {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Selects cities by country and minimum population.
#[derive(Debug, Clone)]
pub struct CityFilter {
    countries: BTreeSet<String>,
    min_population: f64,
}

impl CityFilter {
    pub fn new<I, S>(countries: I, min_population: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CityFilter {
            countries: countries.into_iter().map(Into::into).collect(),
            min_population,
        }
    }

    pub fn from_config(batch: &BatchSection) -> Self {
        CityFilter::new(batch.countries.iter().cloned(), batch.min_population)
    }

    /// Rows with an unknown population never pass.
    pub fn accepts(&self, record: &CityRecord) -> bool {
        self.countries.contains(&record.country)
            && record
                .population
                .is_some_and(|population| population >= self.min_population)
    }

    /// Keep accepted rows in table order.
    pub fn select(&self, records: Vec<CityRecord>) -> Vec<CityRecord> {
        records.into_iter().filter(|r| self.accepts(r)).collect()
    }
}

/// Read every row from a CSV source with a header line.
pub fn read_cities<R: io::Read>(reader: R) -> Result<Vec<CityRecord>, RunnerError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

pub fn load_cities(path: &Path) -> Result<Vec<CityRecord>, RunnerError> {
    let file = std::fs::File::open(path)?;
    read_cities(io::BufReader::new(file))
}

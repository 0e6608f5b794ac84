//! City boundary lookup.
//!
//! A city's administrative boundary is fetched from a Nominatim-compatible
//! search endpoint with `polygon_geojson=1` and converted into a
//! [`geo::MultiPolygon`]. Points are `(x = lng, y = lat)`.
//!
//! [`resolve_boundary`] first asks for `(city, country)` and, if that yields
//! no usable polygon, retries with the city name alone.

use crate::{GridError, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public Nominatim search endpoint.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Results requested per search; the first polygonal one is used.
pub const SEARCH_LIMIT: usize = 50;

/// User agent sent to the geocoder; Nominatim rejects anonymous clients.
pub const DEFAULT_USER_AGENT: &str = concat!("satgrid/", env!("CARGO_PKG_VERSION"));

/// Boundary of one city, in `(lng, lat)` degrees.
pub type CityBoundary = MultiPolygon<f64>;

/// A structured boundary search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryQuery {
    /// City name.
    pub city: String,
    /// Optional country name narrowing the search.
    pub country: Option<String>,
}

impl BoundaryQuery {
    /// Search for `city` within `country`.
    pub fn city_in_country(city: &str, country: &str) -> Self {
        Self {
            city: city.to_string(),
            country: Some(country.to_string()),
        }
    }

    /// Search for `city` anywhere.
    pub fn city(city: &str) -> Self {
        Self {
            city: city.to_string(),
            country: None,
        }
    }
}

impl fmt::Display for BoundaryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}, {}", self.city, country),
            None => write!(f, "{}", self.city),
        }
    }
}

/// Something that can turn a city query into a boundary polygon.
pub trait BoundaryLookup {
    /// Look up the boundary for `query`.
    ///
    /// Returns [`GridError::Geocode`] when nothing usable matches.
    fn lookup(&self, query: &BoundaryQuery) -> Result<CityBoundary>;
}

/// Resolve a city boundary, falling back to a city-only search.
///
/// Only a [`GridError::Geocode`] from the first attempt triggers the
/// fallback. The error of the second attempt is returned unchanged.
pub fn resolve_boundary(
    lookup: &dyn BoundaryLookup,
    city: &str,
    country: &str,
) -> Result<CityBoundary> {
    match lookup.lookup(&BoundaryQuery::city_in_country(city, country)) {
        Ok(boundary) => Ok(boundary),
        Err(e @ GridError::Geocode { .. }) => {
            warn!(error = %e, city, "Boundary lookup failed, retrying without country");
            lookup.lookup(&BoundaryQuery::city(city))
        }
        Err(e) => Err(e),
    }
}

/// Blocking Nominatim client.
#[derive(Debug)]
pub struct NominatimLookup {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl NominatimLookup {
    /// Client for the public endpoint.
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT)
    }

    /// Client for a specific endpoint and user agent.
    pub fn with_endpoint(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
        })
    }

    /// Search URL for a query.
    pub fn search_url(&self, query: &BoundaryQuery) -> Result<reqwest::Url> {
        let limit = SEARCH_LIMIT.to_string();
        let mut params = vec![("city", query.city.as_str())];
        if let Some(country) = &query.country {
            params.push(("country", country.as_str()));
        }
        params.extend([("format", "json"), ("polygon_geojson", "1")]);
        params.push(("limit", limit.as_str()));

        reqwest::Url::parse_with_params(&self.base_url, &params).map_err(|e| GridError::Geocode {
            query: query.to_string(),
            reason: format!("invalid geocoder URL {}: {}", self.base_url, e),
        })
    }
}

impl BoundaryLookup for NominatimLookup {
    fn lookup(&self, query: &BoundaryQuery) -> Result<CityBoundary> {
        let url = self.search_url(query)?;
        info!(%query, "Requesting city boundary");

        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GridError::Geocode {
                query: query.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.text()?;
        parse_search_response(query, &body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    geojson: Option<RawGeometry>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

type Ring = Vec<Vec<f64>>;

/// Parse a Nominatim JSON search response into a boundary.
///
/// Hits are scanned in rank order and the first one with a `Polygon` or
/// `MultiPolygon` geometry wins. Point and line hits are passed over.
pub fn parse_search_response(query: &BoundaryQuery, body: &str) -> Result<CityBoundary> {
    let fail = |reason: String| GridError::Geocode {
        query: query.to_string(),
        reason,
    };

    let hits: Vec<SearchHit> =
        serde_json::from_str(body).map_err(|e| fail(format!("malformed response: {}", e)))?;
    if hits.is_empty() {
        return Err(fail("no results".to_string()));
    }

    let total = hits.len();
    for hit in hits {
        let Some(geometry) = hit.geojson else {
            continue;
        };
        if geometry.kind != "Polygon" && geometry.kind != "MultiPolygon" {
            debug!(%query, kind = %geometry.kind, "Skipping non-polygon hit");
            continue;
        }

        debug!(
            %query,
            name = hit.display_name.as_deref().unwrap_or(""),
            kind = %geometry.kind,
            "Geocoder hit"
        );
        let boundary = boundary_from_geometry(&geometry).map_err(fail)?;
        if boundary.0.is_empty() {
            return Err(fail("empty polygon".to_string()));
        }
        return Ok(boundary);
    }

    Err(fail(format!("none of {} results is a polygon", total)))
}

fn boundary_from_geometry(geometry: &RawGeometry) -> std::result::Result<CityBoundary, String> {
    let bad_coords =
        |e: serde_json::Error| format!("malformed {} coordinates: {}", geometry.kind, e);
    if geometry.kind == "Polygon" {
        let rings: Vec<Ring> =
            serde_json::from_value(geometry.coordinates.clone()).map_err(bad_coords)?;
        Ok(MultiPolygon::new(vec![polygon_from_rings(rings)?]))
    } else {
        let polys: Vec<Vec<Ring>> =
            serde_json::from_value(geometry.coordinates.clone()).map_err(bad_coords)?;
        let polygons = polys
            .into_iter()
            .map(polygon_from_rings)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(MultiPolygon::new(polygons))
    }
}

fn polygon_from_rings(rings: Vec<Ring>) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(line_string_from_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon without exterior ring".to_string())??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn line_string_from_ring(ring: Ring) -> std::result::Result<LineString<f64>, String> {
    ring.into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("position with {} values", position.len())),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Intersects, Point};
    use std::cell::RefCell;

    const POLYGON_RESPONSE: &str = r#"[{
        "place_id": 1,
        "display_name": "Vienna, Austria",
        "geojson": {
            "type": "Polygon",
            "coordinates": [[[16.0, 48.0], [16.6, 48.0], [16.6, 48.4], [16.0, 48.4], [16.0, 48.0]]]
        }
    }]"#;

    const MULTIPOLYGON_RESPONSE: &str = r#"[{
        "display_name": "Twin",
        "geojson": {
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 6.0], [5.0, 5.0]],
                 [[5.4, 5.4], [5.6, 5.4], [5.6, 5.6], [5.4, 5.6], [5.4, 5.4]]]
            ]
        }
    }]"#;

    fn query() -> BoundaryQuery {
        BoundaryQuery::city_in_country("Vienna", "Austria")
    }

    #[test]
    fn test_parse_polygon() {
        let boundary = parse_search_response(&query(), POLYGON_RESPONSE).unwrap();
        assert_eq!(boundary.0.len(), 1);
        // x is longitude, y is latitude
        assert!(boundary.intersects(&Point::new(16.37, 48.21)));
        assert!(!boundary.intersects(&Point::new(48.21, 16.37)));
    }

    #[test]
    fn test_parse_multipolygon_with_hole() {
        let boundary = parse_search_response(&query(), MULTIPOLYGON_RESPONSE).unwrap();
        assert_eq!(boundary.0.len(), 2);
        assert_eq!(boundary.0[1].interiors().len(), 1);
        assert!(boundary.intersects(&Point::new(0.5, 0.5)));
        assert!(boundary.intersects(&Point::new(5.2, 5.2)));
        assert!(!boundary.intersects(&Point::new(5.5, 5.5)));
    }

    #[test]
    fn test_point_geometry_is_geocode_error() {
        let body = r#"[{"geojson": {"type": "Point", "coordinates": [16.3, 48.2]}}]"#;
        let err = parse_search_response(&query(), body).unwrap_err();
        assert!(matches!(err, GridError::Geocode { .. }));
    }

    #[test]
    fn test_point_hit_before_polygon_is_passed_over() {
        let body = r#"[
            {"display_name": "Brno (node)",
             "geojson": {"type": "Point", "coordinates": [16.6, 49.2]}},
            {"display_name": "Brno (relation)",
             "geojson": {"type": "Polygon",
                         "coordinates": [[[16.4, 49.1], [16.8, 49.1], [16.8, 49.3],
                                          [16.4, 49.3], [16.4, 49.1]]]}}
        ]"#;
        let query = BoundaryQuery::city_in_country("Brno", "Czechia");
        let boundary = parse_search_response(&query, body).unwrap();
        assert_eq!(boundary.0.len(), 1);
        assert!(boundary.intersects(&Point::new(16.6, 49.2)));
    }

    #[test]
    fn test_hits_without_polygon_are_geocode_error() {
        let body = r#"[
            {"geojson": {"type": "Point", "coordinates": [16.6, 49.2]}},
            {"display_name": "no geometry"},
            {"geojson": {"type": "LineString", "coordinates": [[16.6, 49.2], [16.7, 49.3]]}}
        ]"#;
        let err = parse_search_response(&query(), body).unwrap_err();
        assert!(err.to_string().contains("none of 3 results"), "{}", err);
    }

    #[test]
    fn test_empty_results_is_geocode_error() {
        let err = parse_search_response(&query(), "[]").unwrap_err();
        assert!(err.to_string().contains("no results"), "{}", err);
    }

    #[test]
    fn test_malformed_body_is_geocode_error() {
        let err = parse_search_response(&query(), "<html>").unwrap_err();
        assert!(matches!(err, GridError::Geocode { .. }));
    }

    #[test]
    fn test_short_position_is_rejected() {
        let body = r#"[{"geojson": {"type": "Polygon", "coordinates": [[[1.0], [2.0, 3.0]]]}}]"#;
        assert!(parse_search_response(&query(), body).is_err());
    }

    #[test]
    fn test_search_url() {
        let lookup = NominatimLookup::with_endpoint("https://geo.example/search", "test").unwrap();
        let url = lookup
            .search_url(&BoundaryQuery::city_in_country("Sankt Pölten", "Austria"))
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("city".to_string(), "Sankt Pölten".to_string()));
        assert_eq!(pairs[1], ("country".to_string(), "Austria".to_string()));
        assert!(pairs.contains(&("polygon_geojson".into(), "1".into())));
        assert!(pairs.contains(&("limit".into(), SEARCH_LIMIT.to_string())));

        let url = lookup.search_url(&BoundaryQuery::city("Brno")).unwrap();
        assert!(!url.query_pairs().any(|(k, _)| k == "country"));
    }

    #[test]
    fn test_query_display() {
        assert_eq!(query().to_string(), "Vienna, Austria");
        assert_eq!(BoundaryQuery::city("Vienna").to_string(), "Vienna");
    }

    /// Answers only queries without a country, recording every call.
    struct CityOnlyLookup {
        calls: RefCell<Vec<BoundaryQuery>>,
    }

    impl BoundaryLookup for CityOnlyLookup {
        fn lookup(&self, query: &BoundaryQuery) -> Result<CityBoundary> {
            self.calls.borrow_mut().push(query.clone());
            if query.country.is_some() {
                return Err(GridError::Geocode {
                    query: query.to_string(),
                    reason: "no results".to_string(),
                });
            }
            parse_search_response(query, POLYGON_RESPONSE)
        }
    }

    #[test]
    fn test_resolve_falls_back_to_city_only() {
        let lookup = CityOnlyLookup {
            calls: RefCell::new(Vec::new()),
        };
        let boundary = resolve_boundary(&lookup, "Vienna", "Austria").unwrap();
        assert_eq!(boundary.0.len(), 1);
        assert_eq!(
            *lookup.calls.borrow(),
            vec![query(), BoundaryQuery::city("Vienna")]
        );
    }

    struct NeverLookup;

    impl BoundaryLookup for NeverLookup {
        fn lookup(&self, query: &BoundaryQuery) -> Result<CityBoundary> {
            Err(GridError::Geocode {
                query: query.to_string(),
                reason: "no results".to_string(),
            })
        }
    }

    #[test]
    fn test_resolve_propagates_second_failure() {
        let err = resolve_boundary(&NeverLookup, "Atlantis", "Nowhere").unwrap_err();
        match err {
            GridError::Geocode { query, .. } => assert_eq!(query, "Atlantis"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    struct BrokenLookup;

    impl BoundaryLookup for BrokenLookup {
        fn lookup(&self, _query: &BoundaryQuery) -> Result<CityBoundary> {
            Err(GridError::InvalidParams("boom".to_string()))
        }
    }

    #[test]
    fn test_resolve_does_not_retry_other_errors() {
        let err = resolve_boundary(&BrokenLookup, "Vienna", "Austria").unwrap_err();
        assert!(matches!(err, GridError::InvalidParams(_)));
    }
}

//! Static map image client.
//!
//! Fetches one satellite image per coordinate from a Google-style static map
//! endpoint:
//!
//! ```text
//! https://maps.googleapis.com/maps/api/staticmap?center={lat},{lng}&zoom=17&scale=2
//!     &size=640x640&maptype=satellite&key={key}&format=png&visual_refresh=true
//! ```
//!
//! When a signing secret is configured, the path and query are signed with
//! HMAC-SHA1 using the base64url-decoded secret and the base64url digest is
//! appended as `&signature=...`.
//!
//! Every request is charged against a [`RequestQuota`]. A request is refused
//! before it is sent once the quota reaches zero, and only successful
//! responses are charged.

use crate::{Coordinate, RequestQuota, Result, TileError};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, info};

/// Static map endpoint.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";

/// Default zoom level.
pub const DEFAULT_ZOOM: u8 = 17;

/// Default pixel scale factor.
pub const DEFAULT_SCALE: u8 = 2;

/// Largest image size the endpoint serves.
pub const DEFAULT_SIZE: &str = "640x640";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Accepts secrets with or without trailing `=`.
const SECRET_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

type HmacSha1 = Hmac<Sha1>;

/// Something that can produce encoded image bytes for a coordinate.
pub trait TileSource {
    /// Fetch the raw encoded image for `coord`.
    fn fetch(&mut self, coord: &Coordinate) -> Result<Vec<u8>>;
}

/// API credentials. Never written to disk.
#[derive(Clone)]
pub struct Credentials {
    /// API key sent as the `key` parameter.
    pub api_key: String,
    /// Optional base64url URL-signing secret.
    pub signing_secret: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Request parameters that do not depend on the coordinate.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Endpoint URL without query string.
    pub base_url: String,
    /// Map zoom level.
    pub zoom: u8,
    /// Pixel scale factor.
    pub scale: u8,
    /// Image size as `WIDTHxHEIGHT`.
    pub size: String,
    /// Map type, e.g. `satellite`.
    pub maptype: String,
    /// Output image format.
    pub format: String,
    /// Request the refreshed base map style.
    pub visual_refresh: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            zoom: DEFAULT_ZOOM,
            scale: DEFAULT_SCALE,
            size: DEFAULT_SIZE.to_string(),
            maptype: "satellite".to_string(),
            format: "png".to_string(),
            visual_refresh: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Download statistics for the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStats {
    /// Number of images downloaded this session.
    pub tiles_downloaded: usize,
    /// Total bytes downloaded this session.
    pub bytes_downloaded: u64,
}

/// Blocking static map client with quota enforcement.
pub struct StaticMapClient {
    config: FetchConfig,
    api_key: String,
    secret: Option<Vec<u8>>,
    client: reqwest::blocking::Client,
    quota: RequestQuota,
    stats: FetchStats,
}

impl std::fmt::Debug for StaticMapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMapClient")
            .field("base_url", &self.config.base_url)
            .field("signed", &self.secret.is_some())
            .field("quota", &self.quota.remaining())
            .finish()
    }
}

impl StaticMapClient {
    /// Create a client that charges requests against `quota`.
    pub fn new(config: FetchConfig, credentials: Credentials, quota: RequestQuota) -> Result<Self> {
        let secret = credentials
            .signing_secret
            .as_deref()
            .map(decode_secret)
            .transpose()?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            api_key: credentials.api_key,
            secret,
            client,
            quota,
            stats: FetchStats::default(),
        })
    }

    /// Request parameters.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The quota this client charges.
    pub fn quota(&self) -> &RequestQuota {
        &self.quota
    }

    /// Mutable access to the quota.
    pub fn quota_mut(&mut self) -> &mut RequestQuota {
        &mut self.quota
    }

    /// Download statistics for this session.
    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    /// Full request URL for a coordinate, signed if a secret is configured.
    pub fn request_url(&self, coord: &Coordinate) -> Result<String> {
        request_url(&self.config, &self.api_key, self.secret.as_deref(), coord)
    }

    /// Close the client, persisting the quota.
    pub fn close(self) -> Result<()> {
        self.quota.close()
    }
}

impl TileSource for StaticMapClient {
    fn fetch(&mut self, coord: &Coordinate) -> Result<Vec<u8>> {
        self.quota.check()?;

        let url = self.request_url(coord)?;
        info!(%coord, remaining = self.quota.remaining(), "Sending network request");

        let response = self.client.get(&url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TileError::RemoteFailure {
                status: status.as_u16(),
                url: redact_key(&url, &self.api_key),
            });
        }

        let bytes = response.bytes()?;
        self.quota.consume();
        self.stats.tiles_downloaded += 1;
        self.stats.bytes_downloaded += bytes.len() as u64;
        debug!(%coord, bytes = bytes.len(), "Downloaded tile");

        Ok(bytes.to_vec())
    }
}

/// Build the unsigned query string for a coordinate.
pub fn query_string(config: &FetchConfig, api_key: &str, coord: &Coordinate) -> String {
    let params = [
        format!("center={}", coord.csv()),
        format!("zoom={}", config.zoom),
        format!("scale={}", config.scale),
        format!("size={}", config.size),
        format!("maptype={}", config.maptype),
        format!("key={}", api_key),
        format!("format={}", config.format),
        format!("visual_refresh={}", config.visual_refresh),
    ];
    params.join("&")
}

/// Build the request URL, appending a signature when `secret` is given.
pub fn request_url(
    config: &FetchConfig,
    api_key: &str,
    secret: Option<&[u8]>,
    coord: &Coordinate,
) -> Result<String> {
    let query = query_string(config, api_key, coord);
    let url = format!("{}?{}", config.base_url, query);

    let Some(secret) = secret else {
        return Ok(url);
    };

    let parsed = reqwest::Url::parse(&config.base_url)
        .map_err(|e| TileError::InvalidSecret(format!("cannot sign {}: {}", config.base_url, e)))?;
    let to_sign = format!("{}?{}", parsed.path(), query);
    let signature = sign(to_sign.as_bytes(), secret)?;

    Ok(format!("{}&signature={}", url, signature))
}

/// Decode a base64url signing secret.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    SECRET_ENGINE
        .decode(secret.trim())
        .map_err(|e| TileError::InvalidSecret(e.to_string()))
}

/// HMAC-SHA1 of `message`, base64url encoded.
pub fn sign(message: &[u8], secret: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha1::new_from_slice(secret).map_err(|e| TileError::InvalidSecret(e.to_string()))?;
    mac.update(message);
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

fn redact_key(url: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        return url.to_string();
    }
    url.replace(api_key, "<key>")
}

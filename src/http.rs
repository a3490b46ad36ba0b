//! HTTP clients for the routing and POI providers.
//!
//! - [`GraphHopperClient`] serves directions (`POST /route`) and geocoding
//!   (`GET /geocode`).
//! - [`OverpassClient`] runs [`SpatialQuery`]s against an Overpass endpoint.
//!
//! Every request carries an explicit timeout. A timed-out request fails with
//! [`NavError::ProviderTimeout`]; any other transport failure or non-success
//! status fails with [`NavError::Http`]. Nothing is retried here.

use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::adapter::DirectionsResponse;
use crate::collaborators::{
    DirectionsRequest, DirectionsService, GeocodeHit, GeocodingService, SpatialQueryService,
};
use crate::poi::{OverpassResponse, PoiElement, SpatialQuery};
use crate::{GeoPoint, NavError, Result};

pub const DEFAULT_GRAPHHOPPER_URL: &str = "https://graphhopper.com/api/1";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

// Longest error body echoed into an error message
const MAX_ERROR_BODY: usize = 200;

/// Endpoints, credentials and timeouts for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// GraphHopper API root, without trailing slash.
    /// Default: https://graphhopper.com/api/1
    pub graphhopper_url: String,

    /// Overpass interpreter endpoint.
    /// Default: https://overpass-api.de/api/interpreter
    pub overpass_url: String,

    pub api_key: String,

    /// Default: 20 seconds
    pub directions_timeout: Duration,

    /// Default: 10 seconds
    pub geocode_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            graphhopper_url: DEFAULT_GRAPHHOPPER_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            api_key: api_key.into(),
            directions_timeout: Duration::from_secs(20),
            geocode_timeout: Duration::from_secs(10),
        }
    }

    /// Read `GRAPHHOPPER_API_KEY` (required), `GRAPHHOPPER_BASE_URL` and
    /// `OVERPASS_URL` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = present("GRAPHHOPPER_API_KEY").ok_or_else(|| NavError::Config {
            message: "GRAPHHOPPER_API_KEY is not set".to_string(),
        })?;

        let mut config = Self::new(api_key);
        if let Some(url) = present("GRAPHHOPPER_BASE_URL") {
            config.graphhopper_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = present("OVERPASS_URL") {
            config.overpass_url = url;
        }
        Ok(config)
    }
}

fn build_client() -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| NavError::Config {
            message: format!("failed to create HTTP client: {}", e),
        })
}

fn map_request_error(operation: &str, timeout: Duration, e: reqwest::Error) -> NavError {
    if e.is_timeout() {
        warn!("[ProviderHttp] {} timed out after {:?}", operation, timeout);
        NavError::ProviderTimeout {
            operation: operation.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        NavError::Http {
            message: format!("{} request failed: {}", operation, e),
            status_code: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Check the status and decode the JSON body.
async fn read_json<T: DeserializeOwned>(
    operation: &str,
    timeout: Duration,
    response: Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        warn!("[ProviderHttp] {} returned {}: {}", operation, status, body);
        return Err(NavError::Http {
            message: format!("{} returned {}: {}", operation, status, body),
            status_code: Some(status.as_u16()),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| map_request_error(operation, timeout, e))
}

// ============================================================================
// GraphHopper
// ============================================================================

/// JSON body of `POST /route`.
#[derive(Debug, Serialize)]
struct RouteBody {
    /// `[lng, lat]` pairs
    points: Vec<[f64; 2]>,
    profile: &'static str,
    points_encoded: bool,
    instructions: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    avoid: Vec<&'static str>,
}

impl RouteBody {
    fn from_request(request: &DirectionsRequest) -> Self {
        Self {
            points: request
                .coordinates
                .iter()
                .map(|c| {
                    let vertex = c.to_geometry();
                    [vertex.lng, vertex.lat]
                })
                .collect(),
            profile: request.mode.as_str(),
            points_encoded: true,
            instructions: true,
            avoid: request.avoid.iter().map(|a| a.as_str()).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    hits: Vec<RawGeocodeHit>,
}

#[derive(Debug, Deserialize)]
struct RawGeocodeHit {
    point: RawPoint,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    fn into_hits(self) -> Vec<GeocodeHit> {
        self.hits
            .into_iter()
            .map(|hit| GeocodeHit {
                coordinate: GeoPoint::new(hit.point.lat, hit.point.lng),
                label: hit.name,
            })
            .filter(|hit| hit.coordinate.is_valid())
            .collect()
    }
}

/// Directions and geocoding over the GraphHopper HTTP API.
pub struct GraphHopperClient {
    client: Client,
    config: ProviderConfig,
}

impl GraphHopperClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            config,
        })
    }

    async fn fetch_route(&self, request: &DirectionsRequest) -> Result<DirectionsResponse> {
        let url = format!("{}/route", self.config.graphhopper_url);
        let timeout = self.config.directions_timeout;
        debug!(
            "[GraphHopperClient] POST {} ({} points, timeout {:?})",
            url,
            request.coordinates.len(),
            timeout
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&RouteBody::from_request(request))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error("directions", timeout, e))?;

        let directions: DirectionsResponse = read_json("directions", timeout, response).await?;
        info!(
            "[GraphHopperClient] Directions returned {} paths",
            directions.paths.len()
        );
        Ok(directions)
    }

    async fn fetch_geocode(&self, text: &str, limit: usize) -> Result<Vec<GeocodeHit>> {
        let url = format!("{}/geocode", self.config.graphhopper_url);
        let timeout = self.config.geocode_timeout;
        debug!(
            "[GraphHopperClient] GET {} (limit {}, timeout {:?})",
            url, limit, timeout
        );

        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", text),
                ("limit", limit.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error("geocode", timeout, e))?;

        let geocoded: GeocodeResponse = read_json("geocode", timeout, response).await?;
        Ok(geocoded.into_hits())
    }
}

impl DirectionsService for GraphHopperClient {
    fn route<'a>(
        &'a self,
        request: &'a DirectionsRequest,
    ) -> BoxFuture<'a, Result<DirectionsResponse>> {
        Box::pin(self.fetch_route(request))
    }
}

impl GeocodingService for GraphHopperClient {
    fn search<'a>(&'a self, text: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<GeocodeHit>>> {
        Box::pin(self.fetch_geocode(text, limit))
    }
}

// ============================================================================
// Overpass
// ============================================================================

/// Runs spatial queries against an Overpass interpreter.
pub struct OverpassClient {
    client: Client,
    url: String,
}

impl OverpassClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: config.overpass_url.clone(),
        })
    }

    async fn run(&self, query: &SpatialQuery) -> Result<Vec<PoiElement>> {
        let ql = query.to_overpass_ql();
        debug!(
            "[OverpassClient] POST {} ({} clauses, timeout {:?})",
            self.url,
            query.clause_count(),
            query.timeout
        );

        let response = self
            .client
            .post(&self.url)
            .form(&[("data", ql.as_str())])
            .timeout(query.timeout)
            .send()
            .await
            .map_err(|e| map_request_error("spatial query", query.timeout, e))?;

        let body: OverpassResponse = read_json("spatial query", query.timeout, response).await?;
        let elements = body.into_elements();
        info!("[OverpassClient] {} POIs found", elements.len());
        Ok(elements)
    }
}

impl SpatialQueryService for OverpassClient {
    fn query<'a>(&'a self, query: &'a SpatialQuery) -> BoxFuture<'a, Result<Vec<PoiElement>>> {
        Box::pin(self.run(query))
    }
}

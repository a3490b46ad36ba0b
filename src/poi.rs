//! # POI Sampler
//!
//! Turns a point or a polyline plus a search radius into one batched
//! proximity query against the POI data source.
//!
//! A polyline is thinned to at most [`SamplerConfig::max_samples`] points
//! spread evenly by index, always keeping the first and last point, so query
//! cost stays bounded however long the route is. Every sample contributes
//! three match clauses per type filter (amenity node, amenity way, shop node),
//! all unioned into a single request.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{GeoPoint, NavError, Result};

/// Radius the map view uses when the caller has no preference.
pub const DEFAULT_RADIUS_METERS: f64 = 1500.0;

/// Closed set of POI categories the sampler can search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiType {
    Restaurant,
    Cafe,
    Atm,
    Fuel,
    Hotel,
    Hospital,
}

impl PoiType {
    /// Filters used when the caller supplies none.
    pub const DEFAULTS: [PoiType; 6] = [
        PoiType::Restaurant,
        PoiType::Cafe,
        PoiType::Atm,
        PoiType::Fuel,
        PoiType::Hotel,
        PoiType::Hospital,
    ];

    /// Tag value used in the query language.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiType::Restaurant => "restaurant",
            PoiType::Cafe => "cafe",
            PoiType::Atm => "atm",
            PoiType::Fuel => "fuel",
            PoiType::Hotel => "hotel",
            PoiType::Hospital => "hospital",
        }
    }
}

impl fmt::Display for PoiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoiType {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        PoiType::DEFAULTS
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or(NavError::InvalidPoiType { tag })
    }
}

/// Parse a comma-separated filter list such as `"restaurant,cafe"`.
///
/// Empty entries are skipped and repeats collapse to the first occurrence.
/// An empty result means "use the defaults".
pub fn parse_type_filters(text: &str) -> Result<Vec<PoiType>> {
    let mut filters = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let poi_type: PoiType = part.parse()?;
        if !filters.contains(&poi_type) {
            filters.push(poi_type);
        }
    }
    Ok(filters)
}

/// Configuration for query building.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Upper bound on sample points per along-route query.
    /// Default: 15
    pub max_samples: usize,

    /// Result cap for single-point queries.
    /// Default: 30
    pub nearby_limit: usize,

    /// Result cap for along-route queries.
    /// Default: 50
    pub along_route_limit: usize,

    /// Server-side timeout for single-point queries.
    /// Default: 15 seconds
    pub nearby_timeout: Duration,

    /// Server-side timeout for along-route queries.
    /// Default: 25 seconds
    pub along_route_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_samples: 15,
            nearby_limit: 30,
            along_route_limit: 50,
            nearby_timeout: Duration::from_secs(15),
            along_route_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Around a single point
    Nearby,
    /// Around samples of a polyline
    AlongRoute,
}

/// A batched proximity query, ready to hand to the spatial-query collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialQuery {
    pub mode: QueryMode,
    pub samples: Vec<GeoPoint>,
    pub type_filters: Vec<PoiType>,
    pub radius_meters: f64,
    /// Max center-aggregated results returned by the server
    pub result_limit: usize,
    /// Deadline, applied both server-side and to the client call
    pub timeout: Duration,
}

impl SpatialQuery {
    /// Number of match clauses in the union.
    pub fn clause_count(&self) -> usize {
        self.samples.len() * self.type_filters.len() * 3
    }

    /// Render as Overpass QL.
    pub fn to_overpass_ql(&self) -> String {
        let mut ql = format!("[out:json][timeout:{}];(", self.timeout.as_secs());
        for sample in &self.samples {
            let around = format!(
                "(around:{},{},{})",
                self.radius_meters, sample.lat, sample.lng
            );
            for poi_type in &self.type_filters {
                let tag = poi_type.as_str();
                // Writing to a String cannot fail
                let _ = write!(
                    ql,
                    "node[\"amenity\"=\"{tag}\"]{around};\
                     way[\"amenity\"=\"{tag}\"]{around};\
                     node[\"shop\"=\"{tag}\"]{around};"
                );
            }
        }
        let _ = write!(ql, ");out center {};", self.result_limit);
        ql
    }
}

/// Evenly spaced sample indices over `len` points, at most `max_samples`.
///
/// `idx(i) = floor(i * (len - 1) / (n - 1))` with `n = min(max_samples, len)`,
/// so index 0 and index `len - 1` are always included. With two or more points
/// `n` is at least 2, even when `max_samples` asks for fewer.
pub fn sample_indices(len: usize, max_samples: usize) -> Vec<usize> {
    let n = if len >= 2 { max_samples.clamp(2, len) } else { len };
    match n {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..n).map(|i| i * (len - 1) / (n - 1)).collect(),
    }
}

/// Builds spatial queries with a given configuration.
#[derive(Debug, Clone, Default)]
pub struct PoiSampler {
    config: SamplerConfig,
}

impl PoiSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Build one batched query around `coordinates`.
    ///
    /// A single coordinate gives a [`QueryMode::Nearby`] query, two or more
    /// an [`QueryMode::AlongRoute`] query over evenly spaced samples. Empty
    /// `type_filters` means [`PoiType::DEFAULTS`].
    pub fn build_query(
        &self,
        coordinates: &[GeoPoint],
        radius_meters: f64,
        type_filters: &[PoiType],
    ) -> Result<SpatialQuery> {
        if !(radius_meters.is_finite() && radius_meters > 0.0) {
            return Err(NavError::InvalidRadius { radius_meters });
        }
        if coordinates.is_empty() {
            return Err(NavError::EmptyPolyline { point_count: 0 });
        }

        let type_filters = if type_filters.is_empty() {
            PoiType::DEFAULTS.to_vec()
        } else {
            type_filters.to_vec()
        };

        let query = if coordinates.len() == 1 {
            SpatialQuery {
                mode: QueryMode::Nearby,
                samples: coordinates.to_vec(),
                type_filters,
                radius_meters,
                result_limit: self.config.nearby_limit,
                timeout: self.config.nearby_timeout,
            }
        } else {
            let samples = sample_indices(coordinates.len(), self.config.max_samples)
                .into_iter()
                .map(|i| coordinates[i])
                .collect();
            SpatialQuery {
                mode: QueryMode::AlongRoute,
                samples,
                type_filters,
                radius_meters,
                result_limit: self.config.along_route_limit,
                timeout: self.config.along_route_timeout,
            }
        };

        debug!(
            "[PoiSampler] {:?} query: {} of {} points sampled, {} types, radius {}m",
            query.mode,
            query.samples.len(),
            coordinates.len(),
            query.type_filters.len(),
            radius_meters
        );

        Ok(query)
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }
}

/// [`PoiSampler::build_query`] with the default configuration.
pub fn build_query(
    coordinates: &[GeoPoint],
    radius_meters: f64,
    type_filters: &[PoiType],
) -> Result<SpatialQuery> {
    PoiSampler::default().build_query(coordinates, radius_meters, type_filters)
}

// ============================================================================
// Query Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

/// A POI returned by the spatial-query collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiElement {
    pub id: u64,
    pub kind: ElementKind,
    /// Node position, or the center of a way/relation
    pub position: GeoPoint,
    pub tags: HashMap<String, String>,
}

impl PoiElement {
    /// `name` tag, else any tag value, else "POI".
    pub fn display_name(&self) -> &str {
        self.tags
            .get("name")
            .or_else(|| self.tags.values().next())
            .map(String::as_str)
            .unwrap_or("POI")
    }

    /// The `amenity` or `shop` tag that matched.
    pub fn category(&self) -> Option<&str> {
        self.tags
            .get("amenity")
            .or_else(|| self.tags.get("shop"))
            .map(String::as_str)
    }
}

/// Overpass JSON response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<OverpassCenter>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OverpassCenter {
    pub lat: f64,
    pub lon: f64,
}

impl OverpassElement {
    fn position(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon, self.center) {
            (Some(lat), Some(lon), _) => Some(GeoPoint::new(lat, lon)),
            (_, _, Some(center)) => Some(GeoPoint::new(center.lat, center.lon)),
            _ => None,
        }
    }
}

impl OverpassResponse {
    /// Convert to POIs, dropping elements with no usable position.
    pub fn into_elements(self) -> Vec<PoiElement> {
        let total = self.elements.len();
        let elements: Vec<PoiElement> = self
            .elements
            .into_iter()
            .filter_map(|raw| {
                let position = raw.position().filter(GeoPoint::is_valid)?;
                Some(PoiElement {
                    id: raw.id,
                    kind: raw.kind,
                    position,
                    tags: raw.tags,
                })
            })
            .collect();

        if elements.len() < total {
            debug!(
                "[PoiSampler] Dropped {} elements without a position",
                total - elements.len()
            );
        }
        elements
    }
}

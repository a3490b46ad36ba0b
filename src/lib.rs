//! # Route Navigator
//!
//! Navigation and deviation engine for turn-by-turn routing.
//!
//! This library provides:
//! - Conversion of a routing provider's encoded path into a [`RouteModel`]
//! - Haversine and point-to-polyline distance math
//! - Off-route detection over a live position stream, with reroute requests
//! - A navigation session that applies routes with latest-request-wins ordering
//! - Spatial sampling of a polyline into one batched POI proximity query
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel polyline distance with rayon
//! - **`http`** - Enable HTTP clients for the routing and POI providers
//! - **`persistence`** - Enable SQLite storage for the last-route cache
//! - **`full`** - Enable all features
//!
//! ## Coordinate order
//!
//! Two coordinate types exist on purpose. [`GeoPoint`] is `(lat, lng)` and is
//! used for positions, geocoding and POI queries. [`GeometryPoint`] is
//! `(lng, lat)` and is used only inside route geometry. Converting between
//! them is always explicit ([`GeoPoint::to_geometry`], [`GeometryPoint::to_geo`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use route_navigator::{GeoPoint, haversine_distance};
//!
//! let start = GeoPoint::new(9.03, 38.7578);
//! let end = GeoPoint::new(9.05, 38.76);
//!
//! let meters = haversine_distance(&start, &end);
//! assert!(meters > 2000.0 && meters < 2500.0);
//! assert_eq!(start.to_geometry().to_geo(), start);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{NavError, OptionExt, Result};

// Geographic utilities (haversine, point-to-polyline distance)
pub mod geo_utils;
pub use geo_utils::{distance_to_polyline, haversine_distance, polyline_length};
#[cfg(feature = "parallel")]
pub use geo_utils::distance_to_polyline_parallel;

// Canonical route model
pub mod route;
pub use route::{decode_route, encode_route, RouteModel, Segment, Step};

// Provider path -> RouteModel conversion
pub mod adapter;
pub use adapter::{to_route_model, DirectionsResponse, ProviderInstruction, ProviderPath};

// Collaborator interfaces (directions, geocoding, spatial query, storage)
pub mod collaborators;
pub use collaborators::{
    DirectionsRequest, DirectionsService, GeocodeHit, GeocodingService, MemoryRouteStore,
    RouteStore, SpatialQueryService,
};

// Off-route detection
pub mod deviation;
pub use deviation::{
    DeviationMonitor, DeviationState, Evaluation, LivePosition, MonitorConfig, RerouteRequest,
};

// Navigation session (route requests, reroutes, last-route cache)
pub mod session;
pub use session::{
    NavigationSession, PositionOutcome, RouteRequest, SessionConfig, SessionEvent,
};

// POI spatial sampling and query building
pub mod poi;
pub use poi::{
    build_query, parse_type_filters, sample_indices, ElementKind, OverpassResponse, PoiElement,
    PoiSampler, PoiType, QueryMode, SamplerConfig, SpatialQuery,
};

// Per-client request limiting for the POI/routing backend
pub mod rate_limit;
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimitConfig};

// SQLite storage for the last-route cache
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteRouteStore;

// HTTP clients for provider calls
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{GraphHopperClient, OverpassClient, ProviderConfig};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS-84 position in `(latitude, longitude)` order.
///
/// Used for live positions, geocoding results, route endpoints and POI
/// sampling. Route geometry uses [`GeometryPoint`] instead.
///
/// # Example
/// ```
/// use route_navigator::GeoPoint;
/// let point = GeoPoint::new(9.03, 38.7578); // Addis Ababa
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new position.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Reorder into route geometry convention.
    pub fn to_geometry(self) -> GeometryPoint {
        GeometryPoint {
            lng: self.lng,
            lat: self.lat,
        }
    }
}

/// A route geometry vertex in `(longitude, latitude)` order.
///
/// Only [`RouteModel::geometry`] holds these. The order matches GeoJSON and
/// the `x, y` convention of the `geo` crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeometryPoint {
    /// Create a new geometry vertex. Note the argument order.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Reorder into position convention.
    pub fn to_geo(self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.to_geo().is_valid()
    }
}

impl From<geo::Coord<f64>> for GeometryPoint {
    fn from(coord: geo::Coord<f64>) -> Self {
        // geo stores x = longitude, y = latitude
        GeometryPoint::new(coord.x, coord.y)
    }
}

/// Travel mode for route requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Car,
    Foot,
    Bike,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Car => "car",
            TravelMode::Foot => "foot",
            TravelMode::Bike => "bike",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" | "drive" => Ok(TravelMode::Car),
            "foot" | "walk" => Ok(TravelMode::Foot),
            "bike" => Ok(TravelMode::Bike),
            other => Err(NavError::Config {
                message: format!("unknown travel mode '{}'", other),
            }),
        }
    }
}

/// Road features the provider can be asked to avoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvoidFeature {
    Toll,
    Ferry,
    Motorway,
}

impl AvoidFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvoidFeature::Toll => "toll",
            AvoidFeature::Ferry => "ferry",
            AvoidFeature::Motorway => "motorway",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

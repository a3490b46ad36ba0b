//! Unified error handling for the route-navigator library.
//!
//! Errors fall into two groups:
//! - contract violations (`MalformedRoute`, `EmptyPolyline`, `InvalidRadius`,
//!   `InvalidPoiType`): the call is rejected and nothing is retried
//! - operational failures (`NoRouteFound`, `ProviderTimeout`, `Http`,
//!   `DestinationNotFound`): surfaced to the session caller as a
//!   "could not route" condition while any active route stays in place

use thiserror::Error;

/// Unified error type for route-navigator operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavError {
    /// Provider geometry is missing, undecodable or too short
    #[error("Malformed route: {message}")]
    MalformedRoute { message: String },

    /// Provider answered with zero paths
    #[error("No route found between the requested points")]
    NoRouteFound,

    /// Polyline has fewer than 2 points
    #[error("Polyline has {point_count} points, minimum 2 required")]
    EmptyPolyline { point_count: usize },

    /// Search radius is zero, negative or not finite
    #[error("Invalid search radius: {radius_meters}m")]
    InvalidRadius { radius_meters: f64 },

    /// POI filter tag outside the supported set
    #[error("Unknown POI type '{tag}'")]
    InvalidPoiType { tag: String },

    /// Destination text geocoded to nothing
    #[error("Destination '{query}' could not be found")]
    DestinationNotFound { query: String },

    /// Provider did not answer before the deadline
    #[error("{operation} timed out after {timeout_secs}s")]
    ProviderTimeout {
        operation: String,
        timeout_secs: u64,
    },

    /// A newer route request was issued before this response arrived
    #[error("Route response #{sequence} discarded, request #{latest} is current")]
    StaleResponse { sequence: u64, latest: u64 },

    /// Cached route could not be read or decoded
    #[error("Storage read error: {message}")]
    StorageRead { message: String },

    /// Storage backend or encoding failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// HTTP/API error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl NavError {
    /// Expected failures of a healthy system, shown to the user as "could not route".
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            NavError::NoRouteFound
                | NavError::ProviderTimeout { .. }
                | NavError::Http { .. }
                | NavError::DestinationNotFound { .. }
        )
    }

    /// Caller handed in something that breaks a precondition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            NavError::MalformedRoute { .. }
                | NavError::EmptyPolyline { .. }
                | NavError::InvalidRadius { .. }
                | NavError::InvalidPoiType { .. }
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        NavError::MalformedRoute {
            message: message.into(),
        }
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

/// Result type alias for route-navigator operations.
pub type Result<T> = std::result::Result<T, NavError>;

/// Extension trait for converting Option to NavError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a malformed route error.
    fn ok_or_malformed(self, message: &str) -> Result<T>;

    /// Convert Option to Result with a no-route error.
    fn ok_or_no_route(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_malformed(self, message: &str) -> Result<T> {
        self.ok_or_else(|| NavError::malformed(message))
    }

    fn ok_or_no_route(self) -> Result<T> {
        self.ok_or(NavError::NoRouteFound)
    }
}

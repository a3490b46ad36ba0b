//! Canonical in-memory route: geometry plus turn-by-turn segments.
//!
//! A [`RouteModel`] can only be built through [`RouteModel::new`] (or decoded
//! through [`decode_route`], which re-validates), so every instance holds:
//! - at least 2 geometry points
//! - at least 1 segment
//! - step way-points inside the geometry and non-decreasing across steps
//! - totals equal to the sum over segments

use serde::{Deserialize, Serialize};

use crate::{GeometryPoint, NavError, Result};

/// One maneuver of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable maneuver text
    pub instruction_text: String,
    pub distance_meters: Option<f64>,
    pub duration_millis: Option<u64>,
    /// Indices into the owning route's geometry covered by this step
    pub way_points: Option<Vec<usize>>,
}

/// An ordered run of steps. Totals come from the provider, not from the steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub steps: Vec<Step>,
    pub distance_meters: f64,
    pub duration_millis: u64,
}

/// A computed route. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteModel {
    geometry: Vec<GeometryPoint>,
    segments: Vec<Segment>,
    distance_meters: f64,
    duration_millis: u64,
}

impl RouteModel {
    /// Build a route, checking every structural invariant.
    ///
    /// Totals are the sum over `segments`.
    pub fn new(geometry: Vec<GeometryPoint>, segments: Vec<Segment>) -> Result<Self> {
        let distance_meters = segments.iter().map(|s| s.distance_meters).sum();
        let duration_millis = segments.iter().map(|s| s.duration_millis).sum();

        let route = Self {
            geometry,
            segments,
            distance_meters,
            duration_millis,
        };
        route.validate()?;
        Ok(route)
    }

    /// Check the structural invariants of this route.
    pub fn validate(&self) -> Result<()> {
        if self.geometry.len() < 2 {
            return Err(NavError::malformed(format!(
                "geometry has {} points, minimum 2 required",
                self.geometry.len()
            )));
        }
        if let Some(bad) = self.geometry.iter().position(|p| !p.is_valid()) {
            return Err(NavError::malformed(format!(
                "geometry point {} is out of range",
                bad
            )));
        }
        if self.segments.is_empty() {
            return Err(NavError::malformed("route has no segments"));
        }

        let mut previous = 0usize;
        for step in self.segments.iter().flat_map(|s| &s.steps) {
            let Some(indices) = &step.way_points else {
                continue;
            };
            for &index in indices {
                if index >= self.geometry.len() {
                    return Err(NavError::malformed(format!(
                        "way-point {} outside geometry of {} points",
                        index,
                        self.geometry.len()
                    )));
                }
                if index < previous {
                    return Err(NavError::malformed(format!(
                        "way-point {} follows {}",
                        index, previous
                    )));
                }
                previous = index;
            }
        }

        let segment_distance: f64 = self.segments.iter().map(|s| s.distance_meters).sum();
        let segment_duration: u64 = self.segments.iter().map(|s| s.duration_millis).sum();
        if (segment_distance - self.distance_meters).abs() > 1e-6
            || segment_duration != self.duration_millis
        {
            return Err(NavError::malformed("route totals differ from segment totals"));
        }

        Ok(())
    }

    /// Path vertices in `(lng, lat)` order.
    pub fn geometry(&self) -> &[GeometryPoint] {
        &self.geometry
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn duration_millis(&self) -> u64 {
        self.duration_millis
    }

    /// First geometry vertex.
    pub fn start(&self) -> GeometryPoint {
        self.geometry[0]
    }

    /// Last geometry vertex (the route's destination).
    pub fn end(&self) -> GeometryPoint {
        self.geometry[self.geometry.len() - 1]
    }

    /// All steps across segments, in order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.segments.iter().flat_map(|s| s.steps.iter())
    }
}

/// Encode a route for the durable "last route" slot (MessagePack, named fields).
pub fn encode_route(route: &RouteModel) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(route).map_err(|e| NavError::Storage {
        message: format!("failed to encode route: {}", e),
    })
}

/// Decode a cached route, re-checking every invariant.
pub fn decode_route(bytes: &[u8]) -> Result<RouteModel> {
    let route: RouteModel = rmp_serde::from_slice(bytes).map_err(|e| NavError::StorageRead {
        message: format!("failed to decode route: {}", e),
    })?;
    route.validate().map_err(|e| NavError::StorageRead {
        message: e.to_string(),
    })?;
    Ok(route)
}

//! Provider path → [`RouteModel`] conversion.
//!
//! The directions provider answers with a compact encoded polyline (precision
//! 5, `(lat, lng)` pairs) and a list of instructions. This module is the one
//! place where decoded pairs become `(lng, lat)` geometry vertices.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::route::{RouteModel, Segment, Step};
use crate::{GeometryPoint, NavError, Result};

/// Encoded polyline precision used by the provider (1e-5 degrees).
pub const POLYLINE_PRECISION: u32 = 5;

/// Meters of path assumed per geometry point when the provider gives no interval.
pub const METERS_PER_WAY_POINT: f64 = 10.0;

/// Directions collaborator response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub paths: Vec<ProviderPath>,
}

/// One path as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderPath {
    /// Encoded polyline; absent or empty means no geometry
    #[serde(default)]
    pub points: Option<String>,
    #[serde(default)]
    pub instructions: Vec<ProviderInstruction>,
    /// Meters
    #[serde(default)]
    pub distance: f64,
    /// Milliseconds
    #[serde(default)]
    pub time: u64,
}

/// One provider instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderInstruction {
    pub text: String,
    /// Meters
    #[serde(default)]
    pub distance: Option<f64>,
    /// Milliseconds
    #[serde(default)]
    pub time: Option<u64>,
    /// First and last geometry index covered, when the provider reports it
    #[serde(default)]
    pub interval: Option<[usize; 2]>,
}

/// Convert a provider path into a [`RouteModel`].
///
/// Fails with [`NavError::MalformedRoute`] when the path has no encoded
/// geometry, the encoding is corrupt, or it decodes to fewer than 2 points.
/// Totals come straight from the provider, never from the geometry.
pub fn to_route_model(path: &ProviderPath) -> Result<RouteModel> {
    let encoded = path
        .points
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| NavError::malformed("provider path has no encoded geometry"))?;

    let geometry = decode_geometry(encoded)?;
    if geometry.len() < 2 {
        return Err(NavError::malformed(format!(
            "geometry decoded to {} points, minimum 2 required",
            geometry.len()
        )));
    }

    let steps = map_instructions(&path.instructions, geometry.len())?;

    debug!(
        "[ProviderAdapter] Decoded {} points, {} steps, {:.0}m",
        geometry.len(),
        steps.len(),
        path.distance
    );

    let segment = Segment {
        steps,
        distance_meters: path.distance,
        duration_millis: path.time,
    };
    RouteModel::new(geometry, vec![segment])
}

/// Decode an encoded polyline into `(lng, lat)` geometry.
fn decode_geometry(encoded: &str) -> Result<Vec<GeometryPoint>> {
    // The polyline crate yields geo coords with x = lng, y = lat; this is
    // the single (lat, lng) -> (lng, lat) reorder for provider geometry.
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
        .map_err(|e| NavError::malformed(format!("undecodable polyline: {}", e)))?;

    let geometry: Vec<GeometryPoint> = line.coords().copied().map(GeometryPoint::from).collect();
    if let Some(bad) = geometry.iter().position(|p| !p.is_valid()) {
        return Err(NavError::malformed(format!(
            "decoded point {} is out of range",
            bad
        )));
    }
    Ok(geometry)
}

fn map_instructions(
    instructions: &[ProviderInstruction],
    point_count: usize,
) -> Result<Vec<Step>> {
    let mut cursor = 0usize;
    instructions
        .iter()
        .map(|instruction| {
            let way_points = match instruction.interval {
                Some([first, last]) => {
                    if first > last || last >= point_count {
                        return Err(NavError::malformed(format!(
                            "instruction interval [{}, {}] outside geometry of {} points",
                            first, last, point_count
                        )));
                    }
                    cursor = last + 1;
                    (first..=last).collect()
                }
                None => estimate_way_points(instruction.distance, &mut cursor, point_count),
            };

            Ok(Step {
                instruction_text: instruction.text.clone(),
                distance_meters: instruction.distance,
                duration_millis: instruction.time,
                way_points: Some(way_points),
            })
        })
        .collect()
}

/// APPROXIMATE way-point coverage for an instruction without a provider interval.
///
/// Assumes one geometry point per [`METERS_PER_WAY_POINT`] of instruction
/// distance (minimum 1) and hands out contiguous index blocks in order. This
/// is a heuristic with no ground truth behind it. Blocks are truncated at the
/// geometry end; a block starting past the end is pinned to the last index.
pub fn estimate_way_points(
    distance_meters: Option<f64>,
    cursor: &mut usize,
    point_count: usize,
) -> Vec<usize> {
    let estimated = (distance_meters.unwrap_or(0.0) / METERS_PER_WAY_POINT).round();
    let count = if estimated.is_finite() && estimated >= 1.0 {
        estimated as usize
    } else {
        1
    };

    let start = *cursor;
    *cursor = cursor.saturating_add(count);

    let last = point_count.saturating_sub(1);
    if start > last {
        return vec![last];
    }
    (start..(*cursor).min(point_count)).collect()
}

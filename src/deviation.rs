//! Off-route detection over a live position stream.
//!
//! The monitor is edge-triggered per position update: every fix farther than
//! the threshold from the active route emits one reroute request, after which
//! the monitor is back in [`DeviationState::OnRoute`]. A sustained off-route
//! condition therefore produces one request per qualifying fix. An optional
//! cooldown ([`MonitorConfig::reroute_cooldown`]) can suppress requests that
//! follow too closely; it is off by default.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::geo_utils::distance_to_polyline;
use crate::route::RouteModel;
use crate::{GeoPoint, Result, TravelMode};

/// Distance from the route beyond which a fix counts as a deviation.
pub const DEVIATION_THRESHOLD_METERS: f64 = 80.0;

/// Configuration for off-route detection.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Fixes strictly farther than this from the route are deviations.
    /// Default: 80.0 meters
    pub deviation_threshold_meters: f64,

    /// Minimum time between two emitted reroute requests, measured on fix
    /// receipt times. Default: None (one request per qualifying fix)
    pub reroute_cooldown: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            deviation_threshold_meters: DEVIATION_THRESHOLD_METERS,
            reroute_cooldown: None,
        }
    }
}

/// The most recent fix from the position stream. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePosition {
    pub point: GeoPoint,
    pub received_at: Instant,
}

impl LivePosition {
    /// A fix received now.
    pub fn now(point: GeoPoint) -> Self {
        Self::at(point, Instant::now())
    }

    pub fn at(point: GeoPoint, received_at: Instant) -> Self {
        Self { point, received_at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationState {
    OnRoute,
    OffRoute,
}

/// Request to recompute the route from where the user is now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerouteRequest {
    /// Current live position
    pub origin: GeoPoint,
    /// Final geometry point of the deviated route
    pub destination: GeoPoint,
    pub mode: TravelMode,
}

/// Outcome of evaluating one fix.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No active route; nothing evaluated
    Idle,
    /// Same coordinates as the previous fix; nothing evaluated
    Duplicate,
    OnRoute { distance_meters: f64 },
    Deviated {
        distance_meters: f64,
        request: RerouteRequest,
    },
    /// Off route, but a request was emitted less than the cooldown ago
    CoolingDown {
        distance_meters: f64,
        remaining: Duration,
    },
}

/// Edge-triggered off-route detector.
#[derive(Debug, Clone)]
pub struct DeviationMonitor {
    config: MonitorConfig,
    state: DeviationState,
    last_position: Option<LivePosition>,
    /// Coordinates of the last fix measured against a route
    last_evaluated: Option<GeoPoint>,
    last_reroute_at: Option<Instant>,
    reroutes_emitted: u64,
}

impl DeviationMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: DeviationState::OnRoute,
            last_position: None,
            last_evaluated: None,
            last_reroute_at: None,
            reroutes_emitted: 0,
        }
    }

    /// Evaluate one fix against the active route.
    ///
    /// `route` is `None` while no route is active, in which case the monitor
    /// only remembers the fix. Duplicates are judged against the last fix
    /// that was actually measured, so a fix seen while idle is still
    /// measured once a route is active.
    pub fn observe(
        &mut self,
        position: LivePosition,
        route: Option<&RouteModel>,
        mode: TravelMode,
    ) -> Result<Evaluation> {
        self.last_position = Some(position);

        let Some(route) = route else {
            return Ok(Evaluation::Idle);
        };
        if self.last_evaluated == Some(position.point) {
            return Ok(Evaluation::Duplicate);
        }
        self.last_evaluated = Some(position.point);

        let distance_meters = distance_to_polyline(&position.point, route.geometry())?;
        if distance_meters <= self.config.deviation_threshold_meters {
            return Ok(Evaluation::OnRoute { distance_meters });
        }

        self.transition(DeviationState::OffRoute);
        let evaluation = match self.cooldown_remaining(position.received_at) {
            Some(remaining) => {
                debug!(
                    "[DeviationMonitor] {:.1}m off route, reroute suppressed for {:?}",
                    distance_meters, remaining
                );
                Evaluation::CoolingDown {
                    distance_meters,
                    remaining,
                }
            }
            None => {
                let request = RerouteRequest {
                    origin: position.point,
                    destination: route.end().to_geo(),
                    mode,
                };
                self.last_reroute_at = Some(position.received_at);
                self.reroutes_emitted += 1;
                info!(
                    "[DeviationMonitor] {:.1}m off route (threshold {:.0}m), reroute #{} requested",
                    distance_meters, self.config.deviation_threshold_meters, self.reroutes_emitted
                );
                Evaluation::Deviated {
                    distance_meters,
                    request,
                }
            }
        };
        self.transition(DeviationState::OnRoute);

        Ok(evaluation)
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let cooldown = self.config.reroute_cooldown?;
        let last = self.last_reroute_at?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn transition(&mut self, to: DeviationState) {
        if self.state != to {
            debug!("[DeviationMonitor] {:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }

    pub fn state(&self) -> DeviationState {
        self.state
    }

    pub fn last_position(&self) -> Option<LivePosition> {
        self.last_position
    }

    pub fn last_evaluated(&self) -> Option<GeoPoint> {
        self.last_evaluated
    }

    pub fn reroutes_emitted(&self) -> u64 {
        self.reroutes_emitted
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Default for DeviationMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

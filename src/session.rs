//! # Navigation Session
//!
//! Orchestrates route requests, deviation monitoring, reroutes and the
//! cached last route.
//!
//! ## Ordering
//!
//! Every route request takes a sequence number from a monotonically
//! increasing counter before it goes out. A response is applied only if its
//! sequence number is still the latest one issued when it arrives; anything
//! older is discarded with [`NavError::StaleResponse`]. Two overlapping
//! requests therefore always end with the later request's route, whatever
//! order the responses come back in.
//!
//! ## State
//!
//! The active route is an `Arc<RouteModel>` that is swapped whole under a
//! lock, so readers see a complete route or none. The lock is never held
//! across an await. The persisted copy is written under the same lock, so the
//! store always holds the route that is active.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::adapter::to_route_model;
use crate::collaborators::{DirectionsRequest, DirectionsService, GeocodingService, RouteStore};
use crate::deviation::{DeviationMonitor, Evaluation, LivePosition, MonitorConfig, RerouteRequest};
use crate::route::{decode_route, encode_route, RouteModel};
use crate::{AvoidFeature, GeoPoint, NavError, OptionExt, Result, TravelMode};

/// Configuration for a navigation session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Off-route detection settings
    pub monitor: MonitorConfig,

    /// Deadline for each directions/geocoding call.
    /// Default: 20 seconds
    pub route_timeout: Duration,

    /// Storage key of the cached last route.
    /// Default: "last_route"
    pub storage_key: String,

    /// Travel mode before the first request.
    /// Default: car
    pub default_mode: TravelMode,

    /// Buffered notifications per subscriber before the oldest are dropped.
    /// Default: 32
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            route_timeout: Duration::from_secs(20),
            storage_key: "last_route".to_string(),
            default_mode: TravelMode::Car,
            event_capacity: 32,
        }
    }
}

/// A route request from an origin to a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: GeoPoint,
    /// Intermediate stops, in visiting order
    pub waypoints: Vec<GeoPoint>,
    pub destination: GeoPoint,
    pub mode: TravelMode,
    pub avoid: Vec<AvoidFeature>,
}

impl RouteRequest {
    pub fn new(origin: GeoPoint, destination: GeoPoint, mode: TravelMode) -> Self {
        Self {
            origin,
            waypoints: Vec::new(),
            destination,
            mode,
            avoid: Vec::new(),
        }
    }

    pub fn with_waypoints(mut self, waypoints: Vec<GeoPoint>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn avoiding(mut self, avoid: Vec<AvoidFeature>) -> Self {
        self.avoid = avoid;
        self
    }

    /// `[origin, ...waypoints, destination]`
    pub fn coordinates(&self) -> Vec<GeoPoint> {
        let mut coordinates = Vec::with_capacity(self.waypoints.len() + 2);
        coordinates.push(self.origin);
        coordinates.extend_from_slice(&self.waypoints);
        coordinates.push(self.destination);
        coordinates
    }

    fn to_directions(&self) -> DirectionsRequest {
        DirectionsRequest {
            coordinates: self.coordinates(),
            mode: self.mode,
            avoid: self.avoid.clone(),
        }
    }

    fn reroute(request: &RerouteRequest, avoid: Vec<AvoidFeature>) -> Self {
        Self::new(request.origin, request.destination, request.mode).avoiding(avoid)
    }
}

/// Non-blocking notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RouteReplaced {
        sequence: u64,
        distance_meters: f64,
        duration_millis: u64,
    },
    ResponseDiscarded {
        sequence: u64,
        latest: u64,
    },
    /// Reroute failed; the previous route keeps guiding
    RerouteFailed {
        message: String,
    },
}

/// What a live position update led to.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    /// No active route
    Idle,
    Duplicate,
    OnRoute { distance_meters: f64 },
    CoolingDown { distance_meters: f64 },
    /// Off route and the new route is now active
    Rerouted(Arc<RouteModel>),
    /// Off route, but a newer request overtook this reroute
    RerouteSuperseded,
    /// Off route and the reroute failed; the stale route stays active
    RerouteFailed(NavError),
}

struct SessionState {
    active_route: Option<Arc<RouteModel>>,
    origin: Option<GeoPoint>,
    travel_mode: TravelMode,
    avoid: Vec<AvoidFeature>,
    monitor: DeviationMonitor,
}

/// The navigation session.
///
/// Generic over the directions provider and the durable store so tests and
/// platforms can plug in their own.
pub struct NavigationSession<D, S> {
    directions: D,
    store: S,
    config: SessionConfig,
    state: Mutex<SessionState>,
    sequence: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl<D: DirectionsService, S: RouteStore> NavigationSession<D, S> {
    /// Create a session with no active route.
    pub fn new(directions: D, store: S, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = SessionState {
            active_route: None,
            origin: None,
            travel_mode: config.default_mode,
            avoid: Vec::new(),
            monitor: DeviationMonitor::new(config.monitor.clone()),
        };

        Self {
            directions,
            store,
            config,
            state: Mutex::new(state),
            sequence: AtomicU64::new(0),
            events,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Route Requests
    // ========================================================================

    /// Request a route from `origin` to `destination` and make it active.
    pub async fn request_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> Result<Arc<RouteModel>> {
        self.request_route_with(RouteRequest::new(origin, destination, mode))
            .await
    }

    /// Request a route and make it active if no newer request was issued meanwhile.
    ///
    /// On any failure the active route is left untouched. Failures are not
    /// retried.
    pub async fn request_route_with(&self, request: RouteRequest) -> Result<Arc<RouteModel>> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let directions_request = request.to_directions();

        info!(
            "[NavigationSession] Route request #{}: {} points, mode={}",
            sequence,
            directions_request.coordinates.len(),
            request.mode
        );

        let response = self
            .with_deadline("directions", self.directions.route(&directions_request))
            .await;

        // A superseded request is stale whatever its provider outcome was
        let latest = self.sequence.load(Ordering::SeqCst);
        if sequence != latest {
            return Err(self.discard(sequence, latest));
        }

        let response = response?;
        let path = response.paths.first().ok_or_no_route()?;
        let route = Arc::new(to_route_model(path)?);

        {
            let mut state = self.lock_state();
            let latest = self.sequence.load(Ordering::SeqCst);
            if sequence != latest {
                return Err(self.discard(sequence, latest));
            }

            state.active_route = Some(Arc::clone(&route));
            state.origin = Some(request.origin);
            state.travel_mode = request.mode;
            state.avoid = request.avoid;
            self.persist(&route);
        }

        info!(
            "[NavigationSession] Applied route #{}: {} points, {:.0}m, {}s",
            sequence,
            route.geometry().len(),
            route.distance_meters(),
            route.duration_millis() / 1000
        );
        let _ = self.events.send(SessionEvent::RouteReplaced {
            sequence,
            distance_meters: route.distance_meters(),
            duration_millis: route.duration_millis(),
        });

        Ok(route)
    }

    fn discard(&self, sequence: u64, latest: u64) -> NavError {
        warn!(
            "[NavigationSession] Discarding response #{} (latest request is #{})",
            sequence, latest
        );
        let _ = self
            .events
            .send(SessionEvent::ResponseDiscarded { sequence, latest });
        NavError::StaleResponse { sequence, latest }
    }

    /// Geocode the destination and waypoint texts, then request the route.
    ///
    /// The origin is never geocoded. A destination with no match fails with
    /// [`NavError::DestinationNotFound`]; blank waypoint texts are ignored and
    /// waypoints with no match are skipped.
    pub async fn plan_route<G: GeocodingService + ?Sized>(
        &self,
        geocoder: &G,
        origin: GeoPoint,
        destination_text: &str,
        waypoint_texts: &[String],
        mode: TravelMode,
        avoid: Vec<AvoidFeature>,
    ) -> Result<Arc<RouteModel>> {
        let destination_text = destination_text.trim();
        if destination_text.is_empty() {
            return Err(NavError::DestinationNotFound {
                query: String::new(),
            });
        }

        let destination = self
            .with_deadline("geocode", geocoder.search(destination_text, 1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NavError::DestinationNotFound {
                query: destination_text.to_string(),
            })?;

        let mut waypoints = Vec::with_capacity(waypoint_texts.len());
        for text in waypoint_texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            match self
                .with_deadline("geocode", geocoder.search(text, 1))
                .await?
                .into_iter()
                .next()
            {
                Some(hit) => waypoints.push(hit.coordinate),
                None => warn!("[NavigationSession] Waypoint '{}' not found, skipping", text),
            }
        }

        debug!(
            "[NavigationSession] Planned '{}' with {} waypoints",
            destination_text,
            waypoints.len()
        );

        let request = RouteRequest::new(origin, destination.coordinate, mode)
            .with_waypoints(waypoints)
            .avoiding(avoid);
        self.request_route_with(request).await
    }

    async fn with_deadline<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.route_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[NavigationSession] {} call timed out after {:?}",
                    operation, self.config.route_timeout
                );
                Err(NavError::ProviderTimeout {
                    operation: operation.to_string(),
                    timeout_secs: self.config.route_timeout.as_secs(),
                })
            }
        }
    }

    // ========================================================================
    // Live Positions
    // ========================================================================

    /// Feed one fix to the deviation monitor and reroute when it deviates.
    ///
    /// A failed reroute is not an error: it is reported as
    /// [`PositionOutcome::RerouteFailed`] plus a [`SessionEvent::RerouteFailed`]
    /// notification, and navigation continues on the previous route.
    pub async fn on_live_position(&self, position: LivePosition) -> Result<PositionOutcome> {
        let (evaluation, avoid) = {
            let mut state = self.lock_state();
            let route = state.active_route.clone();
            let mode = state.travel_mode;
            let evaluation = state.monitor.observe(position, route.as_deref(), mode)?;
            (evaluation, state.avoid.clone())
        };

        let request = match evaluation {
            Evaluation::Idle => return Ok(PositionOutcome::Idle),
            Evaluation::Duplicate => return Ok(PositionOutcome::Duplicate),
            Evaluation::OnRoute { distance_meters } => {
                return Ok(PositionOutcome::OnRoute { distance_meters })
            }
            Evaluation::CoolingDown {
                distance_meters, ..
            } => return Ok(PositionOutcome::CoolingDown { distance_meters }),
            Evaluation::Deviated { request, .. } => request,
        };

        match self
            .request_route_with(RouteRequest::reroute(&request, avoid))
            .await
        {
            Ok(route) => Ok(PositionOutcome::Rerouted(route)),
            Err(NavError::StaleResponse { .. }) => Ok(PositionOutcome::RerouteSuperseded),
            Err(e) => {
                warn!("[NavigationSession] Reroute failed, keeping current route: {}", e);
                let _ = self.events.send(SessionEvent::RerouteFailed {
                    message: e.to_string(),
                });
                Ok(PositionOutcome::RerouteFailed(e))
            }
        }
    }

    // ========================================================================
    // Last-Route Cache
    // ========================================================================

    fn persist(&self, route: &RouteModel) {
        let key = &self.config.storage_key;
        let stored = encode_route(route).and_then(|bytes| self.store.set(key, &bytes));
        match stored {
            Ok(()) => debug!("[NavigationSession] Persisted route under '{}'", key),
            Err(e) => warn!("[NavigationSession] Failed to persist route: {}", e),
        }
    }

    /// Load the cached last route and make it active.
    ///
    /// Returns `None` and leaves the session untouched when the cache is
    /// empty, unreadable or holds a malformed route.
    pub fn restore_last_route(&self) -> Option<Arc<RouteModel>> {
        let key = &self.config.storage_key;
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("[NavigationSession] No cached route under '{}'", key);
                return None;
            }
            Err(e) => {
                warn!("[NavigationSession] Ignoring unreadable route cache: {}", e);
                return None;
            }
        };

        let route = match decode_route(&bytes) {
            Ok(route) => Arc::new(route),
            Err(e) => {
                warn!("[NavigationSession] Discarding malformed cached route: {}", e);
                return None;
            }
        };

        info!(
            "[NavigationSession] Restored cached route: {} points, {:.0}m",
            route.geometry().len(),
            route.distance_meters()
        );
        self.lock_state().active_route = Some(Arc::clone(&route));
        Some(route)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn active_route(&self) -> Option<Arc<RouteModel>> {
        self.lock_state().active_route.clone()
    }

    pub fn origin(&self) -> Option<GeoPoint> {
        self.lock_state().origin
    }

    pub fn travel_mode(&self) -> TravelMode {
        self.lock_state().travel_mode
    }

    /// Sequence number of the most recently issued request (0 before any).
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

// ============================================================================
// Tests
// ============================================================================

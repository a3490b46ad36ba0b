//! End-to-end navigation scenarios.
//!
//! Drives a [`NavigationSession`] through fake collaborators: planning from
//! text, deviating and rerouting, racing requests, and restarting from the
//! cached last route.
//!
//! Run with: `cargo test --test navigation_scenarios`
//! SQLite scenarios need `--features persistence`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use geo::Coord;
use route_navigator::{
    build_query, haversine_distance, DirectionsRequest, DirectionsResponse, DirectionsService,
    GeoPoint, GeocodeHit, GeocodingService, LivePosition, MemoryRouteStore, NavError,
    NavigationSession, PositionOutcome, ProviderInstruction, ProviderPath, QueryMode, Result,
    RouteStore, SessionConfig, SessionEvent, TravelMode,
};
use tokio::sync::oneshot;

const ORIGIN: GeoPoint = GeoPoint {
    lat: 9.03,
    lng: 38.7578,
};
const DESTINATION: GeoPoint = GeoPoint {
    lat: 9.05,
    lng: 38.76,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Provider path through `points` with one instruction per edge plus arrival.
fn provider_path(points: &[GeoPoint]) -> ProviderPath {
    let encoded = polyline::encode_coordinates(
        points.iter().map(|p| Coord { x: p.lng, y: p.lat }),
        5,
    )
    .unwrap();

    let mut instructions: Vec<ProviderInstruction> = points
        .windows(2)
        .enumerate()
        .map(|(i, edge)| ProviderInstruction {
            text: format!("Continue for leg {}", i + 1),
            distance: Some(haversine_distance(&edge[0], &edge[1])),
            time: Some(60_000),
            interval: Some([i, i + 1]),
        })
        .collect();
    instructions.push(ProviderInstruction {
        text: "Arrive at destination".to_string(),
        distance: Some(0.0),
        time: Some(0),
        interval: Some([points.len() - 1, points.len() - 1]),
    });

    let distance = points
        .windows(2)
        .map(|edge| haversine_distance(&edge[0], &edge[1]))
        .sum();

    ProviderPath {
        points: Some(encoded),
        instructions,
        distance,
        time: 60_000 * (points.len() as u64 - 1),
    }
}

fn response(points: &[GeoPoint]) -> DirectionsResponse {
    DirectionsResponse {
        paths: vec![provider_path(points)],
    }
}

/// Answers from a queue and records every request.
#[derive(Default)]
struct RecordingDirections {
    responses: Mutex<VecDeque<Result<DirectionsResponse>>>,
    requests: Mutex<Vec<DirectionsRequest>>,
}

impl RecordingDirections {
    fn answering(responses: Vec<Result<DirectionsResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<DirectionsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl DirectionsService for RecordingDirections {
    fn route<'a>(
        &'a self,
        request: &'a DirectionsRequest,
    ) -> BoxFuture<'a, Result<DirectionsResponse>> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DirectionsResponse::default()));
        Box::pin(async move { next })
    }
}

/// Each call blocks on its own oneshot, so the test decides arrival order.
struct GatedDirections {
    gates: Mutex<VecDeque<oneshot::Receiver<DirectionsResponse>>>,
    calls: AtomicUsize,
}

impl GatedDirections {
    fn new(gates: Vec<oneshot::Receiver<DirectionsResponse>>) -> Arc<Self> {
        Arc::new(Self {
            gates: Mutex::new(gates.into()),
            calls: AtomicUsize::new(0),
        })
    }

    async fn wait_for_calls(&self, n: usize) {
        while self.calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }
}

impl DirectionsService for GatedDirections {
    fn route<'a>(
        &'a self,
        _request: &'a DirectionsRequest,
    ) -> BoxFuture<'a, Result<DirectionsResponse>> {
        let gate = self.gates.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match gate {
                Some(rx) => rx.await.map_err(|_| NavError::NoRouteFound),
                None => Err(NavError::NoRouteFound),
            }
        })
    }
}

struct FixedGeocoder {
    places: HashMap<&'static str, GeoPoint>,
}

impl GeocodingService for FixedGeocoder {
    fn search<'a>(&'a self, text: &'a str, _limit: usize) -> BoxFuture<'a, Result<Vec<GeocodeHit>>> {
        let hits = self
            .places
            .get(text)
            .map(|&coordinate| {
                vec![GeocodeHit {
                    coordinate,
                    label: Some(text.to_string()),
                }]
            })
            .unwrap_or_default();
        Box::pin(async move { Ok(hits) })
    }
}

// ============================================================================
// Scenario: Plan From Text
// ============================================================================

#[tokio::test]
async fn test_plan_from_text_builds_route_model() {
    init_logging();
    let midpoint = GeoPoint::new(9.04, 38.759);
    let directions = RecordingDirections::answering(vec![Ok(response(&[
        ORIGIN,
        midpoint,
        DESTINATION,
    ]))]);
    let geocoder = FixedGeocoder {
        places: HashMap::from([("Meskel Square", DESTINATION)]),
    };
    let session = NavigationSession::new(
        directions.clone(),
        Arc::new(MemoryRouteStore::new()),
        SessionConfig::default(),
    );

    let route = session
        .plan_route(&geocoder, ORIGIN, "Meskel Square", &[], TravelMode::Car, vec![])
        .await
        .unwrap();

    assert_eq!(route.geometry().len(), 3);
    assert_eq!(route.segments().len(), 1);
    assert_eq!(route.steps().count(), 3);

    // Geometry is (lng, lat)
    let first = route.geometry()[0];
    assert!((first.lng - 38.7578).abs() < 1e-5);
    assert!((first.lat - 9.03).abs() < 1e-5);

    let steps: Vec<_> = route.steps().collect();
    assert_eq!(steps[0].way_points, Some(vec![0, 1]));
    assert_eq!(steps[2].way_points, Some(vec![2]));

    assert_eq!(directions.requests()[0].coordinates, vec![ORIGIN, DESTINATION]);
}

#[tokio::test]
async fn test_plan_from_text_estimates_step_coverage() {
    init_logging();
    let midpoint = GeoPoint::new(9.04, 38.759);
    let encoded = polyline::encode_coordinates(
        [ORIGIN, midpoint, DESTINATION]
            .iter()
            .map(|p| Coord { x: p.lng, y: p.lat }),
        5,
    )
    .unwrap();
    let path = ProviderPath {
        points: Some(encoded),
        instructions: vec![
            ProviderInstruction {
                text: "Head north on Churchill Avenue".to_string(),
                distance: Some(1100.0),
                time: Some(90_000),
                interval: None,
            },
            ProviderInstruction {
                text: "Arrive at destination".to_string(),
                distance: Some(0.0),
                time: Some(0),
                interval: None,
            },
        ],
        distance: 2250.0,
        time: 180_000,
    };
    let directions = RecordingDirections::answering(vec![Ok(DirectionsResponse {
        paths: vec![path],
    })]);
    let geocoder = FixedGeocoder {
        places: HashMap::from([("Meskel Square", DESTINATION)]),
    };
    let session = NavigationSession::new(
        directions.clone(),
        Arc::new(MemoryRouteStore::new()),
        SessionConfig::default(),
    );

    let route = session
        .plan_route(&geocoder, ORIGIN, "Meskel Square", &[], TravelMode::Car, vec![])
        .await
        .unwrap();

    assert_eq!(route.geometry().len(), 3);
    assert_eq!(route.segments().len(), 1);
    assert_eq!(route.segments()[0].steps.len(), 2);

    let last = route.geometry()[2];
    assert!((last.lat - 9.05).abs() < 1e-5);
    assert!((last.lng - 38.76).abs() < 1e-5);

    // 1100m at 10m per point overruns the geometry and is truncated
    let steps = &route.segments()[0].steps;
    assert_eq!(steps[0].way_points, Some(vec![0, 1, 2]));
    assert_eq!(steps[1].way_points, Some(vec![2]));

    assert_eq!(route.distance_meters(), 2250.0);
    assert_eq!(route.duration_millis(), 180_000);
    assert_eq!(directions.requests()[0].coordinates, vec![ORIGIN, DESTINATION]);
}

// ============================================================================
// Scenario: Deviation And Reroute
// ============================================================================

#[tokio::test]
async fn test_walk_off_route_and_back() {
    init_logging();
    let north = GeoPoint::new(9.05, 38.7578);
    // ~330m east of the route at the midpoint latitude
    let detour = GeoPoint::new(9.04, 38.7608);
    let directions = RecordingDirections::answering(vec![
        Ok(response(&[ORIGIN, north])),
        Ok(response(&[detour, north])),
    ]);
    let store = Arc::new(MemoryRouteStore::new());
    let session = NavigationSession::new(directions.clone(), store.clone(), SessionConfig::default());
    let mut events = session.subscribe();

    let initial = session
        .request_route(ORIGIN, north, TravelMode::Foot)
        .await
        .unwrap();

    let on_route = session
        .on_live_position(LivePosition::now(GeoPoint::new(9.04, 38.7578)))
        .await
        .unwrap();
    assert!(matches!(on_route, PositionOutcome::OnRoute { .. }));

    let rerouted = session
        .on_live_position(LivePosition::now(detour))
        .await
        .unwrap();
    let PositionOutcome::Rerouted(new_route) = rerouted else {
        panic!("expected reroute, got {:?}", rerouted);
    };

    assert_ne!(new_route, initial);
    assert_eq!(session.active_route(), Some(new_route.clone()));
    assert_eq!(session.current_sequence(), 2);

    let requests = directions.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].coordinates[0], detour);
    assert_eq!(requests[1].mode, TravelMode::Foot);

    // Same fix again changes nothing
    let repeated = session
        .on_live_position(LivePosition::now(detour))
        .await
        .unwrap();
    assert_eq!(repeated, PositionOutcome::Duplicate);
    assert_eq!(directions.requests().len(), 2);

    let mut replaced = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::RouteReplaced { .. }) {
            replaced += 1;
        }
    }
    assert_eq!(replaced, 2);
}

#[tokio::test]
async fn test_reroute_overtaken_by_newer_request() {
    init_logging();
    let (initial_tx, initial_rx) = oneshot::channel();
    let (reroute_tx, reroute_rx) = oneshot::channel();
    let (manual_tx, manual_rx) = oneshot::channel();
    let directions = GatedDirections::new(vec![initial_rx, reroute_rx, manual_rx]);
    let session = Arc::new(NavigationSession::new(
        directions.clone(),
        Arc::new(MemoryRouteStore::new()),
        SessionConfig::default(),
    ));

    initial_tx.send(response(&[ORIGIN, DESTINATION])).unwrap();
    session
        .request_route(ORIGIN, DESTINATION, TravelMode::Car)
        .await
        .unwrap();

    let far_away = GeoPoint::new(9.04, 38.80);
    let reroute = tokio::spawn({
        let session = session.clone();
        async move { session.on_live_position(LivePosition::now(far_away)).await }
    });
    directions.wait_for_calls(2).await;

    let elsewhere = GeoPoint::new(9.02, 38.74);
    let manual = tokio::spawn({
        let session = session.clone();
        async move { session.request_route(ORIGIN, elsewhere, TravelMode::Car).await }
    });
    directions.wait_for_calls(3).await;

    manual_tx.send(response(&[ORIGIN, elsewhere])).unwrap();
    let manual_route = manual.await.unwrap().unwrap();

    reroute_tx.send(response(&[far_away, DESTINATION])).unwrap();
    let outcome = reroute.await.unwrap().unwrap();

    assert_eq!(outcome, PositionOutcome::RerouteSuperseded);
    assert_eq!(session.active_route(), Some(manual_route));
}

// ============================================================================
// Scenario: Restart From Cache
// ============================================================================

#[tokio::test]
async fn test_restart_restores_last_route() {
    init_logging();
    let store = Arc::new(MemoryRouteStore::new());
    let first_run = NavigationSession::new(
        RecordingDirections::answering(vec![Ok(response(&[ORIGIN, DESTINATION]))]),
        store.clone(),
        SessionConfig::default(),
    );
    let route = first_run
        .request_route(ORIGIN, DESTINATION, TravelMode::Car)
        .await
        .unwrap();
    drop(first_run);

    let second_run = NavigationSession::new(
        RecordingDirections::answering(vec![]),
        store,
        SessionConfig::default(),
    );
    let restored = second_run.restore_last_route().unwrap();

    assert_eq!(*restored, *route);
    assert_eq!(second_run.active_route(), Some(restored));
}

#[test]
fn test_corrupt_cache_is_ignored() {
    init_logging();
    let store = Arc::new(MemoryRouteStore::new());
    store.set("last_route", &[0x92, 0x01]).unwrap();

    let session = NavigationSession::new(
        RecordingDirections::answering(vec![]),
        store,
        SessionConfig::default(),
    );
    assert!(session.restore_last_route().is_none());
    assert!(session.active_route().is_none());
}

#[cfg(feature = "persistence")]
#[tokio::test]
async fn test_restart_restores_from_sqlite() {
    use route_navigator::SqliteRouteStore;
    use tempfile::TempDir;

    init_logging();
    let tmp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp_dir.path().join("navigator.db");
    let db_path = db_path.to_str().unwrap();

    let route = {
        let session = NavigationSession::new(
            RecordingDirections::answering(vec![Ok(response(&[ORIGIN, DESTINATION]))]),
            SqliteRouteStore::new(db_path).unwrap(),
            SessionConfig::default(),
        );
        session
            .request_route(ORIGIN, DESTINATION, TravelMode::Bike)
            .await
            .unwrap()
    };

    let session = NavigationSession::new(
        RecordingDirections::answering(vec![]),
        SqliteRouteStore::new(db_path).unwrap(),
        SessionConfig::default(),
    );
    assert_eq!(session.restore_last_route().as_deref(), Some(&*route));
}

// ============================================================================
// Scenario: POIs Along The Active Route
// ============================================================================

#[tokio::test]
async fn test_poi_query_along_active_route() {
    init_logging();
    let points: Vec<GeoPoint> = (0..100)
        .map(|i| GeoPoint::new(9.0 + i as f64 * 0.0005, 38.75 + i as f64 * 0.0002))
        .collect();
    let session = NavigationSession::new(
        RecordingDirections::answering(vec![Ok(response(&points))]),
        Arc::new(MemoryRouteStore::new()),
        SessionConfig::default(),
    );
    let route = session
        .request_route(points[0], points[99], TravelMode::Car)
        .await
        .unwrap();

    let polyline: Vec<GeoPoint> = route.geometry().iter().map(|p| p.to_geo()).collect();
    let query = build_query(&polyline, 1000.0, &[]).unwrap();

    assert_eq!(query.mode, QueryMode::AlongRoute);
    assert_eq!(query.samples.len(), 15);
    assert_eq!(query.samples[0], polyline[0]);
    assert_eq!(query.samples[14], polyline[99]);
    assert!(query.to_overpass_ql().ends_with("out center 50;"));
}

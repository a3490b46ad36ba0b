//! Interfaces of the external collaborators the core talks to.
//!
//! Async collaborators return boxed futures so they can be held as trait
//! objects or generic parameters alike. Storage is synchronous: it is a
//! small key-value slot written once per applied route.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::adapter::DirectionsResponse;
use crate::poi::{PoiElement, SpatialQuery};
use crate::{AvoidFeature, GeoPoint, Result, TravelMode};

/// Request handed to the directions collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    /// `[origin, ...waypoints, destination]`, all `(lat, lng)`
    pub coordinates: Vec<GeoPoint>,
    pub mode: TravelMode,
    /// Omitted from provider calls when empty
    pub avoid: Vec<AvoidFeature>,
}

/// Computes routes between ordered coordinates.
pub trait DirectionsService: Send + Sync {
    fn route<'a>(&'a self, request: &'a DirectionsRequest)
        -> BoxFuture<'a, Result<DirectionsResponse>>;
}

/// One geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub coordinate: GeoPoint,
    pub label: Option<String>,
}

/// Free text → coordinates.
pub trait GeocodingService: Send + Sync {
    fn search<'a>(&'a self, text: &'a str, limit: usize)
        -> BoxFuture<'a, Result<Vec<GeocodeHit>>>;
}

/// Runs a query built by [`crate::poi::build_query`].
pub trait SpatialQueryService: Send + Sync {
    fn query<'a>(&'a self, query: &'a SpatialQuery) -> BoxFuture<'a, Result<Vec<PoiElement>>>;
}

/// Durable key-value slot for the cached last route.
pub trait RouteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// In-process store, for tests and platforms without durable storage.
#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteStore for MemoryRouteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

impl<T: RouteStore + ?Sized> RouteStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).set(key, bytes)
    }
}

impl<T: DirectionsService + ?Sized> DirectionsService for std::sync::Arc<T> {
    fn route<'a>(
        &'a self,
        request: &'a DirectionsRequest,
    ) -> BoxFuture<'a, Result<DirectionsResponse>> {
        (**self).route(request)
    }
}

//! Input geometry resolution.
//!
//! A [`GeometryResolver`] turns a [`GeometrySource`] into a [`FeatureSet`].
//! [`DefaultGeometryResolver`] accepts inline GeoJSON and, with the
//! `http-client` feature, fetches referenced documents over HTTP(S).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::request::GeometrySource;

/// Geometry types a bare GeoJSON geometry object may carry.
const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Errors raised while resolving input geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The document could not be fetched.
    #[error("failed to fetch {uri}: {message}")]
    Fetch {
        /// The requested URL.
        uri: String,
        /// What went wrong.
        message: String,
        /// The underlying client error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server answered with a non-success status.
    #[error("{uri} returned status {status}")]
    Status {
        /// The requested URL.
        uri: String,
        /// HTTP status code.
        status: u16,
    },

    /// The payload is not a Feature, FeatureCollection, or geometry.
    #[error("invalid GeoJSON: {reason}")]
    InvalidGeoJson {
        /// Which check failed.
        reason: String,
    },
}

/// Resolved input: a GeoJSON `Feature` or `FeatureCollection`.
///
/// # Examples
///
/// ```
/// use geoprocessing::geometry::FeatureSet;
/// use serde_json::json;
///
/// let set = FeatureSet::from_geojson(json!({
///     "type": "Polygon",
///     "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]
/// }))
/// .unwrap();
/// assert_eq!(set.len(), 1);
/// assert_eq!(set.geometry_types(), vec!["Polygon"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureSet {
    /// A single `Feature`.
    Feature(Value),
    /// A `FeatureCollection`.
    Collection(Value),
}

impl FeatureSet {
    /// Validates GeoJSON and classifies it. Bare geometries are wrapped in a
    /// `Feature` with empty properties.
    pub fn from_geojson(value: Value) -> Result<Self, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing type member"))?;

        match kind {
            "Feature" => {
                if value.get("geometry").is_none() {
                    return Err(invalid("Feature has no geometry member"));
                }
                Ok(Self::Feature(value))
            },
            "FeatureCollection" => {
                let features = value
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid("FeatureCollection has no features array"))?;
                if let Some(bad) = features
                    .iter()
                    .find(|f| f.get("type").and_then(Value::as_str) != Some("Feature"))
                {
                    return Err(invalid(format!("collection member is not a Feature: {bad}")));
                }
                Ok(Self::Collection(value))
            },
            kind if GEOMETRY_TYPES.contains(&kind) => Ok(Self::Feature(json!({
                "type": "Feature",
                "properties": Map::new(),
                "geometry": value,
            }))),
            other => Err(invalid(format!("unsupported type {other}"))),
        }
    }

    /// The member features, one for a single `Feature`.
    pub fn features(&self) -> Vec<&Value> {
        match self {
            Self::Feature(feature) => vec![feature],
            Self::Collection(collection) => collection
                .get("features")
                .and_then(Value::as_array)
                .map(|features| features.iter().collect())
                .unwrap_or_default(),
        }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features().len()
    }

    /// Returns `true` for an empty collection.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Geometry `type` of each feature; `null` geometries are skipped.
    pub fn geometry_types(&self) -> Vec<&str> {
        self.features()
            .into_iter()
            .filter_map(|f| f.get("geometry")?.get("type")?.as_str())
            .collect()
    }

    /// The underlying GeoJSON document.
    pub fn as_value(&self) -> &Value {
        match self {
            Self::Feature(v) | Self::Collection(v) => v,
        }
    }

    /// Consumes the set, returning the GeoJSON document.
    pub fn into_value(self) -> Value {
        match self {
            Self::Feature(v) | Self::Collection(v) => v,
        }
    }
}

fn invalid(reason: impl Into<String>) -> GeometryError {
    GeometryError::InvalidGeoJson {
        reason: reason.into(),
    }
}

/// Turns a request's geometry source into features.
#[async_trait]
pub trait GeometryResolver: Send + Sync {
    /// Resolves `source`.
    ///
    /// # Errors
    ///
    /// Any [`GeometryError`]; the dispatcher records it on a `Failed` task.
    async fn resolve(&self, source: &GeometrySource) -> Result<FeatureSet, GeometryError>;
}

/// Inline GeoJSON, plus HTTP(S) fetch when built with `http-client`.
#[derive(Debug, Clone)]
pub struct DefaultGeometryResolver {
    #[cfg(feature = "http-client")]
    client: reqwest::Client,
    timeout: Duration,
}

impl DefaultGeometryResolver {
    /// Default fetch timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a resolver with [`Self::DEFAULT_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "http-client")]
            client: reqwest::Client::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured fetch timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[cfg(feature = "http-client")]
    async fn fetch(&self, uri: &str) -> Result<Value, GeometryError> {
        tracing::debug!(uri = uri, "fetching geometry");

        let response = self
            .client
            .get(uri)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GeometryError::Fetch {
                uri: uri.to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;

        if !response.status().is_success() {
            return Err(GeometryError::Status {
                uri: uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| GeometryError::Fetch {
            uri: uri.to_string(),
            message: format!("response is not JSON: {e}"),
            source: Some(Box::new(e)),
        })
    }

    #[cfg(not(feature = "http-client"))]
    async fn fetch(&self, uri: &str) -> Result<Value, GeometryError> {
        Err(GeometryError::Fetch {
            uri: uri.to_string(),
            message: "built without the http-client feature".to_string(),
            source: None,
        })
    }
}

impl Default for DefaultGeometryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeometryResolver for DefaultGeometryResolver {
    async fn resolve(&self, source: &GeometrySource) -> Result<FeatureSet, GeometryError> {
        match source {
            GeometrySource::Inline(value) => FeatureSet::from_geojson(value.clone()),
            GeometrySource::Uri(uri) => FeatureSet::from_geojson(self.fetch(uri).await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
        })
    }

    #[test]
    fn bare_geometry_is_wrapped() {
        let set = FeatureSet::from_geojson(square()).unwrap();
        let FeatureSet::Feature(feature) = &set else {
            panic!("expected Feature");
        };
        assert_eq!(feature["type"], json!("Feature"));
        assert_eq!(feature["properties"], json!({}));
        assert_eq!(feature["geometry"], square());
    }

    #[test]
    fn collection_lists_features() {
        let set = FeatureSet::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": square() },
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [0, 0] } },
                { "type": "Feature", "properties": {}, "geometry": null }
            ]
        }))
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.geometry_types(), vec!["Polygon", "Point"]);
    }

    #[test]
    fn empty_collection_is_valid() {
        let set =
            FeatureSet::from_geojson(json!({ "type": "FeatureCollection", "features": [] }))
                .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn collection_with_non_feature_is_rejected() {
        let result = FeatureSet::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [square()]
        }));
        assert!(matches!(result, Err(GeometryError::InvalidGeoJson { .. })));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = FeatureSet::from_geojson(json!({ "type": "Circle" }));
        assert!(matches!(result, Err(GeometryError::InvalidGeoJson { .. })));
        assert!(FeatureSet::from_geojson(json!({ "coordinates": [] })).is_err());
    }

    #[tokio::test]
    async fn default_resolver_accepts_inline() {
        let resolver = DefaultGeometryResolver::new();
        let set = resolver
            .resolve(&GeometrySource::Inline(square()))
            .await
            .unwrap();
        assert_eq!(set.geometry_types(), vec!["Polygon"]);
    }

    #[cfg(not(feature = "http-client"))]
    #[tokio::test]
    async fn default_resolver_without_http_cannot_fetch() {
        let resolver = DefaultGeometryResolver::new();
        let result = resolver
            .resolve(&GeometrySource::Uri("https://example.com/a.json".into()))
            .await;
        assert!(matches!(result, Err(GeometryError::Fetch { .. })));
    }

    #[cfg(feature = "http-client")]
    mod fetch {
        use super::*;

        async fn resolve_from(server: &mockito::Server, path: &str) -> Result<FeatureSet, GeometryError> {
            DefaultGeometryResolver::new()
                .resolve(&GeometrySource::Uri(format!("{}{path}", server.url())))
                .await
        }

        #[tokio::test]
        async fn not_found_maps_to_status_error() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/missing.json")
                .with_status(404)
                .create_async()
                .await;

            let result = resolve_from(&server, "/missing.json").await;
            match result {
                Err(GeometryError::Status { uri, status }) => {
                    assert_eq!(status, 404);
                    assert!(uri.ends_with("/missing.json"));
                },
                other => panic!("expected Status error, got {other:?}"),
            }
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn non_json_body_maps_to_fetch_error() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/sketch.json")
                .with_status(200)
                .with_header("content-type", "text/html")
                .with_body("<html>not geojson</html>")
                .create_async()
                .await;

            let result = resolve_from(&server, "/sketch.json").await;
            assert!(matches!(result, Err(GeometryError::Fetch { .. })));
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn fetched_polygon_is_wrapped_as_feature() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/sketch.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(square().to_string())
                .create_async()
                .await;

            let set = resolve_from(&server, "/sketch.json").await.unwrap();
            let FeatureSet::Feature(feature) = &set else {
                panic!("expected Feature");
            };
            assert_eq!(feature["geometry"], square());
            assert_eq!(set.geometry_types(), vec!["Polygon"]);
            mock.assert_async().await;
        }
    }
}

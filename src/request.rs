//! Trigger payload normalization.
//!
//! A geoprocessing function can be triggered three ways, and each one puts
//! the geometry, cache key and channel override in a different place:
//!
//! | Shape                   | Geometry                         | `cacheKey` / `wss`        |
//! |-------------------------|----------------------------------|---------------------------|
//! | [`TriggerShape::Direct`] | top-level `geometry`             | top-level                 |
//! | [`TriggerShape::Query`]  | `queryStringParameters.geometryUri` | `queryStringParameters` |
//! | [`TriggerShape::Body`]   | `body` (JSON string): `geometry` or `geometryUri` | inside `body` |
//!
//! Shapes are tried in that order. [`normalize`] is pure: it never fetches
//! the referenced geometry, it only checks that the reference is an absolute
//! URL.

use serde_json::{Map, Value};
use url::Url;

use crate::error::HandlerError;

const GEOMETRY: &str = "geometry";
const GEOMETRY_URI: &str = "geometryUri";
const CACHE_KEY: &str = "cacheKey";
const WSS: &str = "wss";
const QUERY_STRING_PARAMETERS: &str = "queryStringParameters";
const BODY: &str = "body";

/// Where the input geometry comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometrySource {
    /// GeoJSON carried in the request itself.
    Inline(Value),
    /// Absolute URL of a GeoJSON document.
    Uri(String),
}

/// The payload shape a request was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerShape {
    /// Direct function invocation with a top-level `geometry`.
    Direct,
    /// Gateway GET with query string parameters.
    Query,
    /// Gateway POST with a JSON body string.
    Body,
}

/// A trigger payload reduced to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    /// The single geometry source.
    pub geometry: GeometrySource,
    /// Cache key; `None` disables caching for this request.
    pub cache_key: Option<String>,
    /// Notification channel override.
    pub wss: Option<String>,
    /// Shape the request was parsed from.
    pub shape: TriggerShape,
}

impl CanonicalRequest {
    /// The referenced geometry URL, if the geometry is not inline.
    pub fn geometry_uri(&self) -> Option<&str> {
        match &self.geometry {
            GeometrySource::Uri(uri) => Some(uri),
            GeometrySource::Inline(_) => None,
        }
    }

    /// Builds the payload forwarded to the async worker.
    ///
    /// Returns a copy of `trigger` with `channel` written where this
    /// request's shape reads `wss` from, so the worker sees the same channel
    /// the task was created with. With no channel the trigger is copied
    /// unchanged.
    pub fn forward_payload(&self, trigger: &Value, channel: Option<&str>) -> Value {
        let mut payload = trigger.clone();
        let Some(channel) = channel else {
            return payload;
        };

        match self.shape {
            TriggerShape::Direct => {
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert(WSS.to_string(), Value::String(channel.to_string()));
                }
            },
            TriggerShape::Query => {
                if let Some(params) = payload
                    .get_mut(QUERY_STRING_PARAMETERS)
                    .and_then(Value::as_object_mut)
                {
                    params.insert(WSS.to_string(), Value::String(channel.to_string()));
                }
            },
            TriggerShape::Body => {
                let rewritten = payload
                    .get(BODY)
                    .and_then(Value::as_str)
                    .and_then(|body| serde_json::from_str::<Value>(body).ok())
                    .and_then(|mut doc| {
                        doc.as_object_mut()?
                            .insert(WSS.to_string(), Value::String(channel.to_string()));
                        serde_json::to_string(&doc).ok()
                    });
                if let (Some(body), Some(obj)) = (rewritten, payload.as_object_mut()) {
                    obj.insert(BODY.to_string(), Value::String(body));
                }
            },
        }
        payload
    }
}

/// Parses a trigger payload into a [`CanonicalRequest`].
///
/// # Errors
///
/// Returns [`HandlerError::MalformedRequest`] when the payload matches no
/// shape, the body is not a JSON object, a geometry reference is not an
/// absolute URL, or `cacheKey`/`wss` is present but not a string.
///
/// # Examples
///
/// ```
/// use geoprocessing::request::{normalize, GeometrySource, TriggerShape};
/// use serde_json::json;
///
/// let req = normalize(&json!({
///     "queryStringParameters": {
///         "geometryUri": "https://example.com/sketch.json",
///         "cacheKey": "k1"
///     }
/// }))
/// .unwrap();
/// assert_eq!(req.shape, TriggerShape::Query);
/// assert_eq!(req.cache_key.as_deref(), Some("k1"));
/// assert_eq!(req.geometry_uri(), Some("https://example.com/sketch.json"));
/// ```
pub fn normalize(trigger: &Value) -> Result<CanonicalRequest, HandlerError> {
    let obj = trigger
        .as_object()
        .ok_or_else(|| HandlerError::malformed("payload is not a JSON object"))?;

    if is_present(obj.get(GEOMETRY)) {
        return from_document(obj, TriggerShape::Direct);
    }

    if let Some(params) = obj.get(QUERY_STRING_PARAMETERS).and_then(Value::as_object) {
        if let Some(uri) = optional_string(params, GEOMETRY_URI)? {
            return Ok(CanonicalRequest {
                geometry: GeometrySource::Uri(parse_uri(uri)?),
                cache_key: optional_string(params, CACHE_KEY)?.map(str::to_string),
                wss: optional_string(params, WSS)?.map(str::to_string),
                shape: TriggerShape::Query,
            });
        }
    }

    if let Some(body) = obj.get(BODY).and_then(Value::as_str) {
        let doc: Value = serde_json::from_str(body)
            .map_err(|e| HandlerError::malformed(format!("body is not valid JSON: {e}")))?;
        let doc = doc
            .as_object()
            .ok_or_else(|| HandlerError::malformed("body is not a JSON object"))?;
        return from_document(doc, TriggerShape::Body);
    }

    Err(HandlerError::malformed(
        "expected geometry, queryStringParameters.geometryUri, or a JSON body",
    ))
}

/// Reads a direct payload or a parsed body. A `geometryUri` takes
/// precedence over inline `geometry` when both are present.
fn from_document(
    doc: &Map<String, Value>,
    shape: TriggerShape,
) -> Result<CanonicalRequest, HandlerError> {
    let geometry = match optional_string(doc, GEOMETRY_URI)? {
        Some(uri) => GeometrySource::Uri(parse_uri(uri)?),
        None => match doc.get(GEOMETRY) {
            Some(geometry) if is_present(Some(geometry)) => {
                GeometrySource::Inline(geometry.clone())
            },
            _ => return Err(HandlerError::malformed("no geometry or geometryUri provided")),
        },
    };

    Ok(CanonicalRequest {
        geometry,
        cache_key: optional_string(doc, CACHE_KEY)?.map(str::to_string),
        wss: optional_string(doc, WSS)?.map(str::to_string),
        shape,
    })
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Empty strings and `null` read as absent; other non-strings are rejected.
fn optional_string<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a str>, HandlerError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(HandlerError::malformed(format!("{field} must be a string"))),
    }
}

fn parse_uri(uri: &str) -> Result<String, HandlerError> {
    Url::parse(uri)
        .map(|_| uri.to_string())
        .map_err(|e| HandlerError::malformed(format!("invalid geometryUri {uri}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn polygon() -> Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            }
        })
    }

    #[test]
    fn direct_shape_with_inline_geometry() {
        let req = normalize(&json!({
            "geometry": polygon(),
            "cacheKey": "k1",
            "wss": "wss://override"
        }))
        .unwrap();
        assert_eq!(req.shape, TriggerShape::Direct);
        assert_eq!(req.geometry, GeometrySource::Inline(polygon()));
        assert_eq!(req.cache_key.as_deref(), Some("k1"));
        assert_eq!(req.wss.as_deref(), Some("wss://override"));
    }

    #[test]
    fn query_shape_reads_parameters() {
        let req = normalize(&json!({
            "queryStringParameters": {
                "geometryUri": "https://example.com/a.json",
                "wss": "wss://x"
            }
        }))
        .unwrap();
        assert_eq!(req.shape, TriggerShape::Query);
        assert_eq!(req.cache_key, None);
        assert_eq!(req.wss.as_deref(), Some("wss://x"));
    }

    #[test]
    fn query_shape_requires_non_empty_uri() {
        let result = normalize(&json!({
            "queryStringParameters": { "geometryUri": "" }
        }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn body_shape_with_inline_geometry() {
        let body = json!({ "geometry": polygon(), "cacheKey": "k2" }).to_string();
        let req = normalize(&json!({ "body": body })).unwrap();
        assert_eq!(req.shape, TriggerShape::Body);
        assert_eq!(req.geometry, GeometrySource::Inline(polygon()));
        assert_eq!(req.cache_key.as_deref(), Some("k2"));
    }

    #[test]
    fn body_uri_wins_over_inline_geometry() {
        let body = json!({
            "geometry": polygon(),
            "geometryUri": "https://example.com/b.json"
        })
        .to_string();
        let req = normalize(&json!({ "body": body })).unwrap();
        assert_eq!(req.geometry_uri(), Some("https://example.com/b.json"));
    }

    #[test]
    fn unparseable_body_is_malformed() {
        let result = normalize(&json!({ "body": "{not json" }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn body_without_geometry_is_malformed() {
        let body = json!({ "cacheKey": "k" }).to_string();
        let result = normalize(&json!({ "body": body }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn relative_uri_is_malformed() {
        let result = normalize(&json!({
            "queryStringParameters": { "geometryUri": "/sketches/1.json" }
        }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn empty_strings_are_absent() {
        let req = normalize(&json!({ "geometry": polygon(), "cacheKey": "", "wss": "" })).unwrap();
        assert_eq!(req.cache_key, None);
        assert_eq!(req.wss, None);
    }

    #[test]
    fn numeric_cache_key_is_malformed() {
        let result = normalize(&json!({ "geometry": polygon(), "cacheKey": 7 }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn null_geometry_falls_through() {
        let result = normalize(&json!({ "geometry": null }));
        assert!(matches!(result, Err(HandlerError::MalformedRequest { .. })));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(normalize(&json!("geometry")).is_err());
        assert!(normalize(&json!([1, 2])).is_err());
    }

    #[test]
    fn forward_payload_direct() {
        let trigger = json!({ "geometry": polygon() });
        let req = normalize(&trigger).unwrap();
        let forwarded = req.forward_payload(&trigger, Some("wss://chan"));
        assert_eq!(forwarded["wss"], json!("wss://chan"));
        assert_eq!(forwarded["geometry"], polygon());
    }

    #[test]
    fn forward_payload_query() {
        let trigger = json!({
            "queryStringParameters": { "geometryUri": "https://example.com/a.json" }
        });
        let req = normalize(&trigger).unwrap();
        let forwarded = req.forward_payload(&trigger, Some("wss://chan"));
        assert_eq!(forwarded["queryStringParameters"]["wss"], json!("wss://chan"));
    }

    #[test]
    fn forward_payload_body_is_reserialized() {
        let trigger = json!({ "body": json!({ "geometry": polygon() }).to_string() });
        let req = normalize(&trigger).unwrap();
        let forwarded = req.forward_payload(&trigger, Some("wss://chan"));

        let reparsed = normalize(&forwarded).unwrap();
        assert_eq!(reparsed.wss.as_deref(), Some("wss://chan"));
        assert_eq!(reparsed.geometry, GeometrySource::Inline(polygon()));
    }

    #[test]
    fn forward_payload_without_channel_is_unchanged() {
        let trigger = json!({ "geometry": polygon(), "cacheKey": "k" });
        let req = normalize(&trigger).unwrap();
        assert_eq!(req.forward_payload(&trigger, None), trigger);
    }
}

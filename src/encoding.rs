//! Response envelope and the content-negotiated encoders that serialize it.
//!
//! A request declaring `Content-Type: application/xml` gets XML back; every
//! other request gets JSON. Two query toggles shape the output:
//!
//! - `pretty`: indent the document
//! - `null`: (JSON only) keep `null` members instead of omitting them

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Root element name for XML documents.
const XML_ROOT: &str = "response";

/// The `{message, code}` payload every encoded response carries.
///
/// `code` is always the numeric HTTP status of the response, as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: String,
    pub code: String,
}

impl Envelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: status.as_u16().to_string(),
        }
    }

    /// Envelope for a response the framework produced on its own, using the
    /// status' canonical reason as the message.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("Unknown status"))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_bytes(self.code.as_bytes()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Renders as compact JSON and stashes the envelope in the response
/// extensions, so the negotiation middleware can re-encode it in the format
/// the caller asked for.
impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match Encoder::default().encode(&self) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode envelope");
                return status.into_response();
            }
        };

        let mut response = (status, [(header::CONTENT_TYPE, Encoder::default().content_type())], body)
            .into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xml encoding failed: {0}")]
    Xml(String),
}

/// Output encoder selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Json { pretty: bool, null: bool },
    Xml { pretty: bool },
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::Json {
            pretty: false,
            null: false,
        }
    }
}

/// The `pretty` and `null` query toggles.
///
/// Built from already percent-decoded query pairs. When a key repeats, its
/// first value is the one that counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub pretty: bool,
    pub null: bool,
}

impl Toggles {
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let first = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k.as_ref() == key)
                .is_some_and(|(_, v)| parse_bool(v.as_ref()))
        };
        Self {
            pretty: first("pretty"),
            null: first("null"),
        }
    }
}

impl Encoder {
    /// Pick an encoder from the request's `Content-Type` and query toggles.
    pub fn negotiate(content_type: Option<&str>, toggles: Toggles) -> Self {
        let Toggles { pretty, null } = toggles;
        match content_type {
            Some(ct) if is_xml(ct) => Encoder::Xml { pretty },
            _ => Encoder::Json { pretty, null },
        }
    }

    pub fn content_type(&self) -> HeaderValue {
        match self {
            Encoder::Json { .. } => HeaderValue::from_static(JSON_CONTENT_TYPE),
            Encoder::Xml { .. } => HeaderValue::from_static(XML_CONTENT_TYPE),
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        match *self {
            Encoder::Json { pretty, null } => {
                let mut value = serde_json::to_value(value)?;
                if !null {
                    value = strip_nulls(value);
                }
                let bytes = if pretty {
                    serde_json::to_vec_pretty(&value)?
                } else {
                    serde_json::to_vec(&value)?
                };
                Ok(bytes)
            }
            Encoder::Xml { pretty } => {
                let mut out = String::new();
                let mut ser = quick_xml::se::Serializer::with_root(&mut out, Some(XML_ROOT))
                    .map_err(|e| EncodeError::Xml(e.to_string()))?;
                if pretty {
                    ser.indent(' ', 2);
                }
                value
                    .serialize(ser)
                    .map_err(|e| EncodeError::Xml(e.to_string()))?;
                Ok(out.into_bytes())
            }
        }
    }
}

/// Only the media type counts; `application/xml; charset=utf-8` is XML too.
fn is_xml(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/xml"))
}

/// Boolean spellings accepted for query toggles. Anything else reads as false.
pub fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "TRUE" | "true" | "True")
}

/// Drop `null` object members. A bare top-level `null` becomes `{}`.
fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Null => Value::Object(Default::default()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nested(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nested).collect()),
        other => other,
    }
}

fn strip_nested(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Null => serde_json::Value::Null,
        other => strip_nulls(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Partial {
        message: String,
        detail: Option<String>,
    }

    fn hello() -> Envelope {
        Envelope::new(StatusCode::OK, "Hello World!")
    }

    #[test]
    fn envelope_code_tracks_status() {
        assert_eq!(hello().code, "200");
        assert_eq!(Envelope::from_status(StatusCode::NOT_FOUND).message, "Not Found");
        assert_eq!(Envelope::from_status(StatusCode::NOT_FOUND).code, "404");
    }

    #[test]
    fn envelope_response_carries_itself() {
        let response = Envelope::new(StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            JSON_CONTENT_TYPE
        );
        let stashed = response.extensions().get::<Envelope>().unwrap();
        assert_eq!(stashed.code, "503");
    }

    fn toggles(query: &[(&str, &str)]) -> Toggles {
        Toggles::from_pairs(query)
    }

    #[test]
    fn negotiate_defaults_to_compact_json() {
        assert_eq!(Encoder::negotiate(None, Toggles::default()), Encoder::default());
        assert_eq!(
            Encoder::negotiate(Some("multipart/form-data; boundary=x"), toggles(&[("a", "b")])),
            Encoder::default()
        );
    }

    #[test]
    fn negotiate_selects_xml() {
        assert_eq!(
            Encoder::negotiate(
                Some("application/xml"),
                toggles(&[("pretty", "1"), ("null", "1")])
            ),
            Encoder::Xml { pretty: true }
        );
        assert_eq!(
            Encoder::negotiate(Some("Application/XML; charset=utf-8"), Toggles::default()),
            Encoder::Xml { pretty: false }
        );
    }

    #[test]
    fn negotiate_reads_toggles() {
        assert_eq!(
            Encoder::negotiate(None, toggles(&[("pretty", "true"), ("null", "T")])),
            Encoder::Json {
                pretty: true,
                null: true
            }
        );
        // Unparseable values fall back to false.
        assert_eq!(
            Encoder::negotiate(None, toggles(&[("pretty", "yes"), ("null", "")])),
            Encoder::default()
        );
    }

    #[test]
    fn first_value_of_a_repeated_toggle_wins() {
        assert_eq!(
            toggles(&[("pretty", "1"), ("pretty", "0")]),
            Toggles {
                pretty: true,
                null: false
            }
        );
        assert_eq!(
            toggles(&[("null", "0"), ("null", "1")]),
            Toggles::default()
        );
    }

    #[test]
    fn parse_bool_spellings() {
        for v in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "f", "false", "", "yes", "on", "tRuE"] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn json_compact_and_pretty_decode_alike() {
        let compact = Encoder::default().encode(&hello()).unwrap();
        let pretty = Encoder::Json {
            pretty: true,
            null: false,
        }
        .encode(&hello())
        .unwrap();

        assert!(!compact.contains(&b'\n'));
        assert!(String::from_utf8(pretty.clone()).unwrap().contains("\n  \""));

        let a: Envelope = serde_json::from_slice(&compact).unwrap();
        let b: Envelope = serde_json::from_slice(&pretty).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn json_null_toggle() {
        let value = Partial {
            message: "m".into(),
            detail: None,
        };
        let omitted = Encoder::default().encode(&value).unwrap();
        let omitted: serde_json::Value = serde_json::from_slice(&omitted).unwrap();
        assert_eq!(omitted, serde_json::json!({"message": "m"}));

        let kept = Encoder::Json {
            pretty: false,
            null: true,
        }
        .encode(&value)
        .unwrap();
        let kept: serde_json::Value = serde_json::from_slice(&kept).unwrap();
        assert_eq!(kept, serde_json::json!({"message": "m", "detail": null}));
    }

    #[test]
    fn json_top_level_null() {
        let none: Option<Envelope> = None;
        assert_eq!(Encoder::default().encode(&none).unwrap(), b"{}");
        let keep = Encoder::Json {
            pretty: false,
            null: true,
        };
        assert_eq!(keep.encode(&none).unwrap(), b"null");
    }

    #[test]
    fn xml_envelope() {
        let xml = String::from_utf8(Encoder::Xml { pretty: false }.encode(&hello()).unwrap()).unwrap();
        assert_eq!(
            xml,
            "<response><message>Hello World!</message><code>200</code></response>"
        );

        let pretty =
            String::from_utf8(Encoder::Xml { pretty: true }.encode(&hello()).unwrap()).unwrap();
        assert!(pretty.contains("\n  <message>Hello World!</message>"));
    }

    #[test]
    fn content_types() {
        assert_eq!(Encoder::default().content_type(), JSON_CONTENT_TYPE);
        assert_eq!(Encoder::Xml { pretty: true }.content_type(), XML_CONTENT_TYPE);
    }
}

//! Request and response serializers.
//!
//! The serializer kinds are closed enums; each request kind maps to one
//! [`RequestSerializer`] implementation, so adding a serializer means adding a
//! variant and an impl, and the compiler points at every match to update.

use bytes::Bytes;
use serde::Deserialize;

use super::params::Parameters;
use crate::error::{NetworkError, Result};

/// Encodes request parameters.
pub trait RequestSerializer: Send + Sync {
    /// The `Content-Type` of bodies produced by this serializer.
    fn content_type(&self) -> &'static str;

    /// Encode parameters as a request body.
    fn encode_body(&self, params: &Parameters) -> Result<Bytes>;

    /// Encode parameters as a query string (without the leading `?`).
    fn encode_query(&self, params: &Parameters) -> Result<String> {
        Ok(serde_urlencoded::to_string(params.to_pairs())?)
    }
}

/// JSON request bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl RequestSerializer for JsonSerializer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_body(&self, params: &Parameters) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&params.to_json())?))
    }
}

/// URL-encoded form request bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormSerializer;

impl RequestSerializer for FormSerializer {
    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    fn encode_body(&self, params: &Parameters) -> Result<Bytes> {
        Ok(Bytes::from(serde_urlencoded::to_string(params.to_pairs())?))
    }
}

/// Which serializer encodes request parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSerializerKind {
    /// `application/json` bodies.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` bodies.
    Form,
}

impl RequestSerializerKind {
    /// The serializer implementation for this kind.
    pub fn serializer(self) -> &'static dyn RequestSerializer {
        match self {
            Self::Json => &JsonSerializer,
            Self::Form => &FormSerializer,
        }
    }
}

/// How successful response bodies are validated before delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSerializerKind {
    /// Bodies must be valid JSON (an empty body is accepted).
    #[default]
    Json,
    /// Bodies are delivered as raw bytes.
    Raw,
}

impl ResponseSerializerKind {
    /// Validate a response body.
    pub fn validate(self, body: &[u8]) -> Result<()> {
        match self {
            Self::Raw => Ok(()),
            Self::Json => {
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(());
                }
                serde_json::from_slice::<serde::de::IgnoredAny>(body)
                    .map(|_| ())
                    .map_err(|e| {
                        NetworkError::Serialization(format!("response is not valid JSON: {e}"))
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Parameters {
        Parameters::new().with("q", "a b").with("page", 2)
    }

    #[test]
    fn test_json_body() {
        let body = JsonSerializer.encode_body(&params()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"q": "a b", "page": 2}));
        assert_eq!(JsonSerializer.content_type(), "application/json");
    }

    #[test]
    fn test_form_body() {
        let body = FormSerializer.encode_body(&params()).unwrap();
        assert_eq!(&body[..], b"page=2&q=a+b");
    }

    #[test]
    fn test_query_is_form_encoded_for_both_kinds() {
        for kind in [RequestSerializerKind::Json, RequestSerializerKind::Form] {
            let query = kind.serializer().encode_query(&params()).unwrap();
            assert_eq!(query, "page=2&q=a+b");
        }
    }

    #[test]
    fn test_response_validation() {
        assert!(ResponseSerializerKind::Json.validate(b"{\"ok\":true}").is_ok());
        assert!(ResponseSerializerKind::Json.validate(b"").is_ok());
        assert!(matches!(
            ResponseSerializerKind::Json.validate(b"<html>"),
            Err(NetworkError::Serialization(_))
        ));
        assert!(ResponseSerializerKind::Raw.validate(b"<html>").is_ok());
    }
}

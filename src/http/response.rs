//! Response parsing.

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::error::{classify_status, status_text, HttpError};

/// Body decoded according to the response content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json`. A body that fails to parse becomes `Json(Null)`.
    Json(Value),
    /// `text/*`.
    Text(String),
    /// Anything else.
    Binary(Bytes),
    /// No body bytes at all.
    Empty,
}

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub data: ResponseBody,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
}

impl HttpResponse {
    /// Decodes a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let value = match &self.data {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(text) => serde_json::from_str(text).map_err(|e| {
                HttpError::request(format!("Response body is not JSON: {}", e))
            })?,
            ResponseBody::Binary(_) => {
                return Err(HttpError::request("Response body is binary, not JSON"))
            }
        };

        serde_json::from_value(value)
            .map_err(|e| HttpError::request(format!("Failed to decode response body: {}", e)))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Fully-read response, before deciding success or failure.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn parse_body(&self) -> ResponseBody {
        if self.body.is_empty() {
            return ResponseBody::Empty;
        }

        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.contains("application/json") {
            match serde_json::from_slice(&self.body) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => {
                    debug!(error = %e, "Failed to parse JSON response");
                    ResponseBody::Json(Value::Null)
                }
            }
        } else if content_type.contains("text/") {
            ResponseBody::Text(String::from_utf8_lossy(&self.body).into_owned())
        } else {
            ResponseBody::Binary(self.body.clone())
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let data = self.parse_body();
        HttpResponse {
            data,
            status: self.status,
            status_text: status_text(self.status),
            headers: self.headers,
        }
    }

    pub fn into_error(self) -> HttpError {
        let body = match self.parse_body() {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        };
        classify_status(self.status, body.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde::Deserialize;
    use serde_json::json;

    fn raw(content_type: Option<&'static str>, body: &'static [u8]) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        RawResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_body_by_content_type() {
        let json = raw(Some("application/json; charset=utf-8"), br#"{"id":7}"#);
        assert_eq!(json.parse_body(), ResponseBody::Json(json!({"id": 7})));

        let text = raw(Some("text/plain"), b"pong");
        assert_eq!(text.parse_body(), ResponseBody::Text("pong".to_string()));

        let binary = raw(Some("image/png"), b"\x89PNG");
        assert_eq!(
            binary.parse_body(),
            ResponseBody::Binary(Bytes::from_static(b"\x89PNG"))
        );

        let untyped = raw(None, b"??");
        assert!(matches!(untyped.parse_body(), ResponseBody::Binary(_)));

        assert_eq!(raw(Some("application/json"), b"").parse_body(), ResponseBody::Empty);
    }

    #[test]
    fn test_invalid_json_becomes_null() {
        let broken = raw(Some("application/json"), b"{not json");
        assert_eq!(broken.parse_body(), ResponseBody::Json(Value::Null));
    }

    #[test]
    fn test_typed_json() {
        #[derive(Deserialize)]
        struct Me {
            email: String,
        }

        let response = raw(Some("application/json"), br#"{"email":"a@b.c"}"#).into_response();
        let me: Me = response.json().unwrap();
        assert_eq!(me.email, "a@b.c");
        assert_eq!(response.status_text, "OK");

        let binary = raw(Some("image/png"), b"x").into_response();
        assert!(binary.json::<Me>().is_err());
    }

    #[test]
    fn test_into_error_extracts_detail() {
        let mut response = raw(Some("application/json"), br#"{"detail":"Pet not found"}"#);
        response.status = StatusCode::NOT_FOUND;

        let err = response.into_error();
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Pet not found");
        assert_eq!(err.data, Some(json!({"detail": "Pet not found"})));
    }
}

//! Request description handed to [`HttpClient::request`](super::HttpClient::request).

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use super::error::HttpError;

/// Request body. The variant decides the content type, in one place
/// ([`Body::apply`]).
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Serialized as JSON; `Content-Type: application/json` unless the caller set one.
    Json(Value),
    /// `multipart/form-data`; the boundary header comes from the transport.
    Multipart(Vec<FormPart>),
    /// Sent verbatim. Only the given content type (if any) is set.
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

/// One field of a multipart body.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Bytes,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormPart::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.map(str::to_string),
            bytes: bytes.into(),
        }
    }
}

impl Body {
    pub fn json(value: impl Into<Value>) -> Self {
        Body::Json(value.into())
    }

    /// Headers for this body on top of the caller's headers.
    pub(crate) fn headers(&self, base: &HeaderMap) -> HeaderMap {
        let mut headers = base.clone();
        match self {
            Body::Empty | Body::Json(_) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
            }
            Body::Multipart(_) => {
                headers.remove(CONTENT_TYPE);
            }
            Body::Raw { content_type, .. } => {
                headers.remove(CONTENT_TYPE);
                if let Some(value) = content_type
                    .as_deref()
                    .and_then(|ct| HeaderValue::from_str(ct).ok())
                {
                    headers.insert(CONTENT_TYPE, value);
                }
            }
        }
        headers
    }

    /// Attaches the body to `builder`. Multipart forms are rebuilt on every
    /// call since a sent form cannot be reused.
    pub(crate) fn apply(&self, builder: RequestBuilder) -> Result<RequestBuilder, HttpError> {
        let builder = match self {
            Body::Empty => builder,
            Body::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    HttpError::request(format!("Failed to serialize JSON body: {}", e))
                })?;
                builder.body(bytes)
            }
            Body::Multipart(parts) => builder.multipart(build_form(parts)?),
            Body::Raw { bytes, .. } => builder.body(bytes.clone()),
        };
        Ok(builder)
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form, HttpError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.to_vec()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime).map_err(|e| {
                        HttpError::request(format!("Invalid mime type {}: {}", mime, e))
                    })?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// A single logical request.
///
/// `timeout`, `retry` and `retry_delay` fall back to the client defaults when
/// unset.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Body,
    pub timeout: Option<Duration>,
    pub retry: Option<u32>,
    pub retry_delay: Option<Duration>,
    /// Never read the stored credentials and never refresh.
    pub skip_auth: bool,
}

impl RequestConfig {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            timeout: None,
            retry: None,
            retry_delay: None,
            skip_auth: false,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// Adds a header, failing on an invalid name or value.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::request(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::request(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: impl Into<Value>) -> Self {
        self.body(Body::json(value))
    }

    pub fn multipart(self, parts: Vec<FormPart>) -> Self {
        self.body(Body::Multipart(parts))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

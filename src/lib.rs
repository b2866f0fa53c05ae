// Client configuration
pub mod config;

// Key-value backends
pub mod storage;

// Encrypted session token storage
pub mod credentials;

// Authenticated HTTP transport
pub mod http;

pub use http::{Body, HttpClient, HttpError, HttpResponse, RequestConfig};

//! Authenticated HTTP transport.
//!
//! ```text
//! caller ─► HttpClient::request ─► send (bearer read at send time)
//!                 │                    │
//!                 │      2xx ◄─────────┤
//!                 │      0/408 ────────┴─► retry loop (bounded)
//!                 │      401, first attempt
//!                 ▼
//!        RefreshCoordinator (one shared episode)
//!                 │
//!        ok ──► resend once (final)
//!        fail ─► clear tokens, session hook, Unauthorized
//! ```

mod client;
mod error;
mod refresh;
mod request;
mod response;
mod session;

pub use client::HttpClient;
pub use error::{classify_status, classify_transport, ErrorKind, HttpError};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use request::{Body, FormPart, RequestConfig};
pub use response::{HttpResponse, ResponseBody};
pub use session::{SessionEvents, SessionExpiredHook};

//! Transport layer: bindings, the `Transport` seam, discovery and retry.
//!
//! ```text
//! Discovery ── probes ──> TransportClient ──> dyn Transport (HTTP)
//!     │                        ▲
//!     └── TransportBinding ────┘  (immutable, shared via Arc)
//! ```

mod binding;
mod client;
mod discovery;
#[cfg(feature = "http")]
mod http;
mod retry;

pub use binding::{Endpoint, HostSpec, Scheme, TlsPolicy, TransportBinding};
pub use client::{Transport, TransportClient, TransportResponse, classify_status};
pub use discovery::{Discovery, ProbeAttempt, ProbeCandidate, ProbeOrder};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use retry::{RetryPolicy, with_optional_retry};

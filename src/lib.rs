//! # rainbird-protocol
//!
//! Client-side protocol layer for Rain Bird irrigation controllers.
//!
//! The controller exposes a single JSON-RPC endpoint on the LAN. Requests
//! are sealed in an AES-256-CBC envelope keyed by the controller password;
//! device commands travel as hex frames inside the `tunnelSip` method.
//!
//! ## Layers
//!
//! - [`core`]: error taxonomy and protocol constants
//! - [`protocol`]: the command table, field codec, schedule and queue pages
//! - [`crypto`]: shared secret and the encrypted envelope
//! - [`payload`]: JSON-RPC wrapping and the payload coder
//! - [`transport`]: bindings, discovery, retry and the HTTP transport
//! - [`client`]: the [`Controller`] facade
//!
//! ```text
//! Controller ─> CommandTable ─> PayloadCoder ─> TransportClient ─> HTTP
//!     ▲                                                              │
//!     └──── typed result <─ CommandTable <─ PayloadCoder <───────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `http` (default): reqwest transport and [`create_controller`]
//!
//! ## Example Usage
//!
//! ```no_run
//! # #[cfg(feature = "http")]
//! # async fn run() -> rainbird_protocol::Result<()> {
//! let controller = rainbird_protocol::create_controller("192.168.1.20", "password").await?;
//! let model = controller.get_model_and_version().await?;
//! println!("{model}");
//! controller.irrigate_zone(3, 10).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod core;
pub mod crypto;
pub mod payload;
pub mod protocol;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Controller, ControllerBuilder, ControllerConfig};
    pub use crate::core::{Error, FailureCategory, FailureKind, NakCode, Result};
    pub use crate::crypto::SharedSecret;
    pub use crate::protocol::{CommandTable, Decoded, ModelAndVersion, StationSet};
    pub use crate::transport::{
        Discovery, ProbeOrder, RetryPolicy, Scheme, TlsPolicy, Transport, TransportBinding,
    };

    #[cfg(feature = "http")]
    pub use crate::client::create_controller;
    #[cfg(feature = "http")]
    pub use crate::transport::HttpTransport;
}

// Re-export commonly used items at crate root
pub use crate::client::{Controller, ControllerBuilder, ControllerConfig};
pub use crate::core::{Error, Result};
pub use crate::crypto::SharedSecret;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use crate::client::create_controller;

//! Protocol constants for the Rain Bird local and cloud RPC surfaces.
//!
//! Wire values are fixed by controller firmware and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Path of the controller's single RPC endpoint.
pub const LOCAL_RPC_PATH: &str = "/stick";

/// Cloud RPC endpoint (plain JSON, no shared secret).
pub const CLOUD_API_URL: &str = "http://rdz-rbcloud.rainbird.com/phone-api";

/// User agent the controller expects (the vendor mobile app).
pub const USER_AGENT: &str = "RainBird/2.0 CFNetwork/811.5.4 Darwin/16.7.0";

/// Content type of every request body.
pub const CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// ENVELOPE (AES-256-CBC)
// =============================================================================

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// Initialization vector size.
pub const IV_SIZE: usize = 16;

/// SHA-256 digest size (plaintext digest prefix and key size).
pub const DIGEST_SIZE: usize = 32;

/// AES-256 key size.
pub const KEY_SIZE: usize = 32;

/// Envelope header: plaintext digest followed by the IV.
pub const ENVELOPE_HEADER_SIZE: usize = DIGEST_SIZE + IV_SIZE;

/// Bytes appended to every plaintext before block fill.
pub const PLAINTEXT_TERMINATOR: [u8; 2] = [0x00, 0x10];

/// Block fill byte.
pub const FILL_BYTE: u8 = 0x10;

// =============================================================================
// JSON-RPC
// =============================================================================

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// RPC method that tunnels binary protocol frames.
pub const TUNNEL_SIP_METHOD: &str = "tunnelSip";

// =============================================================================
// FRAME OPCODES
// =============================================================================

/// Not-acknowledge response.
pub const OPCODE_NAK: u8 = 0x00;

/// Acknowledge response.
pub const OPCODE_ACK: u8 = 0x01;

// =============================================================================
// SCHEDULE / QUEUE PAGING
// =============================================================================

/// Highest zone count the schedule pages cover.
pub const MAX_SCHEDULE_ZONES: usize = 22;

/// Zones carried by one run-time page.
pub const ZONES_PER_DURATION_PAGE: usize = 2;

/// Run-time slots (one per program) per zone in a run-time page.
pub const PROGRAMS_PER_DURATION_ENTRY: usize = 3;

/// Start time value meaning "slot disabled".
pub const START_TIME_DISABLED: u16 = 0xFFFF;

/// Upper bound on queue pages requested before giving up.
pub const MAX_QUEUE_PAGES: u8 = 8;

// =============================================================================
// TIMING
// =============================================================================

/// Default timeout for a single steady-state request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Default timeout for a single discovery probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Busy-retry: total attempts for one logical operation.
pub const BUSY_RETRY_ATTEMPTS: u32 = 3;

/// Busy-retry: delay before the first retry.
pub const BUSY_RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Busy-retry: backoff multiplier.
pub const BUSY_RETRY_MULTIPLIER: u32 = 2;

/// Busy-retry: backoff ceiling.
pub const BUSY_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(8);

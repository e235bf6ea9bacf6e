//! Error taxonomy for the Rain Bird protocol layer.
//!
//! Every failure that crosses the controller facade is one of the [`Error`]
//! variants below. Transport and cryptography library errors are classified
//! where they occur and never forwarded as-is.

use std::fmt;

use thiserror::Error;

use crate::transport::ProbeAttempt;

/// Device-specific rejection codes carried by a NAK (`00`) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NakCode {
    /// The controller does not implement the command.
    CommandNotSupported,
    /// The request frame had the wrong length.
    BadLength,
    /// A parameter was out of range for this controller.
    IncompatibleData,
    /// Frame checksum mismatch.
    ChecksumError,
    /// Any code without a documented meaning.
    Other(u8),
}

impl NakCode {
    /// Map a raw NAK byte to its code.
    pub fn from_byte(code: u8) -> Self {
        match code {
            0x00 => Self::CommandNotSupported,
            0x01 => Self::BadLength,
            0x02 => Self::IncompatibleData,
            0x03 => Self::ChecksumError,
            other => Self::Other(other),
        }
    }

    /// The raw NAK byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::CommandNotSupported => 0x00,
            Self::BadLength => 0x01,
            Self::IncompatibleData => 0x02,
            Self::ChecksumError => 0x03,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for NakCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CommandNotSupported => "command not supported",
            Self::BadLength => "bad length",
            Self::IncompatibleData => "incompatible data",
            Self::ChecksumError => "checksum error",
            Self::Other(_) => "unknown code",
        };
        write!(f, "{} (0x{:02X})", name, self.as_byte())
    }
}

/// Error codes carried by a JSON-RPC `error` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    /// Command not supported.
    CommandNotSupported,
    /// Bad length.
    BadLength,
    /// Incompatible data.
    IncompatibleData,
    /// Checksum error.
    ChecksumError,
    /// JSON-RPC method not found.
    MethodNotFound,
    /// Anything else.
    Unknown(i64),
}

impl From<i64> for RpcErrorCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::CommandNotSupported,
            1 => Self::BadLength,
            2 => Self::IncompatibleData,
            3 => Self::ChecksumError,
            -32601 => Self::MethodNotFound,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandNotSupported => write!(f, "command not supported (0)"),
            Self::BadLength => write!(f, "bad length (1)"),
            Self::IncompatibleData => write!(f, "incompatible data (2)"),
            Self::ChecksumError => write!(f, "checksum error (3)"),
            Self::MethodNotFound => write!(f, "method not found (-32601)"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Why a connection-level failure happened.
///
/// Discovery uses [`FailureCategory::is_wrong_scheme`] to decide whether the
/// next candidate scheme is worth probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Nothing accepted the connection (refused or reset during connect).
    ConnectionRefused,
    /// TLS handshake failed under standard certificate verification.
    CertificateRejected,
    /// TLS handshake failed even with local-only relaxed verification.
    RelaxedTlsFailed,
    /// The request or connect deadline elapsed.
    Timeout,
    /// Host unreachable or name resolution failed.
    Unreachable,
    /// The peer answered with something that is not HTTP.
    Protocol,
}

impl FailureCategory {
    /// True when probing a different scheme might succeed.
    pub fn is_wrong_scheme(self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused | Self::CertificateRejected | Self::RelaxedTlsFailed
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ConnectionRefused => "connection refused",
            Self::CertificateRejected => "certificate rejected",
            Self::RelaxedTlsFailed => "tls handshake failed with relaxed verification",
            Self::Timeout => "timed out",
            Self::Unreachable => "host unreachable",
            Self::Protocol => "protocol mismatch",
        };
        f.write_str(text)
    }
}

/// Failures opening an encrypted envelope or parsing its plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    /// Body shorter than digest + IV + one block.
    #[error("envelope too short: {0} bytes")]
    Truncated(usize),

    /// Ciphertext is not a whole number of blocks.
    #[error("ciphertext length {0} is not a multiple of the block size")]
    Misaligned(usize),

    /// Plaintext terminator or fill bytes missing.
    #[error("invalid padding")]
    Padding,

    /// Plaintext does not match the digest carried in the envelope.
    #[error("plaintext digest mismatch")]
    DigestMismatch,

    /// Plaintext is not UTF-8.
    #[error("plaintext is not valid UTF-8")]
    Utf8,

    /// Plaintext is not a JSON-RPC response.
    #[error("malformed JSON-RPC payload: {0}")]
    Json(String),
}

/// Stable, `Copy` classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Bad shared secret.
    AuthenticationFailure,
    /// Controller busy (HTTP 503).
    DeviceBusy,
    /// Protocol-level refusal (NAK).
    DeviceRejected,
    /// Garbled or tampered response.
    DecryptionError,
    /// Non-2xx HTTP status other than 403/503.
    RequestFailure,
    /// Connection-level failure.
    TransportFailure,
    /// Discovery ran out of candidate schemes.
    DiscoveryExhausted,
    /// Command name not in the table.
    UnknownCommand,
    /// Parameter missing or out of range.
    InvalidParameter,
    /// Response opcode did not match the request.
    UnexpectedResponse,
    /// Frame shorter than its layout or not hex.
    MalformedFrame,
    /// Schedule pages missing or a page request failed.
    IncompleteSchedule,
    /// Queue paging did not terminate.
    QueueOverflow,
    /// JSON-RPC error object.
    RpcError,
    /// Invalid configuration.
    Configuration,
}

/// Classification record for callers that branch on failures without
/// matching on [`Error`] directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Failure kind.
    pub kind: FailureKind,
    /// HTTP status, when the failure came from a status code.
    pub http_status: Option<u16>,
    /// Raw NAK code, when the controller rejected the command.
    pub nak_code: Option<u8>,
    /// Rendered description.
    pub cause: String,
}

/// Top-level protocol errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The controller rejected the shared secret (HTTP 403).
    #[error("authentication with the controller failed")]
    AuthenticationFailure,

    /// The controller is serving another client (HTTP 503).
    #[error("controller is busy; wait a minute and retry")]
    DeviceBusy,

    /// The controller answered with a NAK frame.
    #[error("controller rejected command 0x{command_echo:02X}: {nak}")]
    DeviceRejected {
        /// Opcode of the rejected command.
        command_echo: u8,
        /// Rejection code.
        nak: NakCode,
    },

    /// Response could not be decrypted or validated.
    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    /// Any other non-2xx status.
    #[error("request failed with HTTP status {status}")]
    RequestFailure {
        /// HTTP status code.
        status: u16,
    },

    /// Connection-level failure.
    #[error("transport failure: {0}")]
    Transport(FailureCategory),

    /// No candidate scheme reached the controller.
    #[error("no usable transport for {host}: {}", format_attempts(.attempts))]
    DiscoveryExhausted {
        /// Host that was probed.
        host: String,
        /// Every attempt in probe order.
        attempts: Vec<ProbeAttempt>,
    },

    /// Command name is not registered.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A parameter is missing, unknown, or does not fit its field.
    #[error("invalid parameter {field} for {command}: {reason}")]
    InvalidParameter {
        /// Command being encoded.
        command: &'static str,
        /// Field name as supplied.
        field: String,
        /// What was wrong.
        reason: String,
    },

    /// The response opcode is not the one the command expects.
    #[error("unexpected response to {command}: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Command that was sent.
        command: &'static str,
        /// Expected response opcode.
        expected: String,
        /// Opcode actually received.
        actual: String,
    },

    /// Frame is not hex or is shorter than its declared layout.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A schedule page request failed part-way through the sequence.
    #[error("schedule page 0x{page:04X} failed: {source}")]
    SchedulePageFailed {
        /// Page sub-command that failed.
        page: u16,
        /// Failure of that page request.
        source: Box<Error>,
    },

    /// Schedule assembly ended with pages still missing.
    #[error("schedule incomplete, missing pages {missing:04X?}")]
    IncompleteSchedule {
        /// Page sub-commands never received.
        missing: Vec<u16>,
    },

    /// Queue paging did not reach a terminal page.
    #[error("queue did not terminate within {0} pages")]
    QueueOverflow(u8),

    /// JSON-RPC error object from the controller or cloud.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// Error code.
        code: RpcErrorCode,
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::AuthenticationFailure => FailureKind::AuthenticationFailure,
            Error::DeviceBusy => FailureKind::DeviceBusy,
            Error::DeviceRejected { .. } => FailureKind::DeviceRejected,
            Error::Decryption(_) => FailureKind::DecryptionError,
            Error::RequestFailure { .. } => FailureKind::RequestFailure,
            Error::Transport(_) => FailureKind::TransportFailure,
            Error::DiscoveryExhausted { .. } => FailureKind::DiscoveryExhausted,
            Error::UnknownCommand(_) => FailureKind::UnknownCommand,
            Error::InvalidParameter { .. } => FailureKind::InvalidParameter,
            Error::UnexpectedResponse { .. } => FailureKind::UnexpectedResponse,
            Error::MalformedFrame(_) => FailureKind::MalformedFrame,
            Error::SchedulePageFailed { .. } | Error::IncompleteSchedule { .. } => {
                FailureKind::IncompleteSchedule
            }
            Error::QueueOverflow(_) => FailureKind::QueueOverflow,
            Error::Rpc { .. } => FailureKind::RpcError,
            Error::Config(_) => FailureKind::Configuration,
        }
    }

    /// Build the classification record for this error.
    pub fn record(&self) -> FailureRecord {
        let http_status = match self {
            Error::AuthenticationFailure => Some(403),
            Error::DeviceBusy => Some(503),
            Error::RequestFailure { status } => Some(*status),
            _ => None,
        };
        let nak_code = match self {
            Error::DeviceRejected { nak, .. } => Some(nak.as_byte()),
            _ => None,
        };
        FailureRecord {
            kind: self.kind(),
            http_status,
            nak_code,
            cause: self.to_string(),
        }
    }

    /// Only a busy controller is worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DeviceBusy)
    }

    /// Connection-level category, if this is a transport failure.
    pub fn transport_category(&self) -> Option<FailureCategory> {
        match self {
            Error::Transport(category) => Some(*category),
            _ => None,
        }
    }
}

fn format_attempts(attempts: &[ProbeAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ProbeCandidate, Scheme, TlsPolicy};

    #[test]
    fn test_nak_code_roundtrip() {
        for byte in 0u8..=0xFF {
            assert_eq!(NakCode::from_byte(byte).as_byte(), byte);
        }
        assert_eq!(NakCode::from_byte(2), NakCode::IncompatibleData);
        assert_eq!(NakCode::from_byte(28), NakCode::Other(28));
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(RpcErrorCode::from(-32601), RpcErrorCode::MethodNotFound);
        assert_eq!(RpcErrorCode::from(3), RpcErrorCode::ChecksumError);
        assert_eq!(RpcErrorCode::from(9090), RpcErrorCode::Unknown(9090));
    }

    #[test]
    fn test_wrong_scheme_categories() {
        assert!(FailureCategory::ConnectionRefused.is_wrong_scheme());
        assert!(FailureCategory::CertificateRejected.is_wrong_scheme());
        assert!(FailureCategory::RelaxedTlsFailed.is_wrong_scheme());

        assert!(!FailureCategory::Timeout.is_wrong_scheme());
        assert!(!FailureCategory::Unreachable.is_wrong_scheme());
        assert!(!FailureCategory::Protocol.is_wrong_scheme());
    }

    #[test]
    fn test_record_for_rejection() {
        let err = Error::DeviceRejected {
            command_echo: 0x39,
            nak: NakCode::IncompatibleData,
        };
        let record = err.record();
        assert_eq!(record.kind, FailureKind::DeviceRejected);
        assert_eq!(record.nak_code, Some(2));
        assert_eq!(record.http_status, None);
        assert!(record.cause.contains("0x39"));
    }

    #[test]
    fn test_record_for_status() {
        assert_eq!(Error::DeviceBusy.record().http_status, Some(503));
        assert_eq!(Error::AuthenticationFailure.record().http_status, Some(403));
        let record = Error::RequestFailure { status: 500 }.record();
        assert_eq!(record.kind, FailureKind::RequestFailure);
        assert_eq!(record.http_status, Some(500));
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(Error::DeviceBusy.is_retryable());
        assert!(!Error::AuthenticationFailure.is_retryable());
        assert!(!Error::Transport(FailureCategory::Timeout).is_retryable());
        assert!(!Error::Decryption(DecryptionError::Padding).is_retryable());
    }

    #[test]
    fn test_discovery_exhausted_lists_attempts() {
        let err = Error::DiscoveryExhausted {
            host: "192.168.1.20".into(),
            attempts: vec![
                ProbeAttempt {
                    candidate: ProbeCandidate::new(Scheme::Https, TlsPolicy::Strict),
                    category: FailureCategory::ConnectionRefused,
                },
                ProbeAttempt {
                    candidate: ProbeCandidate::new(Scheme::Http, TlsPolicy::Strict),
                    category: FailureCategory::ConnectionRefused,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("192.168.1.20"));
        assert!(text.contains("https"));
        assert!(text.contains("http"));
        assert_eq!(err.kind(), FailureKind::DiscoveryExhausted);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}

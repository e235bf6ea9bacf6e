//! Security layer: shared secret handling and the AES-256-CBC envelope.

mod envelope;
mod keys;

pub use envelope::EncryptedEnvelope;
pub use keys::{SharedSecret, SymmetricKey};

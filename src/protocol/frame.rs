//! Plaintext protocol frames.
//!
//! A frame is the uppercase hex string `opcode ++ fields...` that travels
//! inside the `tunnelSip` JSON-RPC call. Field positions are counted in hex
//! digits from 0 at the opcode.

use std::fmt;

use crate::core::{Error, Result};

/// A validated, uppercase hex protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolFrame(String);

impl ProtocolFrame {
    /// Parse a frame from hex digits.
    ///
    /// The string must be non-empty, contain only hex digits and have an
    /// even number of them.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() < 2 {
            return Err(Error::MalformedFrame(format!(
                "frame too short: {:?}",
                hex
            )));
        }
        if hex.len() % 2 != 0 {
            return Err(Error::MalformedFrame(format!(
                "odd number of hex digits: {}",
                hex.len()
            )));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::MalformedFrame(format!("not hex: {:?}", hex)));
        }
        Ok(Self(hex.to_ascii_uppercase()))
    }

    /// Build a frame from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_hex(&hex::encode_upper(bytes))
    }

    /// The frame as uppercase hex.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Frame length in bytes.
    pub fn len_bytes(&self) -> usize {
        self.0.len() / 2
    }

    /// Frame length in hex digits.
    pub fn len_nibbles(&self) -> usize {
        self.0.len()
    }

    /// Leading opcode byte.
    pub fn opcode(&self) -> u8 {
        // from_hex guarantees at least two hex digits
        u8::from_str_radix(&self.0[..2], 16).unwrap_or_default()
    }

    /// Raw digits at `position..position + length`.
    pub fn nibbles(&self, position: usize, length: usize) -> Result<&str> {
        self.0.get(position..position + length).ok_or_else(|| {
            Error::MalformedFrame(format!(
                "field {}..{} beyond frame of {} digits ({})",
                position,
                position + length,
                self.0.len(),
                self.0
            ))
        })
    }

    /// Parse the digits at `position..position + length` as a base-16 integer.
    pub fn read_uint(&self, position: usize, length: usize) -> Result<u64> {
        let digits = self.nibbles(position, length)?;
        u64::from_str_radix(digits, 16)
            .map_err(|e| Error::MalformedFrame(format!("field {:?}: {}", digits, e)))
    }

    /// Decode to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for ProtocolFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProtocolFrame {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! Fixed-width field codec.
//!
//! Fields are addressed by hex-digit position and length. Integer fields are
//! big-endian base-16 numbers; station masks decode to the set of 1-based
//! station numbers whose bit is set (bytes in order, bits LSB first).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::core::{Error, Result};

use super::ProtocolFrame;

/// How a field's digits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Base-16 unsigned integer.
    Uint,
    /// Station bitmask.
    StationMask,
}

/// Layout of one named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as used in requests and decoded responses.
    pub name: &'static str,
    /// Offset in hex digits from the opcode.
    pub position: usize,
    /// Width in hex digits.
    pub length: usize,
    /// Interpretation.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Integer field.
    pub const fn uint(name: &'static str, position: usize, length: usize) -> Self {
        Self {
            name,
            position,
            length,
            kind: FieldKind::Uint,
        }
    }

    /// Station bitmask field.
    pub const fn mask(name: &'static str, position: usize, length: usize) -> Self {
        Self {
            name,
            position,
            length,
            kind: FieldKind::StationMask,
        }
    }

    /// First digit past this field.
    pub const fn end(&self) -> usize {
        self.position + self.length
    }

    /// Largest value that fits in the field.
    pub fn max_value(&self) -> u64 {
        if self.length >= 16 {
            u64::MAX
        } else {
            (1u64 << (4 * self.length)) - 1
        }
    }

    /// Extract this field from a frame.
    pub fn decode(&self, frame: &ProtocolFrame) -> Result<FieldValue> {
        match self.kind {
            FieldKind::Uint => frame.read_uint(self.position, self.length).map(FieldValue::Uint),
            FieldKind::StationMask => {
                StationSet::from_mask_hex(frame.nibbles(self.position, self.length)?)
                    .map(FieldValue::Stations)
            }
        }
    }

    /// Append `value` as zero-padded hex of this field's width.
    pub(crate) fn encode_into(&self, command: &'static str, value: u64, out: &mut String) -> Result<()> {
        if self.kind != FieldKind::Uint {
            return Err(Error::InvalidParameter {
                command,
                field: self.name.to_string(),
                reason: "mask fields cannot be encoded".into(),
            });
        }
        if value > self.max_value() {
            return Err(Error::InvalidParameter {
                command,
                field: self.name.to_string(),
                reason: format!(
                    "{} does not fit in {} hex digits (max {})",
                    value,
                    self.length,
                    self.max_value()
                ),
            });
        }
        let _ = write!(out, "{:0width$X}", value, width = self.length);
        Ok(())
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Integer field.
    Uint(u64),
    /// Station mask field.
    Stations(StationSet),
}

/// Set of 1-based station numbers decoded from a bitmask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationSet {
    active: BTreeSet<u8>,
    capacity: usize,
}

impl StationSet {
    /// Decode a mask given as hex digits.
    pub fn from_mask_hex(digits: &str) -> Result<Self> {
        let bytes = hex::decode(digits)
            .map_err(|e| Error::MalformedFrame(format!("station mask {:?}: {}", digits, e)))?;
        Ok(Self::from_mask_bytes(&bytes))
    }

    /// Decode a mask given as raw bytes.
    pub fn from_mask_bytes(bytes: &[u8]) -> Self {
        let mut active = BTreeSet::new();
        for (index, byte) in bytes.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    active.insert((index * 8 + bit + 1) as u8);
                }
            }
        }
        Self {
            active,
            capacity: bytes.len() * 8,
        }
    }

    /// Whether `station` (1-based) is set.
    pub fn contains(&self, station: u8) -> bool {
        self.active.contains(&station)
    }

    /// Number of stations set.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// True when no station is set.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of stations the mask can describe.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set stations in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.active.iter().copied()
    }
}

/// Decoded fields of a fixed-layout response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFields {
    /// Response name from the table.
    pub name: &'static str,
    /// Response opcode.
    pub opcode: u8,
    values: BTreeMap<&'static str, FieldValue>,
}

impl ResponseFields {
    pub(crate) fn new(name: &'static str, opcode: u8) -> Self {
        Self {
            name,
            opcode,
            values: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, field: &'static str, value: FieldValue) {
        self.values.insert(field, value);
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Integer value of `field`.
    pub fn uint(&self, field: &str) -> Result<u64> {
        match self.values.get(field) {
            Some(FieldValue::Uint(value)) => Ok(*value),
            Some(FieldValue::Stations(_)) => Err(Error::MalformedFrame(format!(
                "{}.{} is a station mask",
                self.name, field
            ))),
            None => Err(Error::MalformedFrame(format!(
                "{} has no field {}",
                self.name, field
            ))),
        }
    }

    /// Station set value of `field`.
    pub fn stations(&self, field: &str) -> Result<&StationSet> {
        match self.values.get(field) {
            Some(FieldValue::Stations(set)) => Ok(set),
            _ => Err(Error::MalformedFrame(format!(
                "{} has no station mask {}",
                self.name, field
            ))),
        }
    }

    /// Field names and values in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

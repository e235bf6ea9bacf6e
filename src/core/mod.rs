//! Core error taxonomy and protocol constants.
//!
//! This module is always included.

mod constants;
mod error;

pub use constants::*;
pub use error::*;

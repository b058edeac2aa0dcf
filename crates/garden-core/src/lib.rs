//! # garden-core
//!
//! Foundation types shared by the garden crates:
//!
//! - **Identifiers**: [`Identifier`], a 64-bit, creation-time-ordered key
//! - **Sanitization**: bounding and normalizing free-text fields before storage
//! - **Logging**: `tracing` subscriber setup for binaries

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod sanitize;

pub use ids::{Identifier, ParseIdentifierError};

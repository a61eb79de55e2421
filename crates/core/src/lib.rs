//! `stockrecon-core`: shared building blocks for the reconciliation engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod value_object;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::ItemId;
pub use value_object::ValueObject;
pub use version::ExpectedVersion;

//! `gatehouse-core`: shared building blocks for the session/permission engine.
//!
//! This crate contains **pure** primitives (no IO, no async runtime).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ProfileId, UserId};

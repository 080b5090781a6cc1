//! aclgate core: access-control primitives, error types, and protocol shapes.
//!
//! This crate defines the rule/capability model, the pure matcher that
//! validates ACL requests against app manifests, and the administrative
//! protocol shared by the gateway and its management clients. It carries no
//! runtime or OS dependencies so it can be reused by tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `GatewayError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod announce;
pub mod error;
pub mod ident;
pub mod manifest;
pub mod matcher;
pub mod protocol;
pub mod rules;

/// Shared result type.
pub use error::{GatewayError, Result};

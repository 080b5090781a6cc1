//! aclgate gateway library entry.
//!
//! This crate wires persistence, the policy compiler, app supervision and the
//! admin socket into one gateway. It is consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod acl;
pub mod app;
pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod manifest;
pub mod metadata;
pub mod obs;
pub mod policy;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod transport;
pub mod txn;
pub mod workers;

//! Protocol modules (administrative requests + app notifications).
//!
//! - Admin: JSON requests/responses exchanged with the management client.
//! - Notify: signals the gateway sends to a connector app and the status
//!   vocabulary they carry.
//!
//! Decoding never panics; malformed input surfaces as
//! `GatewayError::BadRequest` at the transport edge.

pub mod admin;
pub mod notify;

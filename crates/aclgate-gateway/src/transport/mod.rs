//! Transport layer.
//!
//! - [`Transport`]: the bus-facing seam (policy reload + app signals)
//! - `local`: default implementation for a gateway host without a bus binding
//! - `codec` / `admin`: line-delimited JSON admin requests over a Unix socket

pub mod admin;
pub mod codec;
pub mod local;

pub use local::LocalTransport;

use aclgate_core::error::Result;
use aclgate_core::protocol::notify::Notification;

/// Outbound half of the message bus as the gateway needs it.
pub trait Transport: Send + Sync {
    /// Ask the bus daemon to re-read the policy documents just written.
    fn reload_config(&self) -> Result<()>;

    /// Deliver a signal to one app's bus identity.
    fn notify(&self, app_id: &str, notification: &Notification) -> Result<()>;
}

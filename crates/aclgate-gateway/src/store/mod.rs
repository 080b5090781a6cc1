//! Durable whole-document storage.
//!
//! Every record (one ACL, the metadata cache, each compiled policy document)
//! is read and written as a complete document; there are no partial updates.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use aclgate_core::error::Result;

/// Identifies one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocKey {
    Acl { app_id: String, acl_id: String },
    Metadata,
    DefaultPolicy,
    AppPolicy { app_id: String },
}

impl DocKey {
    pub fn acl(app_id: &str, acl_id: &str) -> Self {
        DocKey::Acl {
            app_id: app_id.to_string(),
            acl_id: acl_id.to_string(),
        }
    }

    pub fn app_policy(app_id: &str) -> Self {
        DocKey::AppPolicy {
            app_id: app_id.to_string(),
        }
    }
}

pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the document does not exist.
    fn read(&self, key: &DocKey) -> Result<Option<String>>;
    fn write(&self, key: &DocKey, body: &str) -> Result<()>;
    /// Removing a missing document succeeds.
    fn remove(&self, key: &DocKey) -> Result<()>;
    /// Ids of every stored ACL of one app, sorted.
    fn list_acls(&self, app_id: &str) -> Result<Vec<String>>;
}

//! Bus policy layer.
//!
//! - `busconfig`: the compiled document model and its XML rendering
//! - `tracker`: announced remote apps and their current bus addresses
//! - `compiler`: active ACL rules + tracker -> per-app-user policy

pub mod busconfig;
pub mod compiler;
pub mod tracker;

pub use busconfig::CompiledPolicy;
pub use compiler::{CompilerSettings, PolicyCompiler};
pub use tracker::AnnouncementTracker;

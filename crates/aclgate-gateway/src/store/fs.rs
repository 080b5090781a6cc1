use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aclgate_core::error::{GatewayError, Result};

use super::{DocKey, DocumentStore};

const ACL_DIR: &str = "acls";
const ACL_EXT: &str = "json";

/// Filesystem layout:
/// - `<apps_dir>/<app_id>/acls/<acl_id>.json`
/// - `<apps_dir>/metadata.json`
/// - `<policy_dir>/default.xml`, `<policy_dir>/apps/<app_id>.xml`
///
/// Writes go to a sibling temp file and are renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    apps_dir: PathBuf,
    policy_dir: PathBuf,
}

impl FsStore {
    pub fn new(apps_dir: impl Into<PathBuf>, policy_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
            policy_dir: policy_dir.into(),
        }
    }

    fn path(&self, key: &DocKey) -> Result<PathBuf> {
        Ok(match key {
            DocKey::Acl { app_id, acl_id } => self
                .apps_dir
                .join(component(app_id)?)
                .join(ACL_DIR)
                .join(format!("{}.{ACL_EXT}", component(acl_id)?)),
            DocKey::Metadata => self.apps_dir.join("metadata.json"),
            DocKey::DefaultPolicy => self.policy_dir.join("default.xml"),
            DocKey::AppPolicy { app_id } => self
                .policy_dir
                .join("apps")
                .join(format!("{}.xml", component(app_id)?)),
        })
    }
}

/// Ids become file names; refuse anything that could escape the directory.
fn component(id: &str) -> Result<&str> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(GatewayError::Persistence(format!("invalid document id: {id:?}")));
    }
    Ok(id)
}

fn io_err(what: &str, path: &Path, e: std::io::Error) -> GatewayError {
    GatewayError::Persistence(format!("{what} {} failed: {e}", path.display()))
}

impl DocumentStore for FsStore {
    fn read(&self, key: &DocKey) -> Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("read", &path, e)),
        }
    }

    fn write(&self, key: &DocKey, body: &str) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err("create dir", parent, e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).map_err(|e| io_err("write", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err("rename", &path, e)
        })
    }

    fn remove(&self, key: &DocKey) -> Result<()> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &path, e)),
        }
    }

    fn list_acls(&self, app_id: &str) -> Result<Vec<String>> {
        let dir = self.apps_dir.join(component(app_id)?).join(ACL_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("list", &dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err("list", &dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ACL_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

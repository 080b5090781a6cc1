//! Installed-app discovery (strict manifest parsing).
//!
//! Layout: `<apps_dir>/<app_id>/manifest.yaml`. The directory name is the
//! app id and the OS user the app runs as.

use std::fs;
use std::path::Path;

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::manifest::AppManifest;

pub const MANIFEST_FILE: &str = "manifest.yaml";

pub fn load_manifest(path: &Path) -> Result<AppManifest> {
    let s = fs::read_to_string(path)
        .map_err(|e| GatewayError::Persistence(format!("read {} failed: {e}", path.display())))?;
    parse_manifest(&s)
}

pub fn parse_manifest(s: &str) -> Result<AppManifest> {
    let manifest: AppManifest = serde_yaml::from_str(s)
        .map_err(|e| GatewayError::BadRequest(format!("invalid manifest: {e}")))?;
    if manifest.execution.executable.is_empty() {
        return Err(GatewayError::BadRequest("manifest: execution.executable is empty".into()));
    }
    Ok(manifest)
}

/// Every app directory under `apps_dir` with a parsable manifest, ordered by id.
/// Apps whose manifest fails to load are skipped.
pub fn discover(apps_dir: &Path) -> Result<Vec<(String, AppManifest)>> {
    let entries = match fs::read_dir(apps_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %apps_dir.display(), "apps dir missing, no apps installed");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(GatewayError::Persistence(format!(
                "list {} failed: {e}",
                apps_dir.display()
            )))
        }
    };

    let mut apps = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(app_id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            continue;
        }

        match load_manifest(&manifest_path) {
            Ok(m) => apps.push((app_id, m)),
            Err(e) => tracing::warn!(app_id = %app_id, error = %e, "skipping app with bad manifest"),
        }
    }

    apps.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(apps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHT: &str = r#"
friendly_name: Light Connector
version: "1.0"
exposed_services:
  - object_path: /light
    interfaces:
      - name: org.x.OnOff
remoted_services: []
execution:
  executable: light-connector
  args: ["--verbose"]
  env_vars: ["RUST_LOG=info"]
"#;

    #[test]
    fn discovers_sorted_and_skips_broken() {
        let dir = tempfile::tempdir().unwrap();
        for (id, body) in [("zeta", LIGHT), ("alpha", LIGHT), ("broken", "friendly_nam: x")] {
            fs::create_dir_all(dir.path().join(id)).unwrap();
            fs::write(dir.path().join(id).join(MANIFEST_FILE), body).unwrap();
        }
        fs::create_dir_all(dir.path().join("no-manifest")).unwrap();
        fs::write(dir.path().join("metadata.json"), "{}").unwrap();

        let apps = discover(dir.path()).unwrap();
        let ids: Vec<&str> = apps.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert_eq!(apps[0].1.execution.executable, "light-connector");
        assert_eq!(apps[0].1.exposed_services[0].object_path, "/light");
    }

    #[test]
    fn missing_apps_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("nope")).unwrap().is_empty());
    }
}

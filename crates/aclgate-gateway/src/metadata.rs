//! Refcounted cache of friendly names for remote apps and devices.
//!
//! Only names are persisted. Reference counts are rebuilt on every boot while
//! ACLs load, and entries nobody references are dropped by the single
//! [`MetadataStore::cleanup`] pass that follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::ident::{parse_metadata_key, AppIdentifier, MetadataField};

use crate::store::{DocKey, DocumentStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataEntry {
    pub app_name: String,
    pub device_name: String,
    pub ref_count: u32,
}

/// The cache as it stood before an update, for undoing it.
#[derive(Debug, Clone)]
pub struct NamesSnapshot(BTreeMap<AppIdentifier, MetadataEntry>);

#[derive(Serialize, Deserialize)]
struct MetadataRecord {
    #[serde(flatten)]
    id: AppIdentifier,
    #[serde(default)]
    app_name: String,
    #[serde(default)]
    device_name: String,
}

#[derive(Serialize, Deserialize, Default)]
struct MetadataDocument {
    entries: Vec<MetadataRecord>,
}

pub struct MetadataStore {
    entries: BTreeMap<AppIdentifier, MetadataEntry>,
    store: Arc<dyn DocumentStore>,
}

impl MetadataStore {
    /// Load the persisted names. A missing document is an empty cache.
    pub fn load(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let mut entries = BTreeMap::new();

        if let Some(body) = store.read(&DocKey::Metadata)? {
            match serde_json::from_str::<MetadataDocument>(&body) {
                Ok(doc) => {
                    for r in doc.entries {
                        entries.insert(
                            r.id,
                            MetadataEntry {
                                app_name: r.app_name,
                                device_name: r.device_name,
                                ref_count: 0,
                            },
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "metadata document unreadable, starting empty");
                }
            }
        }

        tracing::debug!(entries = entries.len(), "metadata loaded");
        Ok(Self { entries, store })
    }

    pub fn get(&self, id: &AppIdentifier) -> Option<&MetadataEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One more stored remote rule set refers to `id`.
    pub fn increment_ref(&mut self, id: &AppIdentifier) {
        self.entries.entry(id.clone()).or_default().ref_count += 1;
    }

    /// Apply composite-keyed names. All keys are checked before anything
    /// changes; the document is written only if a value actually changed.
    pub fn update_names(&mut self, values: &BTreeMap<String, String>) -> Result<bool> {
        let mut parsed = Vec::with_capacity(values.len());
        for (key, value) in values {
            let (id, field) = parse_metadata_key(key)?;
            parsed.push((id, field, value));
        }

        let snapshot = self.entries.clone();
        let mut changed = false;
        for (id, field, value) in parsed {
            let entry = self.entries.entry(id).or_default();
            let slot = match field {
                MetadataField::AppName => &mut entry.app_name,
                MetadataField::DeviceName => &mut entry.device_name,
            };
            if slot != value {
                *slot = value.clone();
                changed = true;
            }
        }

        if !changed {
            return Ok(false);
        }
        if let Err(e) = self.persist() {
            self.entries = snapshot;
            return Err(GatewayError::Metadata(format!("persist failed: {e}")));
        }
        Ok(true)
    }

    pub fn snapshot(&self) -> NamesSnapshot {
        NamesSnapshot(self.entries.clone())
    }

    /// Put back a snapshot and persist it.
    pub fn restore(&mut self, snapshot: NamesSnapshot) {
        self.entries = snapshot.0;
        if let Err(e) = self.persist() {
            tracing::error!(error = %e, "could not persist restored metadata");
        }
    }

    /// Drop every entry with no references and persist the result.
    pub fn cleanup(&mut self) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.ref_count > 0);
        let removed = before - self.entries.len();

        if removed > 0 {
            self.persist()?;
        }
        tracing::info!(removed, kept = self.entries.len(), "metadata cleanup");
        Ok(removed)
    }

    /// Add the known names of `id` to `out` under their composite keys.
    pub fn add_values(&self, id: &AppIdentifier, out: &mut BTreeMap<String, String>) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        if !entry.app_name.is_empty() {
            out.insert(id.app_name_key(), entry.app_name.clone());
        }
        if !entry.device_name.is_empty() {
            out.insert(id.device_name_key(), entry.device_name.clone());
        }
    }

    fn persist(&self) -> Result<()> {
        let doc = MetadataDocument {
            entries: self
                .entries
                .iter()
                .map(|(id, e)| MetadataRecord {
                    id: id.clone(),
                    app_name: e.app_name.clone(),
                    device_name: e.device_name.clone(),
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&doc)
            .map_err(|e| GatewayError::Internal(format!("encode metadata: {e}")))?;
        self.store.write(&DocKey::Metadata, &body)
    }
}

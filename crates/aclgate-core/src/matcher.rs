//! Matching requested rules and live announcements against declared capabilities.
//!
//! All functions here are pure. Most-specific-match-wins is a property of
//! [`CapabilityIndex`] itself, so callers never need to pre-sort manifests:
//! - an exact (non-prefix) declaration beats any prefix declaration
//! - a longer prefix beats a shorter one; equal lengths break by path
//! - a `*` declaration matches anything and ranks last

use std::collections::{BTreeMap, BTreeSet};

use crate::announce::{Announcement, RemotedApp};
use crate::manifest::{path_has_prefix, Capability, InterfaceDecl, WILDCARD_PATH};
use crate::rules::{Rule, RuleRequest};

/// Lookup structure over one immutable capability list.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    caps: Vec<Capability>,
    exact: BTreeMap<String, usize>,
    /// Indexes of prefix declarations, longest path first.
    prefixes: Vec<usize>,
    wildcard: Option<usize>,
}

impl CapabilityIndex {
    pub fn new(caps: Vec<Capability>) -> Self {
        let mut exact = BTreeMap::new();
        let mut prefixes = Vec::new();
        let mut wildcard = None;

        for (i, cap) in caps.iter().enumerate() {
            if cap.object_path == WILDCARD_PATH {
                wildcard.get_or_insert(i);
            } else if cap.is_prefix {
                prefixes.push(i);
            } else {
                // first declaration of a path wins
                exact.entry(cap.object_path.clone()).or_insert(i);
            }
        }

        prefixes.sort_by(|&a, &b| {
            let (pa, pb) = (&caps[a].object_path, &caps[b].object_path);
            pb.len().cmp(&pa.len()).then_with(|| pa.cmp(pb))
        });

        Self {
            caps,
            exact,
            prefixes,
            wildcard,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.caps
    }

    /// Most specific capability able to back a rule on `path`.
    ///
    /// A prefix request is only backed by a prefix-allowed prefix declaration
    /// at an equal or more general path.
    pub fn lookup(&self, path: &str, is_prefix: bool) -> Option<&Capability> {
        self.lookup_index(path, is_prefix).map(|i| &self.caps[i])
    }

    fn lookup_index(&self, path: &str, is_prefix: bool) -> Option<usize> {
        let qualifies = |cap: &Capability| !is_prefix || cap.is_prefix_allowed;

        if path == WILDCARD_PATH {
            return self.wildcard.filter(|&i| qualifies(&self.caps[i]));
        }
        if !is_prefix {
            if let Some(&i) = self.exact.get(path) {
                return Some(i);
            }
        }

        self.prefixes
            .iter()
            .copied()
            .find(|&i| {
                let cap = &self.caps[i];
                path_has_prefix(path, &cap.object_path) && qualifies(cap)
            })
            .or_else(|| self.wildcard.filter(|&i| qualifies(&self.caps[i])))
    }
}

/// Outcome of validating requested rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Rules to store, all `configured == true`.
    pub rules: Vec<Rule>,
    /// Requested interfaces the backing capability does not declare.
    pub invalid_interfaces: BTreeSet<InterfaceDecl>,
    /// Whole rules without a backing capability, and the dropped
    /// interfaces of partially accepted ones.
    pub rejected: Vec<RuleRequest>,
}

impl Validation {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.invalid_interfaces.is_empty()
    }
}

/// Validate requested rules against an app's declared capabilities.
pub fn validate(requested: &[RuleRequest], caps: &CapabilityIndex) -> Validation {
    let mut out = Validation::default();

    for req in requested {
        let Some(cap) = caps.lookup(&req.object_path, req.is_prefix) else {
            tracing::debug!(path = %req.object_path, prefix = req.is_prefix, "no capability backs requested rule");
            out.rejected.push(req.clone());
            continue;
        };

        let (kept, dropped): (BTreeSet<String>, BTreeSet<String>) = req
            .interfaces
            .iter()
            .cloned()
            .partition(|iface| cap.supports_interface(iface));

        for iface in &dropped {
            out.invalid_interfaces.insert(InterfaceDecl::named(iface.as_str()));
        }

        let whole_path = req.interfaces.is_empty() && cap.is_bare_wildcard();
        if kept.is_empty() && !whole_path {
            out.rejected.push(req.clone());
            continue;
        }
        if !dropped.is_empty() {
            out.rejected.push(RuleRequest {
                object_path: req.object_path.clone(),
                is_prefix: req.is_prefix,
                interfaces: dropped,
            });
        }

        out.rules.push(Rule {
            object_path: req.object_path.clone(),
            is_prefix: req.is_prefix,
            interfaces: kept,
            configured: true,
        });
    }

    out
}

/// Append the parts of `caps` untouched by `configured`, as display-only rules.
pub fn add_unconfigured(caps: &[Capability], configured: &[Rule]) -> Vec<Rule> {
    let mut out = configured.to_vec();

    for cap in caps {
        let at_path: Vec<&Rule> = configured
            .iter()
            .filter(|r| r.object_path == cap.object_path)
            .collect();
        let used: BTreeSet<&str> = at_path
            .iter()
            .flat_map(|r| r.interfaces.iter().map(String::as_str))
            .collect();
        let remaining: BTreeSet<String> = cap
            .interfaces
            .iter()
            .filter(|i| !used.contains(i.name.as_str()))
            .map(|i| i.name.clone())
            .collect();

        if at_path.is_empty() || !remaining.is_empty() {
            out.push(Rule {
                object_path: cap.object_path.clone(),
                is_prefix: cap.is_prefix,
                interfaces: remaining,
                configured: false,
            });
        }
    }

    out
}

/// Render every capability as a rule, marking the ones some stored rule relies on.
pub fn manifest_rules<'a>(
    caps: &CapabilityIndex,
    consumed: impl IntoIterator<Item = &'a Rule>,
) -> Vec<Rule> {
    let mut claimed = BTreeSet::new();
    for rule in consumed {
        if let Some(i) = caps.lookup_index(&rule.object_path, rule.is_prefix) {
            claimed.insert(i);
        }
    }

    caps.capabilities()
        .iter()
        .enumerate()
        .map(|(i, cap)| Rule {
            object_path: cap.object_path.clone(),
            is_prefix: cap.is_prefix,
            interfaces: cap.interfaces.iter().map(|d| d.name.clone()).collect(),
            configured: claimed.contains(&i),
        })
        .collect()
}

/// Join one announcement against remoted capabilities.
///
/// Returns `None` when the announcement has no usable identity or nothing it
/// offers intersects the declarations.
pub fn extract_remoted_app(caps: &CapabilityIndex, ann: &Announcement) -> Option<RemotedApp> {
    let id = ann.identity()?;

    let mut grants: BTreeMap<(String, bool), BTreeSet<String>> = BTreeMap::new();
    for (path, offered) in &ann.object_descriptions {
        for cap in caps.capabilities().iter().filter(|c| c.covers(path)) {
            let matched: BTreeSet<String> = offered
                .iter()
                .filter(|iface| cap.supports_interface(iface))
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }

            grants
                .entry((cap.object_path.clone(), cap.is_prefix))
                .or_default()
                .extend(matched.iter().cloned());
            // a prefix declaration also offers the concrete announced object
            if cap.object_path != *path {
                grants.entry((path.clone(), false)).or_default().extend(matched);
            }
        }
    }

    if grants.is_empty() {
        return None;
    }

    let rules = grants
        .into_iter()
        .map(|((object_path, is_prefix), interfaces)| Rule {
            object_path,
            is_prefix,
            interfaces,
            configured: false,
        })
        .collect();

    Some(RemotedApp {
        id,
        bus_name: ann.bus_name.clone(),
        app_name: ann.app_name.clone(),
        device_name: ann.device_name.clone(),
        rules,
    })
}

pub fn extract_remoted_apps<'a>(
    caps: &CapabilityIndex,
    anns: impl IntoIterator<Item = &'a Announcement>,
) -> Vec<RemotedApp> {
    anns.into_iter()
        .filter_map(|ann| extract_remoted_app(caps, ann))
        .collect()
}

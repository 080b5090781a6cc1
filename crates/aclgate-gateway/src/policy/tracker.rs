//! Which remote apps are reachable right now, and at which bus address.

use std::collections::BTreeMap;

use aclgate_core::announce::Announcement;
use aclgate_core::ident::AppIdentifier;

#[derive(Debug, Default)]
pub struct AnnouncementTracker {
    announced: BTreeMap<AppIdentifier, Announcement>,
}

impl AnnouncementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Returns true when the identifier is new or its
    /// bus address changed, i.e. when compiled policy is now stale.
    pub fn announce(&mut self, ann: Announcement) -> bool {
        let Some(id) = ann.identity() else {
            tracing::debug!(bus_name = %ann.bus_name, "announcement without usable identity ignored");
            return false;
        };

        let changed = self
            .announced
            .get(&id)
            .map_or(true, |prev| prev.bus_name != ann.bus_name);
        if changed {
            tracing::info!(remote = %id, bus_name = %ann.bus_name, "remote app announced");
        }
        self.announced.insert(id, ann);
        changed
    }

    /// Forget every identifier announced from `bus_name`. Returns true if any was known.
    pub fn peer_lost(&mut self, bus_name: &str) -> bool {
        let before = self.announced.len();
        self.announced.retain(|_, ann| ann.bus_name != bus_name);
        let lost = before - self.announced.len();
        if lost > 0 {
            tracing::info!(bus_name, lost, "remote peer lost");
        }
        lost > 0
    }

    pub fn bus_name(&self, id: &AppIdentifier) -> Option<&str> {
        self.announced.get(id).map(|a| a.bus_name.as_str())
    }

    pub fn announcements(&self) -> impl Iterator<Item = &Announcement> {
        self.announced.values()
    }

    pub fn len(&self) -> usize {
        self.announced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }
}

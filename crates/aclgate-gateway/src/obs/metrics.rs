//! Minimal metrics registry for the gateway.
//!
//! Counter and gauge types with dynamic labels backed by `DashMap`. Labels are
//! flattened into sorted key vectors, and rendering sorts series, so output
//! order is deterministic.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_series(name: &str, kind: &str, mut rows: Vec<(LabelKey, String)>, out: &mut String) {
    rows.sort();
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (key, val) in rows {
        let label_str = key
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(out, "{name}{{{label_str}}} {val}");
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        let counter = self.map.entry(label_key(labels)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        let rows = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed).to_string()))
            .collect();
        render_series(name, "counter", rows, out);
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self.map.entry(label_key(labels)).or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        let rows = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed).to_string()))
            .collect();
        render_series(name, "gauge", rows, out);
    }
}

#[derive(Default)]
pub struct GatewayMetrics {
    /// Administrative calls by `op` and response `code`.
    pub admin_requests: CounterVec,
    /// Policy commits by `result` (ok / persist_failed / reload_failed).
    pub policy_commits: CounterVec,
    /// Process lifecycle by `event` (started / start_failed / exited / killed).
    pub process_events: CounterVec,
    pub apps_running: GaugeVec,
    pub announcements: CounterVec,
}

impl GatewayMetrics {
    /// Render all registered metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.admin_requests.render("aclgate_admin_requests_total", &mut out);
        self.policy_commits.render("aclgate_policy_commits_total", &mut out);
        self.process_events.render("aclgate_process_events_total", &mut out);
        self.apps_running.render("aclgate_apps_running", &mut out);
        self.announcements.render("aclgate_announcements_total", &mut out);
        out
    }
}

//! Proxy metrics registry — per-proxy configuration and traffic counters.
//!
//! Wrapped in `Arc<ProxyMetricRegistry>` and shared by the forwarding runtime
//! (writers) and the admin API (readers).
//!
//! Two lock tiers: the registry map lock guards which proxies exist, and each
//! record has its own lock for its fields. Mutators hold the map lock only for
//! the lookup, then take the record lock. Never take the map lock while holding
//! a record lock.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, DayZone, SystemClock};
use crate::daily::{DailyServerStats, apply_daily};
use crate::status::status_label;

/// Configuration and traffic statistics for one proxy.
///
/// Registry reads hand out clones of this, never references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMetric {
    pub name: String,
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub bind_addr: String,
    pub listen_port: i64,
    pub custom_domains: Vec<String>,
    pub status: String,
    pub use_encryption: bool,
    pub use_gzip: bool,
    pub privilege_mode: bool,

    // ─── Statistics ──────────────────────────────────────────────────────
    /// Open connections; negative if closes were reported without opens.
    pub current_conns: i64,
    /// Oldest first, at most `keep_days` entries.
    pub daily: Vec<DailyServerStats>,
}

impl ProxyMetric {
    /// The bucket for `day_key`, if that day saw any traffic.
    pub fn day(&self, day_key: &str) -> Option<&DailyServerStats> {
        self.daily.iter().rev().find(|d| d.time == day_key)
    }
}

/// Configuration fields accepted by [`ProxyMetricRegistry::register`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyInfo {
    pub name: String,
    pub proxy_type: String,
    pub bind_addr: String,
    pub listen_port: i64,
    pub custom_domains: Vec<String>,
    pub use_encryption: bool,
    pub use_gzip: bool,
    pub privilege_mode: bool,
}

impl ProxyInfo {
    fn apply_to(self, metric: &mut ProxyMetric) {
        metric.name = self.name;
        metric.proxy_type = self.proxy_type;
        metric.bind_addr = self.bind_addr;
        metric.listen_port = self.listen_port;
        metric.custom_domains = self.custom_domains;
        metric.use_encryption = self.use_encryption;
        metric.use_gzip = self.use_gzip;
        metric.privilege_mode = self.privilege_mode;
    }
}

/// Registry of per-proxy metrics, shared across all connection tasks.
pub struct ProxyMetricRegistry {
    proxies: RwLock<HashMap<String, Arc<RwLock<ProxyMetric>>>>,
    keep_days: usize,
    clock: Arc<dyn Clock>,
}

impl ProxyMetricRegistry {
    /// Registry on the host's local calendar. `keep_days` below 1 is raised to 1.
    pub fn new(keep_days: usize) -> Self {
        Self::with_clock(keep_days, Arc::new(SystemClock::new(DayZone::Local)))
    }

    pub fn with_clock(keep_days: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            proxies: RwLock::new(HashMap::new()),
            keep_days: keep_days.max(1),
            clock,
        }
    }

    pub fn keep_days(&self) -> usize {
        self.keep_days
    }

    /// Key of the bucket mutations would land in right now.
    pub fn today_key(&self) -> String {
        self.clock.day_key()
    }

    pub fn len(&self) -> usize {
        self.proxies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.read().is_empty()
    }

    /// Registered proxy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.proxies.read().keys().cloned().collect();
        names.sort();
        names
    }

    // ─── Control plane ───────────────────────────────────────────────────

    /// Create the record for `info.name`, or overwrite its configuration.
    /// Counters, status and daily history survive re-registration.
    pub fn register(&self, info: ProxyInfo) {
        let mut proxies = self.proxies.write();
        let name = info.name.clone();
        match proxies.get(&name) {
            Some(existing) => {
                info.apply_to(&mut *existing.write());
                debug!(proxy = %name, "metrics: proxy updated");
            }
            None => {
                let mut metric = ProxyMetric::default();
                info.apply_to(&mut metric);
                proxies.insert(name.clone(), Arc::new(RwLock::new(metric)));
                debug!(proxy = %name, "metrics: proxy registered");
            }
        }
    }

    /// Set the status label from a status code. Unknown proxies and codes
    /// outside the status table are ignored.
    pub fn set_status(&self, name: &str, code: i64) {
        let Some(label) = status_label(code) else {
            debug!(proxy = %name, code, "metrics: unknown status code ignored");
            return;
        };
        self.with_metric(name, |m| {
            if m.status != label {
                debug!(proxy = %name, from = %m.status, to = label, "metrics: status changed");
            }
            m.status = label.to_string();
        });
    }

    // ─── Data plane ──────────────────────────────────────────────────────

    pub fn open_connection(&self, name: &str) {
        let today = self.clock.day_key();
        let keep_days = self.keep_days;
        self.with_metric(name, |m| {
            m.current_conns = m.current_conns.saturating_add(1);
            apply_daily(&mut m.daily, &today, keep_days, |d| {
                d.total_accept_conns = d.total_accept_conns.saturating_add(1);
            });
        });
    }

    /// Decrement open connections. Daily history is not touched.
    pub fn close_connection(&self, name: &str) {
        self.with_metric(name, |m| {
            m.current_conns = m.current_conns.saturating_sub(1);
        });
    }

    pub fn add_flow_in(&self, name: &str, delta: u64) {
        let delta = clamp_delta(delta);
        self.update_today(name, |d| d.flow_in = d.flow_in.saturating_add(delta));
    }

    pub fn add_flow_out(&self, name: &str, delta: u64) {
        let delta = clamp_delta(delta);
        self.update_today(name, |d| d.flow_out = d.flow_out.saturating_add(delta));
    }

    // ─── Query plane ─────────────────────────────────────────────────────

    /// Independent copy of one proxy's record, `None` if not registered.
    pub fn get_proxy_metrics(&self, name: &str) -> Option<ProxyMetric> {
        let proxies = self.proxies.read();
        proxies.get(name).map(|m| m.read().clone())
    }

    /// Independent copies of every record. Each record is copied under its
    /// own read lock, so records may reflect different instants.
    pub fn get_all_proxy_metrics(&self) -> HashMap<String, ProxyMetric> {
        let proxies = self.proxies.read();
        proxies
            .iter()
            .map(|(name, m)| (name.clone(), m.read().clone()))
            .collect()
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Option<Arc<RwLock<ProxyMetric>>> {
        self.proxies.read().get(name).map(Arc::clone)
    }

    /// Run `f` under the record's write lock. The map lock is released first.
    fn with_metric<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut ProxyMetric),
    {
        match self.lookup(name) {
            Some(metric) => f(&mut *metric.write()),
            None => debug!(proxy = %name, "metrics: update for unknown proxy dropped"),
        }
    }

    fn update_today<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut DailyServerStats),
    {
        let today = self.clock.day_key();
        let keep_days = self.keep_days;
        self.with_metric(name, |m| apply_daily(&mut m.daily, &today, keep_days, f));
    }
}

impl Default for ProxyMetricRegistry {
    fn default() -> Self {
        Self::new(crate::daily::DEFAULT_KEEP_DAYS)
    }
}

fn clamp_delta(delta: u64) -> i64 {
    i64::try_from(delta).unwrap_or(i64::MAX)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

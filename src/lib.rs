//! Per-proxy traffic metrics for reverse proxies and tunnels.
//!
//! [`ProxyMetricRegistry`] is the core: the forwarding runtime reports
//! connection and byte events into it, and readers take independent snapshots.
//! The remaining modules host the registry in a small TCP forwarder with an
//! admin API.

pub mod admin;
pub mod clock;
pub mod config;
pub mod daily;
pub mod metrics;
pub mod proxies;
pub mod proxy;
pub mod status;
pub mod stream;

pub use clock::{Clock, DayZone, ManualClock, SystemClock};
pub use daily::{DEFAULT_KEEP_DAYS, DailyServerStats};
pub use metrics::{ProxyInfo, ProxyMetric, ProxyMetricRegistry};
pub use status::{ProxyStatus, STATUS_STR};

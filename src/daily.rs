//! Daily buckets — a bounded, chronological window of per-day traffic.
//!
//! Every counter mutation that belongs to a day goes through [`apply_daily`],
//! which finds (or creates) today's bucket and rotates out the oldest one when
//! the window is full.

use serde::{Deserialize, Serialize};

/// Default number of daily buckets kept per proxy.
pub const DEFAULT_KEEP_DAYS: usize = 7;

/// One calendar day of traffic for one proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyServerStats {
    /// Day key, `YYYYMMDD`.
    pub time: String,
    pub flow_in: i64,
    pub flow_out: i64,
    pub total_accept_conns: i64,
}

impl DailyServerStats {
    pub fn new(time: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            ..Default::default()
        }
    }
}

/// Apply `f` to today's bucket in `daily`.
///
/// Only the newest bucket is compared with `today`. A `today` older than the
/// newest bucket (clock stepped backwards) is treated as the newest bucket's
/// day, so keys stay unique and ascending. A new bucket is appended when the
/// day changes; once `keep_days` buckets exist the oldest is dropped first.
/// Days with no activity leave no bucket.
pub fn apply_daily<F>(daily: &mut Vec<DailyServerStats>, today: &str, keep_days: usize, f: F)
where
    F: FnOnce(&mut DailyServerStats),
{
    if let Some(last) = daily.last_mut()
        && last.time.as_str() >= today
    {
        f(last);
        return;
    }

    let mut entry = DailyServerStats::new(today);
    f(&mut entry);

    let keep_days = keep_days.max(1);
    if daily.len() >= keep_days {
        let excess = daily.len() + 1 - keep_days;
        daily.drain(..excess);
    }
    daily.push(entry);
}

// ─── Tests ──────────────────────────────────────────────────────────────────

//! Uptime aggregation over a workload's point history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::ObservationPoint;

/// Trailing window lengths, in days
pub const DAY_WINDOW_DAYS: i64 = 1;
pub const WEEK_WINDOW_DAYS: i64 = 7;
pub const MONTH_WINDOW_DAYS: i64 = 30;

/// Windowed uptime percentages for one workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeStats {
    pub overall: f64,
    pub last_day: f64,
    pub last_week: f64,
    pub last_month: f64,
    pub history: Vec<ObservationPoint>,
}

impl UptimeStats {
    /// All windows at zero with no history, used when nothing is known
    pub fn empty() -> Self {
        Self {
            overall: 0.0,
            last_day: 0.0,
            last_week: 0.0,
            last_month: 0.0,
            history: Vec::new(),
        }
    }
}

/// Compute uptime percentages over the whole history and the trailing
/// day, week and month ending at `now`.
///
/// A point belongs to a window when its timestamp is at or after the window
/// start. A window with no points reports 0.
pub fn compute_stats(history: &[ObservationPoint], now: DateTime<Utc>) -> UptimeStats {
    let day_ago = now - Duration::days(DAY_WINDOW_DAYS);
    let week_ago = now - Duration::days(WEEK_WINDOW_DAYS);
    let month_ago = now - Duration::days(MONTH_WINDOW_DAYS);

    UptimeStats {
        overall: percentage_since(history, None),
        last_day: percentage_since(history, Some(day_ago)),
        last_week: percentage_since(history, Some(week_ago)),
        last_month: percentage_since(history, Some(month_ago)),
        history: history.to_vec(),
    }
}

fn percentage_since(history: &[ObservationPoint], since: Option<DateTime<Utc>>) -> f64 {
    let (online, total) = history
        .iter()
        .filter(|p| since.is_none_or(|start| p.timestamp >= start))
        .fold((0usize, 0usize), |(online, total), p| {
            (online + usize::from(p.is_online), total + 1)
        });

    if total == 0 {
        0.0
    } else {
        100.0 * online as f64 / total as f64
    }
}

//! Day-window rendering of the master schedule.
//!
//! This is the core operation behind the external `/schedule/render`
//! endpoint: for every day in the window, resolve the schedule in force
//! and flatten its timeslots to concrete ISO-8601 ranges.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::errors::CoreError;

use super::manager::ScheduleSet;

/// One flattened timeslot of the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderItem {
    /// Id of the timed schedule the slot belongs to.
    pub schedule: String,
    pub id: String,
    pub start: String,
    pub end: String,
}

/// A rendered window of consecutive days.
#[derive(Debug, Clone, Serialize)]
pub struct RenderWindow {
    pub start_ts: String,
    pub end_ts: String,
    pub days: u32,
    /// Referenced timed-schedule documents keyed by id.
    pub schedules: serde_json::Map<String, Value>,
    pub render: Vec<RenderItem>,
}

/// Render `days` consecutive days beginning at the midnight of `start`.
/// Fails with `NotFound` when an evaluated name resolves to no timed
/// schedule.
pub fn render_window(
    set: &ScheduleSet,
    start: DateTime<Utc>,
    days: u32,
) -> Result<RenderWindow, CoreError> {
    let start_ts = start
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight")
        .and_utc();
    let end_ts = start_ts + Duration::days(days as i64);

    let mut schedules = serde_json::Map::new();
    let mut render = Vec::new();
    let mut day_ts = start_ts;
    while day_ts < end_ts {
        let name = set.master.evaluate(day_ts);
        let target = set
            .schedules
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CoreError::NotFound(format!("timed schedule '{name}'")))?;
        let base = day_ts.date_naive();
        for item in target.sorted_items() {
            let (slot_start, slot_end) = item.window(base);
            render.push(RenderItem {
                schedule: target.id.clone(),
                id: item.id.clone(),
                start: slot_start.to_rfc3339(),
                end: slot_end.to_rfc3339(),
            });
        }
        if !schedules.contains_key(&target.id) {
            schedules.insert(target.id.clone(), serde_json::to_value(target)?);
        }
        day_ts += Duration::days(1);
    }

    Ok(RenderWindow {
        start_ts: start_ts.to_rfc3339(),
        end_ts: end_ts.to_rfc3339(),
        days,
        schedules,
        render,
    })
}

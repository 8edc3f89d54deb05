//! Trigger configurations and the lazy generators that expand them into
//! firing times.
//!
//! Weekday numbering is ISO: Monday = 0 through Sunday = 6.
//!
//! Generators are lazy and unbounded while the trigger is satisfiable;
//! callers take the first N or stop at a cutoff. Unknown `type` tags yield
//! nothing, so new trigger kinds can roll out without breaking old engines.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Day-level constraint. Only `dayofweek` is understood today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub days: Vec<u8>,
}

/// Time-level constraint. Only `hourly` is understood today: fire at every
/// listed minute of every hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub minutes: Vec<u32>,
}

/// A task trigger: optional startup firing plus day/time recurrence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_startup: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<DayConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeConfig>,
}

pub const DAY_OF_WEEK: &str = "dayofweek";
pub const HOURLY: &str = "hourly";

impl TriggerConfig {
    /// Whether the task should fire once when playback starts.
    pub fn fires_on_startup(&self) -> bool {
        self.on_startup.unwrap_or(false)
    }

    /// Whether this trigger matches instant `t` at minute resolution:
    /// equivalent to "`generate_schedule(t - ε, self)` yields `t`", with
    /// the relaxation that an entry carrying only a day constraint matches
    /// any minute of a permitted day. A trigger with neither constraint
    /// never matches.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        if self.day.is_none() && self.time.is_none() {
            return false;
        }
        if let Some(day) = &self.day {
            if day.kind != DAY_OF_WEEK {
                return false;
            }
            let weekday = t.weekday().num_days_from_monday() as u8;
            if !day.days.contains(&weekday) {
                return false;
            }
        }
        if let Some(time) = &self.time {
            if time.kind != HOURLY {
                return false;
            }
            if !time.minutes.contains(&t.minute()) {
                return false;
            }
        }
        true
    }
}

/// Strictly increasing firing times matching `cfg`, starting strictly
/// after `now`. Lazy and unbounded; empty for unknown `type` tags or an
/// empty minute set.
pub fn generate_trigger_time(
    now: DateTime<Utc>,
    cfg: &TimeConfig,
) -> Box<dyn Iterator<Item = DateTime<Utc>> + Send> {
    let minutes = match cfg.kind.as_str() {
        HOURLY => {
            let mut minutes: Vec<u32> = cfg.minutes.iter().copied().filter(|m| *m < 60).collect();
            minutes.sort_unstable();
            minutes.dedup();
            minutes
        }
        _ => Vec::new(),
    };
    if minutes.is_empty() {
        return Box::new(std::iter::empty());
    }
    Box::new(HourlySlots {
        cursor: floor_to_minute(now),
        minutes,
    })
}

/// Firing times matching both the day and the time constraint of
/// `trigger`, strictly after `now`. An unsatisfiable trigger (no time
/// constraint, unknown tags, no permitted day) yields nothing.
pub fn generate_schedule(
    now: DateTime<Utc>,
    trigger: &TriggerConfig,
) -> Box<dyn Iterator<Item = DateTime<Utc>> + Send> {
    let allowed_days: Option<Vec<u8>> = match &trigger.day {
        None => None,
        Some(day) if day.kind == DAY_OF_WEEK => {
            Some(day.days.iter().copied().filter(|d| *d < 7).collect())
        }
        Some(_) => Some(Vec::new()),
    };
    if let Some(days) = &allowed_days {
        if days.is_empty() {
            return Box::new(std::iter::empty());
        }
    }
    let times = match &trigger.time {
        Some(cfg) => generate_trigger_time(now, cfg),
        None => return Box::new(std::iter::empty()),
    };
    match allowed_days {
        None => times,
        Some(days) => Box::new(times.filter(move |t| {
            days.contains(&(t.weekday().num_days_from_monday() as u8))
        })),
    }
}

struct HourlySlots {
    cursor: DateTime<Utc>,
    minutes: Vec<u32>,
}

impl Iterator for HourlySlots {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let hour_start = self
            .cursor
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))?;
        // The next slot is in this hour or the one after it.
        for offset in 0..=1 {
            let base = hour_start + Duration::hours(offset);
            for &minute in &self.minutes {
                let slot = base + Duration::minutes(minute as i64);
                if slot > self.cursor {
                    self.cursor = slot;
                    return Some(slot);
                }
            }
        }
        None
    }
}

fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

//! # Schedule Module - What Plays When
//!
//! Four document kinds drive playback, each tagged with a `type` URN on
//! disk:
//!
//! - **Timed schedule** (`urn:inky:storage:schedule:timed:1`) - day-relative
//!   timeslots, each backed by a plugin.
//! - **Playlist** (`urn:inky:storage:schedule:playlist:1`) - an ordered list
//!   of tracks advanced linearly.
//! - **Timer tasks** (`urn:inky:storage:schedule:tasks:1`) - trigger-fired
//!   one-shot tasks.
//! - **Master schedule** (`urn:inky:storage:schedule:master:1`) - the state
//!   machine mapping an instant to the name of the schedule in force.
//!
//! Entities are loaded once per configure, validated, and immutable for the
//! rest of the run. Every evaluation takes the timestamp as a parameter;
//! nothing here reads a clock.

pub mod manager;
pub mod render;
pub mod trigger;

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;
use trigger::TriggerConfig;

pub const MASTER_URN: &str = "urn:inky:storage:schedule:master:1";
pub const TIMED_URN: &str = "urn:inky:storage:schedule:timed:1";
pub const PLAYLIST_URN: &str = "urn:inky:storage:schedule:playlist:1";
pub const TASKS_URN: &str = "urn:inky:storage:schedule:tasks:1";

fn master_urn() -> String {
    MASTER_URN.to_string()
}
fn timed_urn() -> String {
    TIMED_URN.to_string()
}
fn playlist_urn() -> String {
    PLAYLIST_URN.to_string()
}
fn tasks_urn() -> String {
    TASKS_URN.to_string()
}

/// One day-relative timeslot: starts `start_minutes` after midnight of the
/// evaluation day and runs for `duration_minutes` (may spill into the next
/// day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSchedule {
    pub plugin_name: String,
    pub id: String,
    pub title: String,
    pub start_minutes: u32,
    pub duration_minutes: u32,
    #[serde(default)]
    pub content: Value,
}

impl PluginSchedule {
    /// Concrete `[start, end)` window for a given base date.
    pub fn window(&self, base: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = Utc
            .from_utc_datetime(&base.and_hms_opt(0, 0, 0).expect("midnight"));
        let start = midnight + Duration::minutes(self.start_minutes as i64);
        let end = start + Duration::minutes(self.duration_minutes as i64);
        (start, end)
    }
}

/// Ordered set of timeslots keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSchedule {
    #[serde(rename = "type", default = "timed_urn")]
    pub schema: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<PluginSchedule>,
}

impl TimedSchedule {
    pub fn new(id: &str, name: &str, items: Vec<PluginSchedule>) -> Self {
        Self {
            schema: timed_urn(),
            id: id.to_string(),
            name: name.to_string(),
            items,
        }
    }

    /// Items ordered by start minute.
    pub fn sorted_items(&self) -> Vec<&PluginSchedule> {
        let mut sorted: Vec<&PluginSchedule> = self.items.iter().collect();
        sorted.sort_by_key(|item| item.start_minutes);
        sorted
    }

    /// The item in force at `t`, if any. Items of the previous day that
    /// spill past midnight are considered; on overlap the latest-starting
    /// item wins.
    pub fn current(&self, t: DateTime<Utc>) -> Option<&PluginSchedule> {
        let today = t.date_naive();
        let mut hit: Option<(&PluginSchedule, DateTime<Utc>)> = None;
        for base in [today.pred_opt().unwrap_or(today), today] {
            for item in &self.items {
                let (start, end) = item.window(base);
                if t >= start && t < end {
                    match hit {
                        Some((_, best)) if best >= start => {}
                        _ => hit = Some((item, start)),
                    }
                }
            }
        }
        hit.map(|(item, _)| item)
    }

    /// First item whose `[start, end)` window overlaps the candidate's, or
    /// `None` when the candidate fits. The candidate's own id is skipped.
    pub fn check(&self, candidate: &PluginSchedule) -> Option<&PluginSchedule> {
        let c_start = candidate.start_minutes;
        let c_end = candidate.start_minutes + candidate.duration_minutes;
        self.sorted_items().into_iter().find(|item| {
            if item.id == candidate.id {
                return false;
            }
            let start = item.start_minutes;
            let end = item.start_minutes + item.duration_minutes;
            c_start < end && start < c_end
        })
    }

    /// A timed schedule is valid when ids are unique, every slot starts
    /// within the day, durations are positive and no pair of windows
    /// overlaps.
    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_unique_ids("timed schedule", &self.id, self.items.iter().map(|i| i.id.as_str()))?;
        for item in &self.items {
            if item.start_minutes >= 24 * 60 {
                return Err(CoreError::InvalidInput(format!(
                    "timeslot '{}' starts outside the day ({})",
                    item.id, item.start_minutes
                )));
            }
            if item.duration_minutes == 0 {
                return Err(CoreError::InvalidInput(format!(
                    "timeslot '{}' has zero duration",
                    item.id
                )));
            }
        }
        let sorted = self.sorted_items();
        for (ix, item) in sorted.iter().enumerate() {
            for later in &sorted[ix + 1..] {
                let end = item.start_minutes + item.duration_minutes;
                if later.start_minutes < end {
                    return Err(CoreError::InvalidInput(format!(
                        "schedule '{}': timeslot '{}' overlaps '{}'",
                        self.name, item.id, later.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One playlist track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSchedule {
    pub plugin_name: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Value,
}

/// Ordered list of tracks advanced linearly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(rename = "type", default = "playlist_urn")]
    pub schema: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<PlaylistSchedule>,
}

impl Playlist {
    pub fn new(id: &str, name: &str, items: Vec<PlaylistSchedule>) -> Self {
        Self {
            schema: playlist_urn(),
            id: id.to_string(),
            name: name.to_string(),
            items,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_unique_ids("playlist", &self.id, self.items.iter().map(|i| i.id.as_str()))
    }
}

/// The work a fired timer task performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerTaskTask {
    pub plugin_name: String,
    #[serde(default)]
    pub title: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub content: Value,
}

/// One trigger-fired task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerTaskItem {
    pub id: String,
    pub title: String,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub task: TimerTaskTask,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// A named group of timer tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerTasks {
    #[serde(rename = "type", default = "tasks_urn")]
    pub schema: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<TimerTaskItem>,
}

impl TimerTasks {
    pub fn new(id: &str, name: &str, items: Vec<TimerTaskItem>) -> Self {
        Self {
            schema: tasks_urn(),
            id: id.to_string(),
            name: name.to_string(),
            items,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_unique_ids("timer tasks", &self.id, self.items.iter().map(|i| i.id.as_str()))
    }
}

/// One master-schedule alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEntry {
    pub name: String,
    pub enabled: bool,
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,
}

/// Maps an instant to the name of the schedule in force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSchedule {
    #[serde(rename = "type", default = "master_urn")]
    pub schema: String,
    #[serde(rename = "defaultSchedule")]
    pub default_schedule: String,
    #[serde(default)]
    pub schedules: Vec<MasterEntry>,
}

impl MasterSchedule {
    pub fn new(default_schedule: &str, schedules: Vec<MasterEntry>) -> Self {
        Self {
            schema: master_urn(),
            default_schedule: default_schedule.to_string(),
            schedules,
        }
    }

    /// Name of the schedule in force at `t`: the first enabled entry whose
    /// trigger matches, else the default. An entry without a trigger never
    /// matches. Total over all timestamps.
    pub fn evaluate(&self, t: DateTime<Utc>) -> &str {
        for entry in &self.schedules {
            if !entry.enabled {
                continue;
            }
            let matched = entry
                .trigger
                .as_ref()
                .is_some_and(|trigger| trigger.matches(t));
            if matched {
                return &entry.schedule;
            }
        }
        &self.default_schedule
    }

    /// Valid when every referenced schedule (and the default) resolves to
    /// a known name.
    pub fn validate(&self, known: &HashSet<&str>) -> Result<(), CoreError> {
        if !known.contains(self.default_schedule.as_str()) {
            return Err(CoreError::InvalidInput(format!(
                "master default '{}' does not resolve",
                self.default_schedule
            )));
        }
        for entry in &self.schedules {
            if !known.contains(entry.schedule.as_str()) {
                return Err(CoreError::InvalidInput(format!(
                    "master entry '{}' references unknown schedule '{}'",
                    entry.name, entry.schedule
                )));
            }
        }
        Ok(())
    }
}

fn ensure_unique_ids<'a>(
    what: &str,
    owner: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CoreError::InvalidInput(format!(
                "{what} '{owner}' has duplicate item id '{id}'"
            )));
        }
    }
    Ok(())
}

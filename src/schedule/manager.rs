//! Loads and validates the schedule folder.
//!
//! Every `.json` document in the folder is bucketed by its `type` URN;
//! documents with an unknown tag are skipped with a warning so foreign
//! files cannot take the engine down.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, warn};
use serde_json::Value;

use crate::errors::CoreError;
use crate::validation::validate_json_filename;

use super::{
    MasterSchedule, Playlist, TimedSchedule, TimerTasks, MASTER_URN, PLAYLIST_URN, TASKS_URN,
    TIMED_URN,
};

/// Everything the schedule folder held at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSet {
    pub master: MasterSchedule,
    pub schedules: Vec<TimedSchedule>,
    pub playlists: Vec<Playlist>,
    pub tasks: Vec<TimerTasks>,
}

/// Loader bound to one schedule storage folder.
pub struct ScheduleManager {
    root: PathBuf,
}

impl ScheduleManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Read every schedule document. Fails when the folder is missing or
    /// holds no master schedule.
    pub fn load(&self) -> Result<ScheduleSet, CoreError> {
        if !self.root.is_dir() {
            return Err(CoreError::NotFound(format!(
                "schedule folder {}",
                self.root.display()
            )));
        }
        let mut master: Option<MasterSchedule> = None;
        let mut schedules = Vec::new();
        let mut playlists = Vec::new();
        let mut tasks = Vec::new();

        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        for name in names {
            if validate_json_filename(&name).is_err() {
                debug!("skipping non-document '{name}'");
                continue;
            }
            let path = self.root.join(&name);
            let text = std::fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&text)?;
            let urn = value.get("type").and_then(Value::as_str).unwrap_or("");
            match urn {
                MASTER_URN => {
                    if master.is_some() {
                        return Err(CoreError::InvalidInput(format!(
                            "second master schedule in '{name}'"
                        )));
                    }
                    master = Some(serde_json::from_value(value)?);
                }
                TIMED_URN => schedules.push(serde_json::from_value(value)?),
                PLAYLIST_URN => playlists.push(serde_json::from_value(value)?),
                TASKS_URN => tasks.push(serde_json::from_value(value)?),
                other => {
                    warn!("'{name}' has unknown schedule type '{other}', skipped");
                }
            }
        }

        let master = master.ok_or_else(|| {
            CoreError::NotFound(format!("master schedule in {}", self.root.display()))
        })?;
        debug!(
            "loaded {} timed, {} playlists, {} task groups",
            schedules.len(),
            playlists.len(),
            tasks.len()
        );
        Ok(ScheduleSet {
            master,
            schedules,
            playlists,
            tasks,
        })
    }

    /// Validate a loaded set: the master's references must resolve and
    /// every collection must satisfy its own invariants.
    pub fn validate(&self, set: &ScheduleSet) -> Result<(), CoreError> {
        let mut known: HashSet<&str> = set.schedules.iter().map(|s| s.name.as_str()).collect();
        // Playlists share the master's name space: the playlist layer
        // resolves the evaluated name against playlists.
        known.extend(set.playlists.iter().map(|p| p.name.as_str()));
        set.master.validate(&known)?;
        for schedule in &set.schedules {
            schedule.validate()?;
        }
        for playlist in &set.playlists {
            playlist.validate()?;
        }
        for group in &set.tasks {
            group.validate()?;
        }
        Ok(())
    }
}

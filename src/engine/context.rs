//! Execution context handed to plugins for the duration of one track.

use chrono::{DateTime, Utc};

use crate::runtime::services::ServiceContainer;
use crate::sources::DataSourceContext;

/// What a plugin sees while playing a track: the service provider, the
/// current display dimensions, and the schedule timestamp the track is
/// playing "at".
#[derive(Clone)]
pub struct ExecutionContext {
    pub services: ServiceContainer,
    pub dimensions: (u32, u32),
    pub schedule_ts: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(
        services: ServiceContainer,
        dimensions: (u32, u32),
        schedule_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            services,
            dimensions,
            schedule_ts,
        }
    }

    /// Fork a child context for one data source, preserving dimensions and
    /// the schedule timestamp.
    pub fn create_datasource_context(&self, source_id: &str) -> DataSourceContext {
        DataSourceContext {
            services: self.services.clone(),
            dimensions: self.dimensions,
            schedule_ts: self.schedule_ts,
            source_id: source_id.to_string(),
        }
    }
}

//! Injected time-of-day source.
//!
//! The core never reads the OS clock directly; every timestamp originates
//! here. That makes elapsed time scalable in tests: with a scale of 60, a
//! sixty-second timer fires after one real second and `now_utc` advances
//! sixty scheduled seconds per real second.

use chrono::{DateTime, Duration, Utc};

use crate::errors::CoreError;

/// Source of the current timestamp and the time scale applied to delays.
pub trait TimeOfDay: Send + Sync {
    /// Current instant in scheduled time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Ratio of scheduled time to real time. 1.0 means wall clock.
    fn scale(&self) -> f64 {
        1.0
    }
}

/// Production time source: the wall clock, unscaled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeOfDay;

impl TimeOfDay for SystemTimeOfDay {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time source anchored at a fixed start and advancing `scale` times faster
/// than real time. Used by tests and preview renders.
#[derive(Debug, Clone)]
pub struct ScaledTimeOfDay {
    start: DateTime<Utc>,
    origin: std::time::Instant,
    scale: f64,
}

impl ScaledTimeOfDay {
    pub fn new(start: DateTime<Utc>, scale: f64) -> Result<Self, CoreError> {
        if !(scale > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "time scale must be positive, got {scale}"
            )));
        }
        Ok(Self {
            start,
            origin: std::time::Instant::now(),
            scale,
        })
    }
}

impl TimeOfDay for ScaledTimeOfDay {
    fn now_utc(&self) -> DateTime<Utc> {
        let real = self.origin.elapsed();
        let scaled = real.as_secs_f64() * self.scale;
        self.start
            + Duration::microseconds((scaled * 1_000_000.0) as i64)
    }

    fn scale(&self) -> f64 {
        self.scale
    }
}

/*
[INPUT]:  Delegate lifecycle instants
[OUTPUT]: Task timing (latency, request, transform and total durations)
[POS]:    Ambient - per-task timing record
[UPDATE]: When recording new lifecycle instants
*/

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Wall-clock instants of one task's lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    /// First resume
    pub start: Option<DateTime<Utc>>,
    pub initial_response: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// Set on the copy handed to a response callback
    pub transform_completed: Option<DateTime<Utc>>,
}

impl Timeline {
    /// Time to the first response head
    pub fn latency(&self) -> Option<Duration> {
        Some(self.initial_response? - self.start?)
    }

    pub fn request_duration(&self) -> Option<Duration> {
        Some(self.completed? - self.start?)
    }

    pub fn transform_duration(&self) -> Option<Duration> {
        Some(self.transform_completed? - self.completed?)
    }

    pub fn total_duration(&self) -> Option<Duration> {
        let end = self.transform_completed.or(self.completed)?;
        Some(end - self.start?)
    }
}

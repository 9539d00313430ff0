/*
[INPUT]:  Delegate completion snapshot plus transform outcome
[OUTPUT]: Value handed to exactly one completion callback
[POS]:    Response layer - response container
[UPDATE]: When completion callbacks need more task details
*/

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::TaskwireError;
use crate::timeline::Timeline;
use crate::transport::TaskId;
use crate::types::{RequestHead, ResponseHead};

/// Outcome of a finished task after its transform ran.
///
/// `error` is the task's terminal error; `transform_error` is reported
/// separately so neither hides the other.
#[derive(Debug)]
pub struct TaskResponse<T> {
    pub task_id: TaskId,
    pub request: Option<RequestHead>,
    pub response: Option<ResponseHead>,
    /// Buffered body of data and upload tasks
    pub data: Option<Bytes>,
    /// Final location of a moved download
    pub destination: Option<PathBuf>,
    pub resume_data: Option<Bytes>,
    pub value: Option<T>,
    pub error: Option<Arc<TaskwireError>>,
    pub transform_error: Option<TaskwireError>,
    pub timeline: Timeline,
}

impl<T> TaskResponse<T> {
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|response| response.status)
    }

    /// No terminal error and no transform error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.transform_error.is_none()
    }

    /// First error observed: the terminal error, then the transform error
    pub fn first_error(&self) -> Option<&TaskwireError> {
        self.error.as_deref().or(self.transform_error.as_ref())
    }
}

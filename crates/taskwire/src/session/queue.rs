/*
[INPUT]:  Completion callbacks registered before or after a task finishes
[OUTPUT]: Callbacks run in registration order once the task is terminal
[POS]:    Session layer - per-delegate completion queue
[UPDATE]: When changing where completion callbacks execute
*/

use std::sync::Mutex;

use tokio::runtime::Handle;

use crate::sync::lock;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum QueueState {
    Pending(Vec<Job>),
    Released,
}

/// Holds completion jobs until released, then runs them off the transport
pub(crate) struct CompletionQueue {
    state: Mutex<QueueState>,
    runtime: Option<Handle>,
}

impl CompletionQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::Pending(Vec::new())),
            runtime: Handle::try_current().ok(),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        let mut state = lock(&self.state);
        match &mut *state {
            QueueState::Pending(jobs) => jobs.push(job),
            QueueState::Released => {
                drop(state);
                self.dispatch(vec![job]);
            }
        }
    }

    /// Run everything queued so far; later pushes run immediately
    pub(crate) fn release(&self) {
        let jobs = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut *state, QueueState::Released) {
                QueueState::Pending(jobs) => jobs,
                QueueState::Released => return,
            }
        };
        self.dispatch(jobs);
    }

    fn dispatch(&self, jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }
        match Handle::try_current().ok().or_else(|| self.runtime.clone()) {
            Some(runtime) => {
                runtime.spawn_blocking(move || jobs.into_iter().for_each(|job| job()));
            }
            None => jobs.into_iter().for_each(|job| job()),
        }
    }
}

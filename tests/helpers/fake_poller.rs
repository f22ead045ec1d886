use async_trait::async_trait;
use karo_actions::core::{Deadline, ExecutionHandle, ExecutionPoller, ExecutionState, ExecutionStatus};
use karo_actions::error::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a list of execution states, then reports `ACTIVE` forever.
pub struct FakePoller {
    states: Mutex<VecDeque<ExecutionStatus>>,
    polls: AtomicUsize,
}

impl FakePoller {
    pub fn new(states: Vec<ExecutionStatus>) -> Self {
        Self {
            states: Mutex::new(states.into()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn with_states(states: &[ExecutionState]) -> Self {
        Self::new(states.iter().cloned().map(ExecutionStatus::new).collect())
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionPoller for FakePoller {
    async fn poll(&self, _handle: &ExecutionHandle, _deadline: Deadline) -> Result<ExecutionStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.states.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ExecutionStatus::new(ExecutionState::Active)))
    }
}

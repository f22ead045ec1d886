use async_trait::async_trait;
use karo_actions::core::{Deadline, DispatchPayload, Dispatcher, ExecutionHandle};
use karo_actions::error::Result;
use std::sync::Mutex;

/// Records every payload it is asked to deliver.
pub struct RecordingDispatcher {
    handle: Option<ExecutionHandle>,
    pub sent: Mutex<Vec<DispatchPayload>>,
}

impl RecordingDispatcher {
    /// A dispatcher whose deliveries complete on acceptance.
    pub fn accepting() -> Self {
        Self {
            handle: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A dispatcher that reports a started execution.
    pub fn starting(handle: &str) -> Self {
        Self {
            handle: Some(ExecutionHandle::new(handle)),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<DispatchPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    fn destination(&self) -> &str {
        "memory://recording"
    }

    async fn dispatch(
        &self,
        payload: &DispatchPayload,
        _deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(self.handle.clone())
    }
}

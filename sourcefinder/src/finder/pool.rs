//! One bounded worker pool per stage.
//!
//! Tasks are owned values sent to the pool; each result comes back over its
//! own channel. A panic or error inside a task becomes that frame's
//! [`TaskState::Failed`] and never reaches the other frames.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use tracing::{debug, error, info};

use crate::error::{Error, TaskError};
use crate::extraction::{FrameOutput, FrameTask};

pub enum TaskState {
    Completed(Box<FrameOutput>),
    Failed(TaskError),
}

impl TaskState {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskState::Completed(_))
    }
}

/// Dispatched, not yet collected.
pub struct TaskHandle {
    frame: String,
    receiver: mpsc::Receiver<Result<FrameOutput, TaskError>>,
}

impl TaskHandle {
    pub fn frame(&self) -> &str {
        &self.frame
    }
}

pub struct WorkerPool {
    stage: &'static str,
    pool: rayon::ThreadPool,
    dispatched: usize,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl WorkerPool {
    pub fn new(stage: &'static str, processes: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(processes.max(1))
            .thread_name(move |i| format!("{}-worker-{}", stage, i))
            .build()?;
        debug!(stage, processes, "worker pool started");
        Ok(Self {
            stage,
            pool,
            dispatched: 0,
        })
    }

    pub fn dispatch(&mut self, task: FrameTask) -> TaskHandle {
        let frame = task.frame_name().to_string();
        let (sender, receiver) = mpsc::channel();
        self.pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| task.run()))
                .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))));
            // The collector only goes away once the stage is abandoned.
            let _ = sender.send(result);
        });
        self.dispatched += 1;
        TaskHandle { frame, receiver }
    }

    /// Waits for every handle. Results are keyed by frame, so completion order
    /// does not matter.
    pub fn collect(&self, handles: Vec<TaskHandle>) -> BTreeMap<String, TaskState> {
        let mut states = BTreeMap::new();
        for handle in handles {
            let state = match handle.receiver.recv() {
                Ok(Ok(output)) => TaskState::Completed(Box::new(output)),
                Ok(Err(err)) => TaskState::Failed(err),
                Err(_) => TaskState::Failed(TaskError::Disconnected),
            };
            if let TaskState::Failed(err) = &state {
                error!(stage = self.stage, frame = %handle.frame, "task failed: {}", err);
            }
            states.insert(handle.frame, state);
        }
        states
    }

    /// Consumes the pool. Call after every handle has been collected.
    pub fn close(self) {
        info!(stage = self.stage, tasks = self.dispatched, "worker pool closed");
    }
}

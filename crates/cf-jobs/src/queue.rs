//! Job requests and the queue that carries them to workers.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Everything a worker needs to process one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Uploaded image on disk.
    pub image_path: PathBuf,
    /// Directory the STL is written to.
    pub output_dir: PathBuf,
    /// Job identifier and status key.
    pub job_id: String,
}

/// Message delivered to workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Process a job.
    Run(JobRequest),
    /// Stop after the current job.
    Shutdown,
}

/// Producer side of a job queue.
pub trait JobQueue: Send + Sync {
    /// Queue a job for processing.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Enqueue`] if the queue no longer accepts work.
    fn enqueue(&self, request: JobRequest) -> JobResult<()>;
}

/// Receiving half shared by every worker thread.
pub type SharedReceiver = Arc<Mutex<Receiver<WorkerMessage>>>;

/// In-process queue over a std channel.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    sender: Sender<WorkerMessage>,
    receiver: SharedReceiver,
}

impl ChannelQueue {
    /// A new, empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Handle for consumers.
    #[must_use]
    pub fn receiver(&self) -> SharedReceiver {
        Arc::clone(&self.receiver)
    }

    /// Ask one worker to stop.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Enqueue`] if every receiver is gone.
    pub fn send_shutdown(&self) -> JobResult<()> {
        self.sender
            .send(WorkerMessage::Shutdown)
            .map_err(|e| JobError::Enqueue(format!("queue closed: {e}")))
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, request: JobRequest) -> JobResult<()> {
        self.sender
            .send(WorkerMessage::Run(request))
            .map_err(|e| JobError::Enqueue(format!("queue closed: {e}")))
    }
}

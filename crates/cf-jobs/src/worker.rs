//! Worker threads that pull jobs off a [`ChannelQueue`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::controller::JobController;
use crate::error::{JobError, JobResult};
use crate::queue::{ChannelQueue, SharedReceiver, WorkerMessage};

/// A fixed set of threads, each running jobs to completion one at a time.
///
/// Workers share the queue's receiver and the controller (and through it the
/// inference context and status store). Dropping the pool shuts it down.
pub struct WorkerPool {
    queue: ChannelQueue,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads consuming `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] if `workers` is zero or a thread cannot
    /// be started.
    pub fn spawn(
        workers: usize,
        queue: &ChannelQueue,
        controller: Arc<JobController>,
    ) -> JobResult<Self> {
        if workers == 0 {
            return Err(JobError::config("worker pool needs at least one worker"));
        }

        let mut pool = Self {
            queue: queue.clone(),
            handles: Vec::with_capacity(workers),
        };
        for index in 0..workers {
            let receiver = queue.receiver();
            let controller = Arc::clone(&controller);
            let handle = thread::Builder::new()
                .name(format!("photomesh-worker-{index}"))
                .spawn(move || worker_loop(index, &receiver, &controller))
                .map_err(|e| JobError::config(format!("failed to spawn worker: {e}")))?;
            pool.handles.push(handle);
        }
        info!(workers, "Worker pool started");
        Ok(pool)
    }

    /// Number of running workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Let queued jobs finish, then stop every worker and wait for it.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        for _ in 0..self.handles.len() {
            if self.queue.send_shutdown().is_err() {
                break;
            }
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .finish_non_exhaustive()
    }
}

fn worker_loop(index: usize, receiver: &SharedReceiver, controller: &JobController) {
    debug!(worker = index, "Worker waiting for jobs");
    loop {
        // Hold the lock only while receiving so other workers can pick up jobs.
        let message = match receiver.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => {
                error!(worker = index, "Queue lock poisoned");
                break;
            }
        };

        match message {
            Ok(WorkerMessage::Run(request)) => {
                if let Err(e) = controller.run(&request) {
                    warn!(worker = index, job_id = %request.job_id, error = %e, "Job ended in failure");
                }
            }
            Ok(WorkerMessage::Shutdown) | Err(_) => break,
        }
    }
    debug!(worker = index, "Worker exiting");
}

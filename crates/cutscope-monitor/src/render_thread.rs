//! Background workers for GPU-bound setup and teardown.
//!
//! Each worker owns one thread and a FIFO task queue, so tasks submitted to
//! the same worker run in submission order. Tasks receive a [`RenderContext`]
//! giving them the texture backend; the UI thread never touches it for setup
//! work and never blocks on a task unless it chooses to wait on its handle.

use crate::error::{MonitorError, MonitorResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use cutscope_gpu::TextureBackend;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a render task sees while it runs.
pub struct RenderContext {
    worker: usize,
    backend: Arc<dyn TextureBackend>,
}

impl RenderContext {
    /// Index of the worker running the task.
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn backend(&self) -> &dyn TextureBackend {
        self.backend.as_ref()
    }
}

type Task = Box<dyn FnOnce(&RenderContext) + Send + 'static>;

enum WorkerMessage {
    Run(Task),
    Shutdown,
}

/// Result of a submitted task.
pub struct TaskHandle<R> {
    worker: String,
    rx: Receiver<thread::Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task finished, at most `timeout`.
    pub fn wait(self, timeout: Duration) -> MonitorResult<R> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(MonitorError::WorkerPanicked(self.worker)),
            Err(RecvTimeoutError::Timeout) => Err(MonitorError::TaskTimeout {
                worker: self.worker,
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(MonitorError::TaskCancelled),
        }
    }

    /// The result, if the task has already finished.
    pub fn try_take(&self) -> Option<MonitorResult<R>> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(_)) => Some(Err(MonitorError::WorkerPanicked(self.worker.clone()))),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => Some(Err(MonitorError::TaskCancelled)),
        }
    }
}

struct Worker {
    name: String,
    tx: Sender<WorkerMessage>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

/// A fixed set of render workers.
pub struct RenderThreadPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
    shutdown_timeout: Duration,
}

impl RenderThreadPool {
    pub fn new(
        workers: usize,
        backend: Arc<dyn TextureBackend>,
        shutdown_timeout: Duration,
    ) -> MonitorResult<Self> {
        if workers == 0 {
            return Err(MonitorError::Config("render pool needs at least one worker".into()));
        }
        let mut pool = Self {
            workers: Vec::with_capacity(workers),
            next: AtomicUsize::new(0),
            shutdown_timeout,
        };
        for index in 0..workers {
            pool.workers.push(spawn_worker(index, Arc::clone(&backend))?);
        }
        info!(workers, "Render thread pool started");
        Ok(pool)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Run `task` on the next worker in round-robin order.
    pub fn run_on_render_thread<R, F>(&self, task: F) -> MonitorResult<TaskHandle<R>>
    where
        F: FnOnce(&RenderContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len().max(1);
        self.run_on_worker(index, task)
    }

    /// Run `task` on a specific worker, after everything already queued there.
    pub fn run_on_worker<R, F>(&self, index: usize, task: F) -> MonitorResult<TaskHandle<R>>
    where
        F: FnOnce(&RenderContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let worker = self
            .workers
            .get(index)
            .ok_or_else(|| MonitorError::Protocol(format!("no render worker {index}")))?;
        if worker.thread.is_none() {
            return Err(MonitorError::TaskCancelled);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Task = Box::new(move |ctx| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(ctx)));
            let _ = tx.send(result);
        });
        worker
            .tx
            .send(WorkerMessage::Run(job))
            .map_err(|_| MonitorError::TaskCancelled)?;
        Ok(TaskHandle {
            worker: worker.name.clone(),
            rx,
        })
    }

    /// Stop every worker after its queued tasks, waiting at most the
    /// shutdown timeout for each.
    ///
    /// A worker that does not stop in time is reported as
    /// [`MonitorError::ShutdownTimeout`]; its thread is left detached.
    pub fn shutdown(&mut self) -> MonitorResult<()> {
        let mut first_error = None;
        for worker in &self.workers {
            let _ = worker.tx.send(WorkerMessage::Shutdown);
        }
        for worker in &mut self.workers {
            let Some(thread) = worker.thread.take() else {
                continue;
            };
            let result = match worker.done.recv_timeout(self.shutdown_timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    let timeout_ms = self.shutdown_timeout.as_millis() as u64;
                    error!(worker = %worker.name, timeout_ms, "Render worker did not stop in time");
                    Err(MonitorError::ShutdownTimeout {
                        worker: worker.name.clone(),
                        timeout_ms,
                    })
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => thread
                    .join()
                    .map_err(|_| MonitorError::WorkerPanicked(worker.name.clone())),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Render thread pool stopped");
                Ok(())
            }
        }
    }
}

impl Drop for RenderThreadPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Render thread pool shutdown failed: {e}");
        }
    }
}

fn spawn_worker(index: usize, backend: Arc<dyn TextureBackend>) -> MonitorResult<Worker> {
    let name = format!("cutscope-render-{index}");
    let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
    let (done_tx, done) = crossbeam_channel::bounded::<()>(1);
    let thread = thread::Builder::new().name(name.clone()).spawn(move || {
        let _done = done_tx;
        let ctx = RenderContext {
            worker: index,
            backend,
        };
        debug!(worker = index, "Render worker started");
        while let Ok(message) = rx.recv() {
            match message {
                WorkerMessage::Run(task) => task(&ctx),
                WorkerMessage::Shutdown => break,
            }
        }
        if !rx.is_empty() {
            warn!(worker = index, pending = rx.len(), "Render worker dropped queued tasks");
        }
        debug!(worker = index, "Render worker exiting");
    })?;
    Ok(Worker {
        name,
        tx,
        done,
        thread: Some(thread),
    })
}

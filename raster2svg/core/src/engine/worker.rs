//! Background tracing worker.
//!
//! One worker thread runs jobs one at a time. Callers are multiplexed over it
//! through a job table keyed by id: a router thread reads the worker's
//! messages and forwards each to the channel registered for its job. Jobs
//! that time out are dropped from the table; whatever the worker later sends
//! for them is discarded.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::EngineConfig;
use crate::error::{panic_message, ConvertError, Result};
use crate::planner::TraceOptions;
use crate::raster::NormalizedRaster;
use crate::trace::TraceBackend;

pub type JobId = u64;

enum Request {
    Trace {
        id: JobId,
        raster: Arc<NormalizedRaster>,
        options: TraceOptions,
    },
    Shutdown,
}

enum Message {
    Ready,
    Progress { id: JobId, value: f64 },
    Complete { id: JobId, svg: String },
    Error { id: JobId, message: String },
}

enum JobEvent {
    Progress(f64),
    Complete(String),
    Error(String),
}

type JobTable = Arc<Mutex<HashMap<JobId, Sender<JobEvent>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WorkerHandle {
    requests: Sender<Request>,
    jobs: JobTable,
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    fn fail_pending(&self, reason: &str) {
        fail_all(&self.jobs, reason);
    }
}

fn fail_all(jobs: &JobTable, reason: &str) {
    for (_, job) in lock(jobs).drain() {
        let _ = job.send(JobEvent::Error(reason.to_string()));
    }
}

/// Owns the worker thread and the job table.
///
/// The worker is spawned on first use. Spawning happens under a lock, so
/// concurrent first callers share one worker.
pub struct WorkerManager {
    backend: Arc<dyn TraceBackend>,
    config: EngineConfig,
    next_id: AtomicU64,
    spawned: AtomicU64,
    handle: Mutex<Option<Arc<WorkerHandle>>>,
}

impl WorkerManager {
    pub fn new(backend: Arc<dyn TraceBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            next_id: AtomicU64::new(1),
            spawned: AtomicU64::new(0),
            handle: Mutex::new(None),
        }
    }

    /// Trace on the worker, forwarding its progress (0-1) to `progress`.
    ///
    /// Blocks until the job completes, fails, or exceeds the job timeout.
    pub fn run(
        &self,
        raster: Arc<NormalizedRaster>,
        options: TraceOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<String> {
        let handle = self.ensure_worker()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = channel::unbounded();
        lock(&handle.jobs).insert(id, events_tx);

        if handle
            .requests
            .send(Request::Trace {
                id,
                raster,
                options,
            })
            .is_err()
        {
            lock(&handle.jobs).remove(&id);
            handle.alive.store(false, Ordering::SeqCst);
            return Err(ConvertError::WorkerUnavailable(
                "worker stopped accepting jobs".into(),
            ));
        }

        self.await_job(&handle, id, &events_rx, progress)
    }

    fn await_job(
        &self,
        handle: &WorkerHandle,
        id: JobId,
        events: &Receiver<JobEvent>,
        progress: &mut dyn FnMut(f64),
    ) -> Result<String> {
        let deadline = Instant::now() + self.config.job_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(JobEvent::Progress(value)) => progress(value),
                Ok(JobEvent::Complete(svg)) => return Ok(svg),
                Ok(JobEvent::Error(message)) => return Err(ConvertError::Trace(message)),
                Err(RecvTimeoutError::Timeout) => {
                    lock(&handle.jobs).remove(&id);
                    return Err(ConvertError::TraceTimeout {
                        secs: self.config.job_timeout.as_secs(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ConvertError::WorkerUnavailable(format!(
                        "job {id} was dropped by the worker"
                    )));
                }
            }
        }
    }

    /// Number of workers started so far, respawns included.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Stop the worker and fail every pending job. The next [`run`](Self::run)
    /// spawns a fresh worker.
    pub fn terminate(&self) {
        if let Some(handle) = lock(&self.handle).take() {
            handle.alive.store(false, Ordering::SeqCst);
            let _ = handle.requests.send(Request::Shutdown);
            handle.fail_pending("worker terminated");
            log::debug!("tracing worker terminated");
        }
    }

    fn ensure_worker(&self) -> Result<Arc<WorkerHandle>> {
        let mut slot = lock(&self.handle);
        if let Some(handle) = slot.as_ref() {
            if handle.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(handle));
            }
        }
        let handle = Arc::new(self.spawn()?);
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn spawn(&self) -> Result<WorkerHandle> {
        let (requests_tx, requests_rx) = channel::unbounded();
        let (messages_tx, messages_rx) = channel::unbounded();
        let backend = Arc::clone(&self.backend);

        thread::Builder::new()
            .name("raster2svg-worker".into())
            .spawn(move || worker_loop(backend.as_ref(), &requests_rx, &messages_tx))
            .map_err(|e| ConvertError::WorkerUnavailable(format!("failed to spawn worker: {e}")))?;

        match messages_rx.recv_timeout(self.config.worker_init_timeout) {
            Ok(Message::Ready) => {}
            Ok(_) => {
                return Err(ConvertError::WorkerUnavailable(
                    "worker sent a job message before ready".into(),
                ))
            }
            Err(_) => {
                let _ = requests_tx.send(Request::Shutdown);
                return Err(ConvertError::WorkerUnavailable(format!(
                    "worker initialization timeout after {}s",
                    self.config.worker_init_timeout.as_secs()
                )));
            }
        }

        let jobs: JobTable = Arc::default();
        let alive = Arc::new(AtomicBool::new(true));
        {
            let jobs = Arc::clone(&jobs);
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name("raster2svg-router".into())
                .spawn(move || route(&messages_rx, &jobs, &alive))
                .map_err(|e| {
                    ConvertError::WorkerUnavailable(format!("failed to spawn router: {e}"))
                })?;
        }
        let generation = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("tracing worker #{generation} ready");

        Ok(WorkerHandle {
            requests: requests_tx,
            jobs,
            alive,
        })
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(backend: &dyn TraceBackend, requests: &Receiver<Request>, messages: &Sender<Message>) {
    if messages.send(Message::Ready).is_err() {
        return;
    }
    for request in requests {
        let (id, raster, options) = match request {
            Request::Trace {
                id,
                raster,
                options,
            } => (id, raster, options),
            Request::Shutdown => break,
        };

        let mut report = |value: f64| {
            let _ = messages.send(Message::Progress { id, value });
        };
        let outcome = run_guarded(backend, &raster, &options, &mut report);
        let message = match outcome {
            Ok(svg) => Message::Complete { id, svg },
            Err(e) => Message::Error {
                id,
                message: e.to_string(),
            },
        };
        if messages.send(message).is_err() {
            break;
        }
    }
}

/// Run the backend, turning a panic into a trace error.
pub(crate) fn run_guarded(
    backend: &dyn TraceBackend,
    raster: &NormalizedRaster,
    options: &TraceOptions,
    progress: &mut dyn FnMut(f64),
) -> Result<String> {
    panic::catch_unwind(AssertUnwindSafe(|| backend.trace(raster, options, progress))).unwrap_or_else(
        |payload| {
            Err(ConvertError::Trace(format!(
                "tracer panicked: {}",
                panic_message(payload.as_ref())
            )))
        },
    )
}

fn route(messages: &Receiver<Message>, jobs: &JobTable, alive: &AtomicBool) {
    for message in messages {
        let (id, event, terminal) = match message {
            Message::Ready => continue,
            Message::Progress { id, value } => (id, JobEvent::Progress(value), false),
            Message::Complete { id, svg } => (id, JobEvent::Complete(svg), true),
            Message::Error { id, message } => (id, JobEvent::Error(message), true),
        };

        let mut table = lock(jobs);
        let target = if terminal {
            table.remove(&id)
        } else {
            table.get(&id).cloned()
        };
        drop(table);

        match target {
            Some(job) => {
                let _ = job.send(event);
            }
            None if terminal => log::warn!("ignoring late result for job {id}"),
            None => {}
        }
    }
    alive.store(false, Ordering::SeqCst);
    fail_all(jobs, "worker exited");
}

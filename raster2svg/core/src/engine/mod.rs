//! Tracing execution: worker first, same-thread fallback.

pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::planner::TraceOptions;
use crate::raster::NormalizedRaster;
use crate::trace::TraceBackend;

pub use self::worker::WorkerManager;

/// Overall progress at which worker-reported progress starts.
const WORKER_PROGRESS_START: f64 = 0.3;
/// Share of overall progress covered by the worker's own progress.
const WORKER_PROGRESS_SPAN: f64 = 0.6;
/// Emitted right before a same-thread trace.
const FALLBACK_PROGRESS: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Offload tracing to a background worker. Off on wasm32, where threads
    /// are unavailable.
    pub use_worker: bool,
    pub job_timeout: Duration,
    pub worker_init_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_worker: !cfg!(target_arch = "wasm32"),
            job_timeout: Duration::from_secs(120),
            worker_init_timeout: Duration::from_secs(10),
        }
    }
}

/// Forwards progress to an optional callback.
///
/// Values are clamped to [0, 1] and anything below the last emitted value is
/// dropped, so callers always observe a non-decreasing sequence.
pub struct ProgressReporter<'a> {
    sink: Option<&'a mut dyn FnMut(f64)>,
    last: Option<f64>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a mut dyn FnMut(f64)>) -> Self {
        Self { sink, last: None }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn report(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        if self.last.is_some_and(|last| value <= last) {
            return;
        }
        self.last = Some(value);
        if let Some(sink) = self.sink.as_mut() {
            sink(value);
        }
    }

    /// Highest value reported so far.
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

pub struct TracingEngine {
    backend: Arc<dyn TraceBackend>,
    worker: Option<WorkerManager>,
}

impl TracingEngine {
    pub fn new(backend: Arc<dyn TraceBackend>, config: EngineConfig) -> Self {
        let worker = config
            .use_worker
            .then(|| WorkerManager::new(Arc::clone(&backend), config));
        Self { backend, worker }
    }

    /// Trace `raster` into SVG markup.
    ///
    /// Worker failures of any kind are logged and the trace is retried on the
    /// calling thread; only a same-thread failure is returned.
    pub fn trace(
        &self,
        raster: Arc<NormalizedRaster>,
        options: &TraceOptions,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<String> {
        if let Some(worker) = &self.worker {
            let mut forward = |p: f64| {
                progress.report(WORKER_PROGRESS_START + WORKER_PROGRESS_SPAN * p.clamp(0.0, 1.0));
            };
            match worker.run(Arc::clone(&raster), options.clone(), &mut forward) {
                Ok(svg) => {
                    progress.report(1.0);
                    return Ok(svg);
                }
                Err(e) => log::warn!(
                    "worker trace failed ({}), falling back to same-thread tracing: {e}",
                    e.code()
                ),
            }
        }

        progress.report(FALLBACK_PROGRESS);
        let svg = worker::run_guarded(self.backend.as_ref(), &raster, options, &mut |_| {})?;
        progress.report(1.0);
        Ok(svg)
    }

    pub fn worker(&self) -> Option<&WorkerManager> {
        self.worker.as_ref()
    }

    /// Stop the background worker, if any. The next trace respawns it.
    pub fn terminate(&self) {
        if let Some(worker) = &self.worker {
            worker.terminate();
        }
    }
}

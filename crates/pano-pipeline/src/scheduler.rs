//! Runs job plans one after another on a worker pool.
//!
//! The public operations only build a plan and queue it. A dispatcher
//! thread takes plans off the queue in order and executes each in waves:
//! every task whose predecessors succeeded runs on the rayon pool, and the
//! next wave starts once the whole wave is done. Progress is reported as
//! [`PanoEvent`]s on a crossbeam channel; events come from pool threads.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use pano_pto::{PtoDocument, Rect};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::action::{ActionData, PanoEvent};
use crate::config::PanoConfig;
use crate::plan::{self, JobPlan, OptimiseOutputs, PreprocessOutputs, ReadyTask, StitchOutputs};
use crate::process::{AbortFlag, ProcessRunner};
use crate::tasks::{PreprocessedMap, TaskContext};

/// Prefix of the temporary work directories.
pub const WORK_DIR_PREFIX: &str = "pano-tmp-";

/// Errors returned when queueing work.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Only preprocessing creates a work directory.
    #[error("no work directory: preprocess the input files first")]
    NoWorkDirectory,

    #[error("cannot create work directory: {0}")]
    WorkDirectory(#[source] std::io::Error),

    #[error("cannot resolve input {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start dispatcher thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

// --- Shared state ---

struct Queued {
    plan: JobPlan,
    /// Kept alive until the plan is done, even if a newer preprocessing
    /// replaced it.
    work_dir: Arc<TempDir>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Queued>,
    running: bool,
    /// Flag handed to the next plan; replaced on every cancel.
    abort: AbortFlag,
    shutdown: bool,
}

enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when work is queued or on shutdown.
    wake: Condvar,
    /// Signalled when the dispatcher becomes idle.
    idle: Condvar,
    events: Sender<PanoEvent>,
    runner: Arc<dyn ProcessRunner>,
    pool: rayon::ThreadPool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn dispatch(&self) {
        loop {
            let (queued, abort) = {
                let mut state = lock(&self.state);
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(queued) = state.pending.pop_front() {
                        state.running = true;
                        break (queued, state.abort.clone());
                    }
                    state = self
                        .wake
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            let name = queued.plan.name();
            debug!(plan = name, "plan started");
            let outcome = self.execute(queued, &abort);

            let mut state = lock(&self.state);
            match outcome {
                Outcome::Completed => info!(plan = name, "plan completed"),
                Outcome::Failed => {
                    warn!(
                        plan = name,
                        dropped = state.pending.len(),
                        "plan failed, dropping queued work"
                    );
                    state.pending.clear();
                }
                Outcome::Cancelled => info!(plan = name, "plan cancelled"),
            }
            state.running = false;
            drop(state);
            self.idle.notify_all();
        }
    }

    fn execute(&self, queued: Queued, abort: &AbortFlag) -> Outcome {
        let Queued { mut plan, work_dir } = queued;
        let ctx = TaskContext {
            work_dir: work_dir.path(),
            runner: self.runner.as_ref(),
            abort,
        };
        let mut succeeded = HashSet::new();

        loop {
            if abort.is_requested() {
                return Outcome::Cancelled;
            }
            let wave = plan.take_ready(&succeeded);
            if wave.is_empty() {
                return Outcome::Completed;
            }

            let results: Vec<(NodeIndex, bool)> = self.pool.install(|| {
                wave.into_par_iter()
                    .map(|ready| self.run_task(ready, ctx))
                    .collect()
            });

            let mut failed = false;
            for (node, success) in results {
                if success {
                    succeeded.insert(node);
                } else {
                    failed = true;
                }
            }
            if abort.is_requested() {
                return Outcome::Cancelled;
            }
            if failed {
                return Outcome::Failed;
            }
        }
    }

    fn run_task(&self, ready: ReadyTask, ctx: TaskContext<'_>) -> (NodeIndex, bool) {
        let ReadyTask {
            node,
            mut task,
            last,
        } = ready;
        // Cancelled before it got a thread.
        if ctx.abort.is_requested() {
            return (node, false);
        }

        let action = task.action();
        let id = task.id();
        let data = |success: bool, message: String| ActionData {
            action,
            id,
            success,
            message,
        };

        debug!(?action, ?id, "{}", action.describe());
        self.emit(PanoEvent::Starting(data(true, String::new())));

        let result = task.run(&ctx);
        let success = result.is_ok();
        let finished = match result {
            Ok(()) => data(true, String::new()),
            Err(error) => {
                warn!(?action, ?id, %error, "task failed");
                data(false, error.to_string())
            }
        };
        self.emit(if last {
            PanoEvent::JobCollectionFinished(finished)
        } else {
            PanoEvent::StepFinished(finished)
        });
        (node, success)
    }

    fn emit(&self, event: PanoEvent) {
        // The scheduler holds a receiver, so the channel never disconnects.
        let _ = self.events.send(event);
    }
}

// --- Scheduler ---

/// Queues job plans and executes them on a worker pool.
///
/// Dropping the scheduler cancels pending work and joins the dispatcher.
pub struct PanoScheduler {
    shared: Arc<Shared>,
    receiver: Receiver<PanoEvent>,
    work_dir: Mutex<Option<Arc<TempDir>>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl PanoScheduler {
    /// Start a scheduler with one worker per available CPU.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the pool or the dispatcher thread
    /// cannot be started.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Result<Self, SchedulerError> {
        let threads = thread::available_parallelism().map_or(1, |count| count.get().max(1));
        Self::with_threads(runner, threads)
    }

    /// Start a scheduler with a fixed number of workers.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the pool or the dispatcher thread
    /// cannot be started.
    pub fn with_threads(
        runner: Arc<dyn ProcessRunner>,
        threads: usize,
    ) -> Result<Self, SchedulerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("pano-worker-{index}"))
            .build()?;
        let (events, receiver) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
            events,
            runner,
            pool,
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("pano-dispatcher".into())
                .spawn(move || shared.dispatch())
                .map_err(SchedulerError::Thread)?
        };
        debug!(threads, "scheduler started");

        Ok(Self {
            shared,
            receiver,
            work_dir: Mutex::new(None),
            dispatcher: Some(dispatcher),
        })
    }

    /// Receiver of progress events.
    ///
    /// Clones share one queue: each event is delivered to only one of
    /// them.
    #[must_use]
    pub fn events(&self) -> Receiver<PanoEvent> {
        self.receiver.clone()
    }

    /// The current work directory, if preprocessing was requested.
    #[must_use]
    pub fn work_dir(&self) -> Option<PathBuf> {
        lock(&self.work_dir)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    /// Queue preprocessing of `inputs` in a fresh work directory.
    ///
    /// Relative inputs are resolved against the current directory here,
    /// since the tools run inside the work directory.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Input`] if an input path cannot be made
    /// absolute and [`SchedulerError::WorkDirectory`] if the directory
    /// cannot be created.
    pub fn preprocess_files(
        &self,
        config: &PanoConfig,
        inputs: &[PathBuf],
    ) -> Result<PreprocessOutputs, SchedulerError> {
        let inputs = inputs
            .iter()
            .map(|input| {
                std::path::absolute(input).map_err(|source| SchedulerError::Input {
                    path: input.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir()
            .map_err(SchedulerError::WorkDirectory)?;
        let work_dir = Arc::new(work_dir);
        info!(work_dir = %work_dir.path().display(), inputs = inputs.len(), "preprocessing");

        let (plan, outputs) = plan::preprocess(config, work_dir.path(), &inputs);
        *lock(&self.work_dir) = Some(Arc::clone(&work_dir));
        self.enqueue(plan, work_dir);
        Ok(outputs)
    }

    /// Queue optimisation and automatic cropping of the cleaned project.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkDirectory`] before preprocessing.
    pub fn optimize_project(
        &self,
        config: &PanoConfig,
        cp_clean_pto: &Path,
    ) -> Result<OptimiseOutputs, SchedulerError> {
        let work_dir = self.current_work_dir()?;
        let (plan, outputs) = plan::optimise(config, work_dir.path(), cp_clean_pto);
        self.enqueue(plan, work_dir);
        Ok(outputs)
    }

    /// Queue stitching of a small preview of `document`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkDirectory`] before preprocessing.
    pub fn generate_panorama_preview(
        &self,
        config: &PanoConfig,
        document: PtoDocument,
        preprocessed: PreprocessedMap,
    ) -> Result<StitchOutputs, SchedulerError> {
        let work_dir = self.current_work_dir()?;
        let (plan, outputs) = plan::preview(config, work_dir.path(), document, preprocessed);
        self.enqueue(plan, work_dir);
        Ok(outputs)
    }

    /// Queue stitching of the full panorama, cropped to `crop` if given.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkDirectory`] before preprocessing.
    pub fn compile_project(
        &self,
        config: &PanoConfig,
        document: PtoDocument,
        crop: Option<Rect>,
    ) -> Result<StitchOutputs, SchedulerError> {
        let work_dir = self.current_work_dir()?;
        let (plan, outputs) = plan::compile(config, work_dir.path(), document, crop);
        self.enqueue(plan, work_dir);
        Ok(outputs)
    }

    /// Queue copying the stitched panorama to `final_panorama`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkDirectory`] before preprocessing.
    pub fn copy_files(
        &self,
        config: &PanoConfig,
        stitched: &StitchOutputs,
        final_panorama: PathBuf,
        preprocessed: PreprocessedMap,
    ) -> Result<(), SchedulerError> {
        let work_dir = self.current_work_dir()?;
        let plan = plan::copy(config, stitched, final_panorama, preprocessed);
        self.enqueue(plan, work_dir);
        Ok(())
    }

    /// Queue an arbitrary plan in the current work directory.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkDirectory`] before preprocessing.
    pub fn submit(&self, plan: JobPlan) -> Result<(), SchedulerError> {
        let work_dir = self.current_work_dir()?;
        self.enqueue(plan, work_dir);
        Ok(())
    }

    /// Drop queued plans and abort the running one.
    ///
    /// Running tools are killed; tasks not yet started never start.
    /// Events of tasks already running may still arrive until
    /// [`finish`](Self::finish) returns.
    pub fn cancel(&self) {
        let mut state = lock(&self.shared.state);
        let dropped = state.pending.len();
        state.pending.clear();
        state.abort.request();
        state.abort = AbortFlag::new();
        info!(dropped, "cancel requested");
    }

    /// Block until the queue is empty and nothing runs.
    pub fn finish(&self) {
        let mut state = lock(&self.shared.state);
        while state.running || !state.pending.is_empty() {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether the queue is empty and nothing runs.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.shared.state);
        !state.running && state.pending.is_empty()
    }

    fn current_work_dir(&self) -> Result<Arc<TempDir>, SchedulerError> {
        lock(&self.work_dir)
            .as_ref()
            .map(Arc::clone)
            .ok_or(SchedulerError::NoWorkDirectory)
    }

    fn enqueue(&self, plan: JobPlan, work_dir: Arc<TempDir>) {
        debug!(plan = plan.name(), tasks = plan.len(), "plan queued");
        lock(&self.shared.state)
            .pending
            .push_back(Queued { plan, work_dir });
        self.shared.wake.notify_one();
    }
}

impl Drop for PanoScheduler {
    fn drop(&mut self) {
        self.cancel();
        lock(&self.shared.state).shutdown = true;
        self.shared.wake.notify_all();
        if let Some(dispatcher) = self.dispatcher.take()
            && dispatcher.join().is_err()
        {
            warn!("dispatcher thread panicked");
        }
    }
}

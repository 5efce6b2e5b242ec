//! One panorama from inputs to result.
//!
//! [`PanoManager`] owns a [`PanoScheduler`] and remembers what each stage
//! produced, so callers only say which stage comes next. Stages are
//! queued, not run: call [`PanoManager::wait`] before a stage that reads
//! the output of the previous one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use pano_pto::{PtoDocument, PtoError, Rect};
use tracing::{debug, info};

use crate::action::{ActionData, PanoEvent};
use crate::config::PanoConfig;
use crate::plan::{OptimiseOutputs, PreprocessOutputs, StitchOutputs};
use crate::process::ProcessRunner;
use crate::scheduler::{PanoScheduler, SchedulerError};

/// How often [`PanoManager::wait`] checks for idleness between events.
const WAIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Pto(#[from] PtoError),

    /// A stage was requested before the one it builds on.
    #[error("{0} has not been run")]
    MissingStage(&'static str),

    /// A task reported failure.
    #[error("{} failed{}: {}", .0.action.describe(), describe_id(.0.id), .0.message)]
    Failed(ActionData),
}

fn describe_id(id: Option<usize>) -> String {
    id.map(|id| format!(" for image {id}")).unwrap_or_default()
}

/// Drives the stages of one panorama through a [`PanoScheduler`].
pub struct PanoManager {
    scheduler: PanoScheduler,
    events: Receiver<PanoEvent>,
    config: PanoConfig,
    inputs: Vec<PathBuf>,
    preprocessed: Option<PreprocessOutputs>,
    optimised: Option<OptimiseOutputs>,
    preview: Option<StitchOutputs>,
    panorama: Option<StitchOutputs>,
}

impl PanoManager {
    /// Resolve the Hugin version through `runner` and start a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Scheduler`] if the scheduler cannot start.
    pub fn new(mut config: PanoConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self, ManagerError> {
        config.resolve(runner.as_ref());
        info!(
            hugin_version = config.hugin_version(),
            hugin_executor = config.use_hugin_executor(),
            "pipeline configured"
        );
        let scheduler = PanoScheduler::new(runner)?;
        Ok(Self {
            events: scheduler.events(),
            scheduler,
            config,
            inputs: Vec::new(),
            preprocessed: None,
            optimised: None,
            preview: None,
            panorama: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PanoConfig {
        &self.config
    }

    #[must_use]
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    #[must_use]
    pub const fn scheduler(&self) -> &PanoScheduler {
        &self.scheduler
    }

    /// Queue preprocessing of a new set of inputs, forgetting every
    /// earlier stage.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Scheduler`] if an input cannot be resolved
    /// or no work directory can be created.
    pub fn preprocess(&mut self, inputs: &[PathBuf]) -> Result<&PreprocessOutputs, ManagerError> {
        let outputs = self.scheduler.preprocess_files(&self.config, inputs)?;
        self.inputs.clone_from(&outputs.inputs);
        self.optimised = None;
        self.preview = None;
        self.panorama = None;
        Ok(self.preprocessed.insert(outputs))
    }

    /// Queue optimisation of the cleaned project.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MissingStage`] before [`preprocess`](Self::preprocess).
    pub fn optimise(&mut self) -> Result<&OptimiseOutputs, ManagerError> {
        let cp_clean_pto = &self.preprocessed()?.cp_clean_pto;
        let outputs = self.scheduler.optimize_project(&self.config, cp_clean_pto)?;
        Ok(self.optimised.insert(outputs))
    }

    /// Queue the preview of the optimised project. Reads the project, so
    /// optimisation must have finished.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MissingStage`] before [`optimise`](Self::optimise)
    /// and [`ManagerError::Pto`] if its project cannot be read.
    pub fn preview(&mut self) -> Result<&StitchOutputs, ManagerError> {
        let document = self.view_crop_document()?;
        let preprocessed = self.preprocessed()?.preprocessed.clone();
        let outputs =
            self.scheduler
                .generate_panorama_preview(&self.config, document, preprocessed)?;
        Ok(self.preview.insert(outputs))
    }

    /// Queue stitching of the full panorama. Reads the optimised project,
    /// so optimisation must have finished.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MissingStage`] before [`optimise`](Self::optimise)
    /// and [`ManagerError::Pto`] if its project cannot be read.
    pub fn compile(&mut self, crop: Option<Rect>) -> Result<&StitchOutputs, ManagerError> {
        let document = self.view_crop_document()?;
        let outputs = self.scheduler.compile_project(&self.config, document, crop)?;
        Ok(self.panorama.insert(outputs))
    }

    /// Queue copying the stitched panorama to `final_panorama`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MissingStage`] before [`compile`](Self::compile).
    pub fn copy_files(&self, final_panorama: PathBuf) -> Result<(), ManagerError> {
        let stitched = self.panorama.as_ref().ok_or(ManagerError::MissingStage("compile"))?;
        let preprocessed = self.preprocessed()?.preprocessed.clone();
        self.scheduler
            .copy_files(&self.config, stitched, final_panorama, preprocessed)?;
        Ok(())
    }

    /// Drop queued stages and abort the running one.
    pub fn cancel(&self) {
        self.scheduler.cancel();
    }

    /// Block until all queued stages are done, handing every event to
    /// `observe` as it arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Failed`] with the first failure reported.
    pub fn wait(&self, mut observe: impl FnMut(&PanoEvent)) -> Result<(), ManagerError> {
        let mut failure = None;
        let mut handle = |event: PanoEvent| {
            observe(&event);
            if failure.is_none() && event.is_failure() {
                failure = Some(event.data().clone());
            }
        };

        loop {
            match self.events.recv_timeout(WAIT_POLL) {
                Ok(event) => handle(event),
                Err(RecvTimeoutError::Timeout) if self.scheduler.is_idle() => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.scheduler.finish();
        for event in self.events.try_iter() {
            handle(event);
        }

        failure.map_or(Ok(()), |data| Err(ManagerError::Failed(data)))
    }

    /// The project after control point cleaning.
    ///
    /// # Errors
    ///
    /// [`ManagerError::MissingStage`] before preprocessing;
    /// [`ManagerError::Pto`] if the file cannot be read.
    pub fn cp_clean_document(&self) -> Result<PtoDocument, ManagerError> {
        let path = &self.preprocessed()?.cp_clean_pto;
        debug!(pto = %path.display(), "loading project");
        Ok(PtoDocument::open_file(path, self.config.hugin_version())?)
    }

    /// The optimised and cropped project.
    ///
    /// # Errors
    ///
    /// [`ManagerError::MissingStage`] before optimisation;
    /// [`ManagerError::Pto`] if the file cannot be read.
    pub fn view_crop_document(&self) -> Result<PtoDocument, ManagerError> {
        let path = &self
            .optimised
            .as_ref()
            .ok_or(ManagerError::MissingStage("optimise"))?
            .view_crop_pto;
        debug!(pto = %path.display(), "loading project");
        Ok(PtoDocument::open_file(path, self.config.hugin_version())?)
    }

    /// Where the preview lands once its stage has run.
    #[must_use]
    pub fn preview_file(&self) -> Option<&PathBuf> {
        self.preview.as_ref().map(|outputs| &outputs.panorama)
    }

    fn preprocessed(&self) -> Result<&PreprocessOutputs, ManagerError> {
        self.preprocessed
            .as_ref()
            .ok_or(ManagerError::MissingStage("preprocess"))
    }
}

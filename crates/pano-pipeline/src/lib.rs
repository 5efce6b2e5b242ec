//! pano-pipeline: builds a panorama by driving the Hugin command line
//! tools.
//!
//! A panorama goes through five stages, each queued as one [`JobPlan`]:
//!
//! 1. preprocess: convert RAW inputs, write previews, create the base
//!    project, find and clean control points;
//! 2. optimise: `autooptimiser` then `pano_modify` for the crop;
//! 3. preview: stitch a small JPEG from the previews;
//! 4. compile: stitch the full panorama;
//! 5. copy: move the result (and optionally the project) out of the
//!    temporary work directory.
//!
//! [`PanoScheduler`] executes plans on a worker pool and reports
//! [`PanoEvent`]s; [`PanoManager`] chains the stages for one panorama.

pub mod action;
pub mod config;
pub mod manager;
pub mod plan;
pub mod process;
pub mod scheduler;
pub mod tasks;

pub use action::{ActionData, PanoAction, PanoEvent, PanoramaFileType};
pub use config::{BinaryPaths, PanoConfig, PanoOptions};
pub use manager::{ManagerError, PanoManager};
pub use plan::{JobPlan, JobPlanBuilder, OptimiseOutputs, PreprocessOutputs, StitchOutputs};
pub use process::{AbortFlag, Invocation, ProcessOutput, ProcessRunner, SystemRunner};
pub use scheduler::{PanoScheduler, SchedulerError};
pub use tasks::{PanoTask, PreprocessedMap, PreprocessedUrls, TaskContext, TaskError};

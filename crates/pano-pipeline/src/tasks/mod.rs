//! The units of work a job plan is made of.
//!
//! Every task owns its inputs and the paths it will produce, so tasks
//! running in parallel never share mutable state. A task either runs an
//! external tool through the [`ProcessRunner`] of its [`TaskContext`] or
//! manipulates PTO documents in process.

mod control_points;
mod copy_files;
mod create_pto;
mod final_pto;
mod optimise;
mod preprocess;
mod preview;
mod stitch;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::action::PanoAction;
use crate::process::{AbortFlag, Invocation, ProcessRunner};

pub use control_points::{CpCleanTask, CpFindTask};
pub use copy_files::CopyFilesTask;
pub use create_pto::CreatePtoTask;
pub use final_pto::CreateFinalPtoTask;
pub use optimise::{AutoCropTask, OptimisationTask};
pub use preprocess::{PreProcessTask, PreprocessedMap, PreprocessedUrls, is_raw};
pub use preview::CreatePreviewTask;
pub use stitch::{
    CompileMkStepTask, CompileMkTask, CreateMkTask, HuginExecutorTask, MakeTools, Stitching,
    remapped_target,
};

/// Everything a task may use besides its own fields.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    /// Temporary directory of the current panorama; external tools run here.
    pub work_dir: &'a Path,
    pub runner: &'a dyn ProcessRunner,
    pub abort: &'a AbortFlag,
}

impl TaskContext<'_> {
    /// Fail with [`TaskError::Cancelled`] once an abort was requested.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cancelled`] if the abort flag is raised.
    pub fn check_abort(&self) -> Result<(), TaskError> {
        if self.abort.is_requested() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// An invocation of `program` in the work directory.
    #[must_use]
    pub fn command(&self, program: &Path) -> Invocation {
        Invocation::new(program, self.work_dir)
    }

    /// Run an external tool and require a zero exit status.
    ///
    /// Returns the tool's combined output.
    ///
    /// # Errors
    ///
    /// [`TaskError::Spawn`] if it cannot start, [`TaskError::Cancelled`]
    /// if it was stopped by an abort, [`TaskError::Process`] on a non-zero
    /// exit.
    pub fn run(&self, invocation: &Invocation) -> Result<String, TaskError> {
        self.check_abort()?;
        debug!(
            program = %invocation.program.display(),
            args = ?invocation.args_lossy(),
            "running"
        );

        let output = self
            .runner
            .run(invocation, self.abort)
            .map_err(|source| TaskError::Spawn {
                program: invocation.program_name(),
                source,
            })?;

        if output.aborted {
            return Err(TaskError::Cancelled);
        }
        if !output.success() {
            return Err(TaskError::Process {
                program: invocation.program_name(),
                exit_code: output.exit_code,
                output: output.output,
            });
        }
        Ok(output.output)
    }
}

/// Errors a task can fail with. The [`Display`](std::fmt::Display) text
/// becomes the message of the failure event.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// An external tool exited unsuccessfully.
    #[error("cannot run {program}: {}\n{output}", describe_exit(*exit_code))]
    Process {
        program: String,
        exit_code: Option<i32>,
        /// Combined standard output and error of the tool.
        output: String,
    },

    /// An external tool could not be started.
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The task was aborted.
    #[error("canceled")]
    Cancelled,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pto(#[from] pano_pto::PtoError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The inputs of the task are inconsistent.
    #[error("{0}")]
    Invalid(String),
}

impl TaskError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || "terminated by a signal".to_owned(),
        |code| format!("exit code {code}"),
    )
}

/// One node of a job plan.
pub trait PanoTask: Send {
    /// What this task reports in its events.
    fn action(&self) -> PanoAction;

    /// Image index for per-image tasks.
    fn id(&self) -> Option<usize> {
        None
    }

    /// Do the work.
    ///
    /// # Errors
    ///
    /// Any [`TaskError`]; the scheduler turns it into a failure event.
    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError>;
}

/// Resolve a file name from a project against the work directory.
pub(crate) fn resolve(work_dir: &Path, file_name: &str) -> PathBuf {
    let path = Path::new(file_name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

/// Text form of a path as stored in a project file.
pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;
    use crate::process::ProcessOutput;

    #[test]
    fn successful_command_returns_output() {
        let runner = Recorder::scripted(|_| ProcessOutput::exited(0, "done"));
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: Path::new("/tmp"),
            runner: &runner,
            abort: &abort,
        };
        let output = ctx.run(&ctx.command(Path::new("cpfind")).arg("-h")).unwrap();
        assert_eq!(output, "done");
        assert_eq!(runner.args(), [["-h"]]);
    }

    #[test]
    fn failing_command_carries_output() {
        let runner = Recorder::scripted(|_| ProcessOutput::exited(2, "no images"));
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: Path::new("/tmp"),
            runner: &runner,
            abort: &abort,
        };
        let error = ctx.run(&ctx.command(Path::new("/usr/bin/cpfind"))).unwrap_err();
        assert_eq!(error.to_string(), "cannot run cpfind: exit code 2\nno images");
    }

    #[test]
    fn aborted_context_does_not_run() {
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        abort.request();
        let ctx = TaskContext {
            work_dir: Path::new("/tmp"),
            runner: &runner,
            abort: &abort,
        };
        let error = ctx.run(&ctx.command(Path::new("cpfind"))).unwrap_err();
        assert!(matches!(error, TaskError::Cancelled));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn resolve_relative_names() {
        let work_dir = Path::new("/work");
        assert_eq!(resolve(work_dir, "a.jpg"), PathBuf::from("/work/a.jpg"));
        assert_eq!(resolve(work_dir, "/abs/a.jpg"), PathBuf::from("/abs/a.jpg"));
    }
}

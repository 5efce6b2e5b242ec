use std::path::PathBuf;

use tracing::info;

use super::{PanoTask, TaskContext, TaskError};
use crate::action::PanoAction;

/// Detect control points between overlapping images with `cpfind`.
pub struct CpFindTask {
    input: PathBuf,
    output: PathBuf,
    celeste: bool,
    binary: PathBuf,
}

impl CpFindTask {
    #[must_use]
    pub const fn new(input: PathBuf, output: PathBuf, celeste: bool, binary: PathBuf) -> Self {
        Self {
            input,
            output,
            celeste,
            binary,
        }
    }
}

impl PanoTask for CpFindTask {
    fn action(&self) -> PanoAction {
        PanoAction::Cpfind
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let mut invocation = ctx.command(&self.binary);
        if self.celeste {
            invocation = invocation.arg("--celeste");
        }
        let invocation = invocation.arg("-o").arg(&self.output).arg(&self.input);
        ctx.run(&invocation)?;
        info!(output = %self.output.display(), "control points found");
        Ok(())
    }
}

/// Drop statistically unlikely control points with `cpclean`.
pub struct CpCleanTask {
    input: PathBuf,
    output: PathBuf,
    binary: PathBuf,
}

impl CpCleanTask {
    #[must_use]
    pub const fn new(input: PathBuf, output: PathBuf, binary: PathBuf) -> Self {
        Self {
            input,
            output,
            binary,
        }
    }
}

impl PanoTask for CpCleanTask {
    fn action(&self) -> PanoAction {
        PanoAction::Cpclean
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let invocation = ctx
            .command(&self.binary)
            .arg("-o")
            .arg(&self.output)
            .arg(&self.input);
        ctx.run(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::process::AbortFlag;
    use crate::tasks::testing::Recorder;

    #[test]
    fn cpfind_arguments() {
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: Path::new("/work"),
            runner: &runner,
            abort: &abort,
        };

        CpFindTask::new("in.pto".into(), "out.pto".into(), false, "cpfind".into())
            .run(&ctx)
            .unwrap();
        CpFindTask::new("in.pto".into(), "out.pto".into(), true, "cpfind".into())
            .run(&ctx)
            .unwrap();

        assert_eq!(
            runner.args(),
            [
                vec!["-o", "out.pto", "in.pto"],
                vec!["--celeste", "-o", "out.pto", "in.pto"],
            ]
        );
        assert_eq!(
            runner.calls.lock().unwrap()[0].working_dir,
            PathBuf::from("/work")
        );
    }

    #[test]
    fn cpclean_arguments() {
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: Path::new("/work"),
            runner: &runner,
            abort: &abort,
        };
        let mut task = CpCleanTask::new("cp.pto".into(), "clean.pto".into(), "cpclean".into());
        assert_eq!(task.action(), PanoAction::Cpclean);
        task.run(&ctx).unwrap();
        assert_eq!(runner.args(), [["-o", "clean.pto", "cp.pto"]]);
        assert_eq!(runner.programs(), ["cpclean"]);
    }
}

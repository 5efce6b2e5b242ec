use std::path::PathBuf;

use super::{PanoTask, TaskContext, TaskError};
use crate::action::PanoAction;

/// Fit image positions, lens and photometric parameters with `autooptimiser`.
pub struct OptimisationTask {
    input: PathBuf,
    output: PathBuf,
    level_horizon: bool,
    gpano: bool,
    binary: PathBuf,
}

impl OptimisationTask {
    #[must_use]
    pub const fn new(
        input: PathBuf,
        output: PathBuf,
        level_horizon: bool,
        gpano: bool,
        binary: PathBuf,
    ) -> Self {
        Self {
            input,
            output,
            level_horizon,
            gpano,
            binary,
        }
    }
}

impl PanoTask for OptimisationTask {
    fn action(&self) -> PanoAction {
        PanoAction::Optimize
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        // -a: positions and lens, -m: photometric.
        let mut invocation = ctx.command(&self.binary).arg("-a").arg("-m");
        if self.level_horizon {
            invocation = invocation.arg("-l");
        }
        // A photo sphere keeps the full canvas chosen when the project was created.
        if !self.gpano {
            invocation = invocation.arg("-s");
        }
        let invocation = invocation.arg("-o").arg(&self.output).arg(&self.input);
        ctx.run(&invocation)?;
        Ok(())
    }
}

/// Fit the canvas and crop to the optimised images with `pano_modify`.
pub struct AutoCropTask {
    input: PathBuf,
    output: PathBuf,
    gpano: bool,
    binary: PathBuf,
}

impl AutoCropTask {
    #[must_use]
    pub const fn new(input: PathBuf, output: PathBuf, gpano: bool, binary: PathBuf) -> Self {
        Self {
            input,
            output,
            gpano,
            binary,
        }
    }
}

impl PanoTask for AutoCropTask {
    fn action(&self) -> PanoAction {
        PanoAction::Autocrop
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let invocation = ctx.command(&self.binary);
        let invocation = if self.gpano {
            invocation
                .arg("--projection=2")
                .arg("--fov=360x180")
                .arg("-c")
                .arg("--canvas=AUTO")
        } else {
            invocation
                .arg("-c")
                .arg("-s")
                .arg("--canvas=AUTO")
                .arg("--crop=AUTO")
        };
        let invocation = invocation.arg("-o").arg(&self.output).arg(&self.input);
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

    fn args_of(task: &mut dyn PanoTask) -> Vec<String> {
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: Path::new("/work"),
            runner: &runner,
            abort: &abort,
        };
        task.run(&ctx).unwrap();
        runner.args().remove(0)
    }

    #[test]
    fn autooptimiser_arguments() {
        let mut plain = OptimisationTask::new(
            "clean.pto".into(),
            "op.pto".into(),
            false,
            false,
            "autooptimiser".into(),
        );
        assert_eq!(args_of(&mut plain), ["-a", "-m", "-s", "-o", "op.pto", "clean.pto"]);

        let mut levelled_sphere = OptimisationTask::new(
            "clean.pto".into(),
            "op.pto".into(),
            true,
            true,
            "autooptimiser".into(),
        );
        assert_eq!(
            args_of(&mut levelled_sphere),
            ["-a", "-m", "-l", "-o", "op.pto", "clean.pto"]
        );
    }

    #[test]
    fn pano_modify_arguments() {
        let mut crop = AutoCropTask::new("op.pto".into(), "crop.pto".into(), false, "pano_modify".into());
        assert_eq!(
            args_of(&mut crop),
            ["-c", "-s", "--canvas=AUTO", "--crop=AUTO", "-o", "crop.pto", "op.pto"]
        );

        let mut sphere = AutoCropTask::new("op.pto".into(), "crop.pto".into(), true, "pano_modify".into());
        assert_eq!(
            args_of(&mut sphere),
            ["--projection=2", "--fov=360x180", "-c", "--canvas=AUTO", "-o", "crop.pto", "op.pto"]
        );
    }
}

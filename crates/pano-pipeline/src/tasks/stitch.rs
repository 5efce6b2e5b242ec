//! Remapping and blending.
//!
//! Hugin 2015 and later stitch a project in one `hugin_executor` call.
//! Older releases go through a makefile written by `pto2mk`: one `make`
//! target per remapped image (run in parallel), then the default target
//! blends them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{PanoTask, TaskContext, TaskError};
use crate::action::PanoAction;

/// Which panorama a stitching task works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stitching {
    Preview,
    Final,
}

impl Stitching {
    const fn pick(self, preview: PanoAction, final_action: PanoAction) -> PanoAction {
        match self {
            Self::Preview => preview,
            Self::Final => final_action,
        }
    }
}

/// Tools a `pto2mk` makefile calls, passed to `make` as variable overrides.
#[derive(Debug, Clone)]
pub struct MakeTools {
    pub make: PathBuf,
    pub nona: PathBuf,
    pub enblend: PathBuf,
}

impl MakeTools {
    fn overrides(&self) -> [OsString; 2] {
        // The makefile hands these to a shell, hence the quoting.
        [
            format!("ENBLEND='{}'", self.enblend.display()).into(),
            format!("NONA='{}'", self.nona.display()).into(),
        ]
    }
}

/// The prefix as handed to `pto2mk`: make runs in the work directory, so
/// the makefile names its targets relative to it.
fn makefile_prefix(prefix: &Path) -> String {
    prefix
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name of the remapped image `id` that `pto2mk` targets for `prefix`.
#[must_use]
pub fn remapped_target(prefix: &Path, id: usize) -> String {
    format!("{}{id:04}.tif", makefile_prefix(prefix))
}

/// Write the stitching makefile with `pto2mk`.
pub struct CreateMkTask {
    pto: PathBuf,
    mk: PathBuf,
    prefix: PathBuf,
    binary: PathBuf,
    stitching: Stitching,
}

impl CreateMkTask {
    #[must_use]
    pub const fn new(
        pto: PathBuf,
        mk: PathBuf,
        prefix: PathBuf,
        binary: PathBuf,
        stitching: Stitching,
    ) -> Self {
        Self {
            pto,
            mk,
            prefix,
            binary,
            stitching,
        }
    }
}

impl PanoTask for CreateMkTask {
    fn action(&self) -> PanoAction {
        self.stitching
            .pick(PanoAction::CreateMkPreview, PanoAction::CreateMk)
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let invocation = ctx
            .command(&self.binary)
            .arg("-o")
            .arg(&self.mk)
            .arg("-p")
            .arg(makefile_prefix(&self.prefix))
            .arg(&self.pto);
        ctx.run(&invocation)?;
        Ok(())
    }
}

/// Remap one image through its makefile target.
pub struct CompileMkStepTask {
    id: usize,
    mk: PathBuf,
    prefix: PathBuf,
    tools: MakeTools,
    stitching: Stitching,
}

impl CompileMkStepTask {
    #[must_use]
    pub const fn new(
        id: usize,
        mk: PathBuf,
        prefix: PathBuf,
        tools: MakeTools,
        stitching: Stitching,
    ) -> Self {
        Self {
            id,
            mk,
            prefix,
            tools,
            stitching,
        }
    }
}

impl PanoTask for CompileMkStepTask {
    fn action(&self) -> PanoAction {
        self.stitching
            .pick(PanoAction::NonaFilePreview, PanoAction::NonaFile)
    }

    fn id(&self) -> Option<usize> {
        Some(self.id)
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let [enblend, nona] = self.tools.overrides();
        let invocation = ctx
            .command(&self.tools.make)
            .arg("-f")
            .arg(&self.mk)
            .arg(remapped_target(&self.prefix, self.id))
            .arg(enblend)
            .arg(nona);
        ctx.run(&invocation)?;
        Ok(())
    }
}

/// Blend the remapped images with the makefile's default target.
pub struct CompileMkTask {
    mk: PathBuf,
    tools: MakeTools,
    stitching: Stitching,
}

impl CompileMkTask {
    #[must_use]
    pub const fn new(mk: PathBuf, tools: MakeTools, stitching: Stitching) -> Self {
        Self {
            mk,
            tools,
            stitching,
        }
    }
}

impl PanoTask for CompileMkTask {
    fn action(&self) -> PanoAction {
        self.stitching
            .pick(PanoAction::StitchPreview, PanoAction::Stitch)
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let [enblend, nona] = self.tools.overrides();
        let invocation = ctx
            .command(&self.tools.make)
            .arg("-f")
            .arg(&self.mk)
            .arg(enblend)
            .arg(nona);
        ctx.run(&invocation)?;
        Ok(())
    }
}

/// Stitch a project in one go with `hugin_executor`.
pub struct HuginExecutorTask {
    pto: PathBuf,
    prefix: PathBuf,
    binary: PathBuf,
    stitching: Stitching,
}

impl HuginExecutorTask {
    #[must_use]
    pub const fn new(pto: PathBuf, prefix: PathBuf, binary: PathBuf, stitching: Stitching) -> Self {
        Self {
            pto,
            prefix,
            binary,
            stitching,
        }
    }
}

impl PanoTask for HuginExecutorTask {
    fn action(&self) -> PanoAction {
        self.stitching
            .pick(PanoAction::HuginExecutorPreview, PanoAction::HuginExecutor)
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let mut prefix = OsString::from("--prefix=");
        prefix.push(&self.prefix);
        let invocation = ctx
            .command(&self.binary)
            .arg("--stitching")
            .arg(prefix)
            .arg(&self.pto);
        ctx.run(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::AbortFlag;
    use crate::tasks::testing::Recorder;

    fn tools() -> MakeTools {
        MakeTools {
            make: "make".into(),
            nona: "/usr/bin/nona".into(),
            enblend: "/usr/bin/enblend".into(),
        }
    }

    fn run(task: &mut dyn PanoTask) -> Vec<String> {
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
    fn remapped_target_names() {
        assert_eq!(remapped_target(Path::new("/work/preview"), 3), "preview0003.tif");
        assert_eq!(remapped_target(Path::new("panorama"), 12), "panorama0012.tif");
    }

    #[test]
    fn makefile_creation() {
        let mut task = CreateMkTask::new(
            "/work/preview.pto".into(),
            "/work/preview.mk".into(),
            "/work/preview".into(),
            "pto2mk".into(),
            Stitching::Preview,
        );
        assert_eq!(task.action(), PanoAction::CreateMkPreview);
        assert_eq!(
            run(&mut task),
            ["-o", "/work/preview.mk", "-p", "preview", "/work/preview.pto"]
        );
    }

    #[test]
    fn makefile_targets_match_the_remap_steps() {
        let prefix = PathBuf::from("/work/panorama");
        let mut create = CreateMkTask::new(
            "/work/panorama.pto".into(),
            "/work/panorama.mk".into(),
            prefix.clone(),
            "pto2mk".into(),
            Stitching::Final,
        );
        let args = run(&mut create);
        let written_prefix = &args[args.iter().position(|arg| arg == "-p").unwrap() + 1];

        for id in 0..3 {
            let mut step = CompileMkStepTask::new(
                id,
                "/work/panorama.mk".into(),
                prefix.clone(),
                tools(),
                Stitching::Final,
            );
            assert_eq!(run(&mut step)[2], format!("{written_prefix}{id:04}.tif"));
        }
    }

    #[test]
    fn per_image_make_target() {
        let mut task = CompileMkStepTask::new(
            2,
            "/work/panorama.mk".into(),
            "/work/panorama".into(),
            tools(),
            Stitching::Final,
        );
        assert_eq!(task.action(), PanoAction::NonaFile);
        assert_eq!(task.id(), Some(2));
        assert_eq!(
            run(&mut task),
            [
                "-f",
                "/work/panorama.mk",
                "panorama0002.tif",
                "ENBLEND='/usr/bin/enblend'",
                "NONA='/usr/bin/nona'",
            ]
        );
    }

    #[test]
    fn blend_target() {
        let mut task = CompileMkTask::new("/work/preview.mk".into(), tools(), Stitching::Preview);
        assert_eq!(task.action(), PanoAction::StitchPreview);
        assert_eq!(
            run(&mut task),
            [
                "-f",
                "/work/preview.mk",
                "ENBLEND='/usr/bin/enblend'",
                "NONA='/usr/bin/nona'",
            ]
        );
    }

    #[test]
    fn hugin_executor_arguments() {
        let mut task = HuginExecutorTask::new(
            "/work/panorama.pto".into(),
            "/work/panorama".into(),
            "hugin_executor".into(),
            Stitching::Final,
        );
        assert_eq!(task.action(), PanoAction::HuginExecutor);
        assert_eq!(
            run(&mut task),
            ["--stitching", "--prefix=/work/panorama", "/work/panorama.pto"]
        );
    }
}

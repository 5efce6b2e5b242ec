use std::path::PathBuf;

use pano_pto::{PtoDocument, Rect};

use super::{PanoTask, TaskContext, TaskError};
use crate::action::PanoAction;

/// Write the project that gets stitched at full size, with the user's crop.
pub struct CreateFinalPtoTask {
    document: PtoDocument,
    output: PathBuf,
    crop: Option<Rect>,
}

impl CreateFinalPtoTask {
    #[must_use]
    pub const fn new(document: PtoDocument, output: PathBuf, crop: Option<Rect>) -> Self {
        Self {
            document,
            output,
            crop,
        }
    }
}

impl PanoTask for CreateFinalPtoTask {
    fn action(&self) -> PanoAction {
        PanoAction::CreateFinalPto
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        ctx.check_abort()?;
        if let Some(crop) = self.crop.filter(|crop| !crop.is_empty()) {
            self.document.project.crop = crop;
        }
        self.document.create_file(&self.output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pano_pto::{Size, Version};

    use super::*;
    use crate::process::AbortFlag;
    use crate::tasks::testing::Recorder;

    fn run(crop: Option<Rect>) -> PtoDocument {
        let dir = tempfile::tempdir().unwrap();
        let mut document = PtoDocument::new(Version::V2014);
        document.project.size = Size::new(1000, 500);
        document.project.crop = Rect::new(5, 995, 5, 495);

        let output = dir.path().join("panorama.pto");
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        CreateFinalPtoTask::new(document, output.clone(), crop)
            .run(&ctx)
            .unwrap();
        PtoDocument::open_file(&output, "2019.0").unwrap()
    }

    #[test]
    fn user_crop_replaces_automatic_crop() {
        let written = run(Some(Rect::new(100, 900, 50, 450)));
        assert_eq!(written.project.crop, Rect::new(100, 900, 50, 450));
    }

    #[test]
    fn empty_crop_keeps_automatic_crop() {
        assert_eq!(run(Some(Rect::default())).project.crop, Rect::new(5, 995, 5, 495));
        assert_eq!(run(None).project.crop, Rect::new(5, 995, 5, 495));
    }
}

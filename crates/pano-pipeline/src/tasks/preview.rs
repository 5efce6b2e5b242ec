use std::path::PathBuf;

use pano_pto::{BitDepth, FileFormat, FileType, PtoDocument, Rect, Size};
use tracing::info;

use super::{PanoTask, PreprocessedMap, TaskContext, TaskError, path_text, resolve};
use crate::action::PanoAction;

/// Canvas width of the preview panorama.
pub const PREVIEW_WIDTH: u32 = 800;

/// Derive a quick-to-stitch project from the optimised one: previews
/// instead of full images, a small canvas, nothing left to optimise.
pub struct CreatePreviewTask {
    document: PtoDocument,
    output: PathBuf,
    preprocessed: PreprocessedMap,
}

impl CreatePreviewTask {
    #[must_use]
    pub const fn new(document: PtoDocument, output: PathBuf, preprocessed: PreprocessedMap) -> Self {
        Self {
            document,
            output,
            preprocessed,
        }
    }

    fn preview_document(&self, ctx: &TaskContext<'_>) -> Result<PtoDocument, TaskError> {
        let mut document = self.document.clone();
        document.control_points.clear();

        for image in &mut document.images {
            ctx.check_abort()?;
            image.optimisation_parameters.clear();

            let path = resolve(ctx.work_dir, &image.file_name);
            let urls = self
                .preprocessed
                .values()
                .find(|urls| urls.preprocessed == path)
                .ok_or_else(|| {
                    TaskError::Invalid(format!(
                        "unknown input file in the project: {}",
                        image.file_name
                    ))
                })?;

            let (width, height) = image::image_dimensions(&urls.preview)?;
            if image.size.width > 0 {
                image.crop = scale_rect(
                    image.crop,
                    f64::from(width) / f64::from(image.size.width),
                );
            }
            image.size = Size::new(width, height);
            image.file_name = path_text(&urls.preview);
        }

        let project = &mut document.project;
        if project.size.width > PREVIEW_WIDTH {
            let factor = f64::from(PREVIEW_WIDTH) / f64::from(project.size.width);
            project.size = Size::new(PREVIEW_WIDTH, scale(project.size.height, factor));
            project.crop = scale_rect(project.crop, factor);
        }
        project.file_format = FileFormat {
            file_type: FileType::Jpeg,
            quality: 90,
            ..FileFormat::default()
        };
        project.hdr = false;
        project.bit_depth = BitDepth::Uint8;

        Ok(document)
    }
}

impl PanoTask for CreatePreviewTask {
    fn action(&self) -> PanoAction {
        PanoAction::CreatePreviewPto
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let document = self.preview_document(ctx)?;
        document.create_file(&self.output)?;
        info!(pto = %self.output.display(), "preview project written");
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(length: u32, factor: f64) -> u32 {
    (f64::from(length) * factor).round().max(1.0) as u32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale_rect(rect: Rect, factor: f64) -> Rect {
    let edge = |value: i64| (value as f64 * factor).round() as i64;
    Rect::new(
        edge(rect.left),
        edge(rect.right),
        edge(rect.top),
        edge(rect.bottom),
    )
}

#[cfg(test)]
mod tests {
    use pano_pto::{ControlPoint, Image, OptimisationParameter, Version};

    use super::*;
    use crate::process::AbortFlag;
    use crate::tasks::PreprocessedUrls;
    use crate::tasks::testing::{Recorder, write_image};

    #[test]
    fn preview_uses_small_images_and_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let mut preprocessed = PreprocessedMap::new();
        let mut document = PtoDocument::new(Version::V2014);
        document.project.size = Size::new(4000, 1000);
        document.project.crop = Rect::new(100, 3900, 50, 950);
        document.project.hdr = true;

        for id in 0..2 {
            let input = dir.path().join(format!("{id}.png"));
            let urls = PreprocessedUrls::plan(dir.path(), id, &input);
            write_image(&urls.preview, 320, 240);
            let mut image = Image::new(path_text(&input), Size::new(1600, 1200));
            image.crop = Rect::new(0, 1600, 0, 1200);
            image.optimise(OptimisationParameter::LensYaw);
            document.images.push(image);
            preprocessed.insert(input, urls);
        }
        document.control_points.push(ControlPoint::default());

        let output = dir.path().join("preview.pto");
        let mut task = CreatePreviewTask::new(document, output.clone(), preprocessed);
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        task.run(&ctx).unwrap();

        let preview = PtoDocument::open_file(&output, "2019.0").unwrap();
        assert_eq!(preview.project.size, Size::new(800, 200));
        assert_eq!(preview.project.crop, Rect::new(20, 780, 10, 190));
        assert_eq!(preview.project.file_format.file_type, FileType::Jpeg);
        assert!(!preview.project.hdr);
        assert!(preview.control_points.is_empty());
        for image in &preview.images {
            assert_eq!(image.size, Size::new(320, 240));
            assert_eq!(image.crop, Rect::new(0, 320, 0, 240));
            assert!(image.file_name.ends_with("-preview.jpg"));
            assert!(image.optimisation_parameters.is_empty());
        }
    }

    #[test]
    fn unknown_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut document = PtoDocument::new(Version::V2014);
        document
            .images
            .push(Image::new("/elsewhere/x.jpg", Size::new(10, 10)));

        let mut task =
            CreatePreviewTask::new(document, dir.path().join("preview.pto"), PreprocessedMap::new());
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        let error = task.run(&ctx).unwrap_err();
        assert!(error.to_string().contains("unknown input file"));
        assert!(!dir.path().join("preview.pto").exists());
    }
}

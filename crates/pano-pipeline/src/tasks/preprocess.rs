use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{PanoTask, TaskContext, TaskError};
use crate::action::PanoAction;

/// Longest side of the JPEG previews shown while building the panorama.
pub const PREVIEW_SIZE: u32 = 1280;

const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "cr3", "crw", "dcr", "dng", "erf", "iiq", "k25", "kdc", "mef", "mos",
    "mrw", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];

/// Whether the file extension names a camera RAW format.
#[must_use]
pub fn is_raw(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            RAW_EXTENSIONS
                .iter()
                .any(|raw| raw.eq_ignore_ascii_case(extension))
        })
}

/// Where the preprocessing of one input lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedUrls {
    /// The image the project refers to: the input itself, or its TIFF
    /// conversion for RAW files.
    pub preprocessed: PathBuf,
    /// Downscaled JPEG used for the preview project.
    pub preview: PathBuf,
}

impl PreprocessedUrls {
    /// Planned outputs for input number `id` inside `work_dir`.
    #[must_use]
    pub fn plan(work_dir: &Path, id: usize, input: &Path) -> Self {
        let stem = input
            .file_stem()
            .map_or_else(|| "image".into(), |stem| stem.to_string_lossy());
        let preprocessed = if is_raw(input) {
            work_dir.join(format!("{id:03}-{stem}.tif"))
        } else {
            input.to_path_buf()
        };
        Self {
            preprocessed,
            preview: work_dir.join(format!("{id:03}-{stem}-preview.jpg")),
        }
    }
}

/// Preprocessing results keyed by input path.
pub type PreprocessedMap = BTreeMap<PathBuf, PreprocessedUrls>;

/// Convert RAW input to TIFF and write a preview of one image.
pub struct PreProcessTask {
    id: usize,
    input: PathBuf,
    urls: PreprocessedUrls,
    raw_converter: PathBuf,
}

impl PreProcessTask {
    #[must_use]
    pub const fn new(
        id: usize,
        input: PathBuf,
        urls: PreprocessedUrls,
        raw_converter: PathBuf,
    ) -> Self {
        Self {
            id,
            input,
            urls,
            raw_converter,
        }
    }

    fn convert_raw(&self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let invocation = ctx
            .command(&self.raw_converter)
            .arg("-T")
            .arg("-Z")
            .arg(&self.urls.preprocessed)
            .arg(&self.input);
        ctx.run(&invocation)?;
        if !self.urls.preprocessed.exists() {
            return Err(TaskError::Invalid(format!(
                "{} produced no {}",
                invocation.program_name(),
                self.urls.preprocessed.display()
            )));
        }
        Ok(())
    }
}

impl PanoTask for PreProcessTask {
    fn action(&self) -> PanoAction {
        PanoAction::PreprocessInput
    }

    fn id(&self) -> Option<usize> {
        Some(self.id)
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        if is_raw(&self.input) {
            self.convert_raw(ctx)?;
        }
        ctx.check_abort()?;

        write_preview(&self.urls.preprocessed, &self.urls.preview)?;
        info!(input = %self.input.display(), id = self.id, "preprocessed");
        Ok(())
    }
}

fn write_preview(source: &Path, preview: &Path) -> Result<(), TaskError> {
    let image = image::open(source)?;
    let image = if image.width() > PREVIEW_SIZE || image.height() > PREVIEW_SIZE {
        image.resize(PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Triangle)
    } else {
        image
    };
    image
        .to_rgb8()
        .save_with_format(preview, ImageFormat::Jpeg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{AbortFlag, ProcessOutput};
    use crate::tasks::testing::{Recorder, write_image};

    #[test]
    fn raw_detection() {
        assert!(is_raw(Path::new("/photos/IMG_0001.CR2")));
        assert!(is_raw(Path::new("a.dng")));
        assert!(!is_raw(Path::new("a.jpg")));
        assert!(!is_raw(Path::new("noextension")));
    }

    #[test]
    fn planned_paths() {
        let work_dir = Path::new("/tmp/pano");
        let jpeg = PreprocessedUrls::plan(work_dir, 0, Path::new("/photos/a.jpg"));
        assert_eq!(jpeg.preprocessed, PathBuf::from("/photos/a.jpg"));
        assert_eq!(jpeg.preview, PathBuf::from("/tmp/pano/000-a-preview.jpg"));

        let raw = PreprocessedUrls::plan(work_dir, 12, Path::new("/photos/b.nef"));
        assert_eq!(raw.preprocessed, PathBuf::from("/tmp/pano/012-b.tif"));
        assert_eq!(raw.preview, PathBuf::from("/tmp/pano/012-b-preview.jpg"));
    }

    #[test]
    fn large_input_gets_small_preview() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("wide.png");
        write_image(&input, 2560, 640);
        let urls = PreprocessedUrls::plan(dir.path(), 0, &input);

        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        let mut task = PreProcessTask::new(0, input, urls.clone(), "dcraw_emu".into());
        task.run(&ctx).unwrap();

        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(image::image_dimensions(&urls.preview).unwrap(), (1280, 320));
    }

    #[test]
    fn raw_input_is_converted_first() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shot.nef");
        std::fs::write(&input, b"raw").unwrap();
        let urls = PreprocessedUrls::plan(dir.path(), 1, &input);

        let converted = urls.preprocessed.clone();
        let runner = Recorder::scripted(move |_| {
            write_image(&converted, 40, 30);
            ProcessOutput::exited(0, "")
        });
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        let mut task = PreProcessTask::new(1, input.clone(), urls.clone(), "dcraw_emu".into());
        task.run(&ctx).unwrap();

        let args = runner.args();
        assert_eq!(
            args[0],
            [
                "-T".to_owned(),
                "-Z".to_owned(),
                urls.preprocessed.display().to_string(),
                input.display().to_string(),
            ]
        );
        assert_eq!(image::image_dimensions(&urls.preview).unwrap(), (40, 30));
    }

    #[test]
    fn failed_conversion_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shot.dng");
        let urls = PreprocessedUrls::plan(dir.path(), 0, &input);
        let runner = Recorder::scripted(|_| ProcessOutput::exited(1, "unsupported camera"));
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: dir.path(),
            runner: &runner,
            abort: &abort,
        };
        let mut task = PreProcessTask::new(0, input, urls, "dcraw_emu".into());
        let error = task.run(&ctx).unwrap_err();
        assert!(error.to_string().contains("unsupported camera"));
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use pano_pto::PtoDocument;
use tracing::info;

use super::{PanoTask, PreprocessedMap, TaskContext, TaskError, is_raw, path_text, resolve};
use crate::action::PanoAction;

/// Move the stitched panorama out of the work directory.
///
/// With `save_pto`, the project is kept next to it as `<name>.pto`,
/// pointing at the original inputs. Converted RAW files are copied along
/// under their work directory name, which is unique per input, since the
/// project cannot refer to the RAW files themselves. Nothing is written
/// if any of these files already exists.
pub struct CopyFilesTask {
    panorama: PathBuf,
    final_panorama: PathBuf,
    pto: PathBuf,
    preprocessed: PreprocessedMap,
    save_pto: bool,
    hugin_version: String,
}

impl CopyFilesTask {
    #[must_use]
    pub const fn new(
        panorama: PathBuf,
        final_panorama: PathBuf,
        pto: PathBuf,
        preprocessed: PreprocessedMap,
        save_pto: bool,
        hugin_version: String,
    ) -> Self {
        Self {
            panorama,
            final_panorama,
            pto,
            preprocessed,
            save_pto,
            hugin_version,
        }
    }

    /// Where the project is saved when `save_pto` is set.
    #[must_use]
    pub fn final_pto(&self) -> PathBuf {
        self.final_panorama.with_extension("pto")
    }

    fn destination(&self) -> PathBuf {
        self.final_panorama
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Where the converted file of a RAW input is kept.
    fn kept_file(destination: &Path, preprocessed: &Path) -> PathBuf {
        preprocessed
            .file_name()
            .map_or_else(|| destination.to_path_buf(), |name| destination.join(name))
    }

    /// Every file this task would create.
    fn targets(&self) -> Vec<PathBuf> {
        let mut targets = vec![self.final_panorama.clone()];
        if self.save_pto {
            targets.push(self.final_pto());
            let destination = self.destination();
            targets.extend(
                self.preprocessed
                    .iter()
                    .filter(|(input, _)| is_raw(input))
                    .map(|(_, urls)| Self::kept_file(&destination, &urls.preprocessed)),
            );
        }
        targets
    }

    fn save_project(&self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let destination = self.destination();
        let final_pto = self.final_pto();
        let mut document = PtoDocument::open_file(&self.pto, &self.hugin_version)?;

        for image in &mut document.images {
            ctx.check_abort()?;
            let path = resolve(ctx.work_dir, &image.file_name);
            let (input, urls) = self
                .preprocessed
                .iter()
                .find(|(_, urls)| urls.preprocessed == path)
                .ok_or_else(|| {
                    TaskError::Invalid(format!(
                        "unknown input file in the project: {}",
                        image.file_name
                    ))
                })?;

            if is_raw(input) {
                let kept = Self::kept_file(&destination, &urls.preprocessed);
                fs::copy(&urls.preprocessed, &kept)
                    .map_err(|source| TaskError::io(&kept, source))?;
                image.file_name = path_text(&kept);
            } else {
                image.file_name = path_text(input);
            }
        }

        document.create_file(&final_pto)?;
        info!(pto = %final_pto.display(), "project saved");
        Ok(())
    }
}

impl PanoTask for CopyFilesTask {
    fn action(&self) -> PanoAction {
        PanoAction::Copy
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        if !self.panorama.exists() {
            return Err(TaskError::Invalid(format!(
                "temporary panorama {} does not exist",
                self.panorama.display()
            )));
        }
        if let Some(existing) = self.targets().into_iter().find(|target| target.exists()) {
            return Err(TaskError::Invalid(format!(
                "a file named {} already exists",
                existing.display()
            )));
        }
        ctx.check_abort()?;

        fs::copy(&self.panorama, &self.final_panorama)
            .map_err(|source| TaskError::io(&self.final_panorama, source))?;
        info!(panorama = %self.final_panorama.display(), "panorama copied");

        if self.save_pto {
            ctx.check_abort()?;
            self.save_project(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pano_pto::{Image, Size, Version};

    use super::*;
    use crate::process::AbortFlag;
    use crate::tasks::PreprocessedUrls;
    use crate::tasks::testing::Recorder;

    struct Fixture {
        work: tempfile::TempDir,
        out: tempfile::TempDir,
        preprocessed: PreprocessedMap,
        jpeg: PathBuf,
        raw: PathBuf,
    }

    fn fixture() -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let jpeg = out.path().join("a.jpg");
        let raw = out.path().join("b.nef");

        let mut preprocessed = PreprocessedMap::new();
        let mut document = PtoDocument::new(Version::V2014);
        for (id, input) in [&jpeg, &raw].into_iter().enumerate() {
            let urls = PreprocessedUrls::plan(work.path(), id, input);
            fs::write(&urls.preprocessed, b"pixels").unwrap();
            document
                .images
                .push(Image::new(path_text(&urls.preprocessed), Size::new(8, 8)));
            preprocessed.insert(input.clone(), urls);
        }
        document.create_file(work.path().join("panorama.pto")).unwrap();
        fs::write(work.path().join("panorama.jpg"), b"stitched").unwrap();

        Fixture {
            work,
            out,
            preprocessed,
            jpeg,
            raw,
        }
    }

    fn task(fixture: &Fixture, save_pto: bool) -> CopyFilesTask {
        CopyFilesTask::new(
            fixture.work.path().join("panorama.jpg"),
            fixture.out.path().join("result.jpg"),
            fixture.work.path().join("panorama.pto"),
            fixture.preprocessed.clone(),
            save_pto,
            "2019.2.0".to_owned(),
        )
    }

    fn run(fixture: &Fixture, task: &mut CopyFilesTask) -> Result<(), TaskError> {
        let runner = Recorder::succeeding();
        let abort = AbortFlag::new();
        let ctx = TaskContext {
            work_dir: fixture.work.path(),
            runner: &runner,
            abort: &abort,
        };
        task.run(&ctx)
    }

    #[test]
    fn copies_panorama_only() {
        let fixture = fixture();
        run(&fixture, &mut task(&fixture, false)).unwrap();
        assert_eq!(
            fs::read(fixture.out.path().join("result.jpg")).unwrap(),
            b"stitched"
        );
        assert!(!fixture.out.path().join("result.pto").exists());
    }

    #[test]
    fn saved_project_points_at_kept_files() {
        let fixture = fixture();
        run(&fixture, &mut task(&fixture, true)).unwrap();

        let saved = PtoDocument::open_file(fixture.out.path().join("result.pto"), "2019").unwrap();
        assert_eq!(saved.images[0].file_name, path_text(&fixture.jpeg));
        let kept_raw = fixture.out.path().join("001-b.tif");
        assert_eq!(saved.images[1].file_name, path_text(&kept_raw));
        assert!(kept_raw.exists());
        assert!(!fixture.raw.exists());
    }

    #[test]
    fn raw_inputs_with_the_same_name_are_kept_apart() {
        let mut fixture = fixture();
        let other = fixture.out.path().join("second").join("b.nef");
        let urls = PreprocessedUrls::plan(fixture.work.path(), 2, &other);
        fs::write(&urls.preprocessed, b"other pixels").unwrap();
        let pto = fixture.work.path().join("panorama.pto");
        let mut document = PtoDocument::open_file(&pto, "2019").unwrap();
        document
            .images
            .push(Image::new(path_text(&urls.preprocessed), Size::new(8, 8)));
        document.create_file(&pto).unwrap();
        fixture.preprocessed.insert(other, urls);

        run(&fixture, &mut task(&fixture, true)).unwrap();

        let saved = PtoDocument::open_file(fixture.out.path().join("result.pto"), "2019").unwrap();
        let first = fixture.out.path().join("001-b.tif");
        let second = fixture.out.path().join("002-b.tif");
        assert_eq!(saved.images[1].file_name, path_text(&first));
        assert_eq!(saved.images[2].file_name, path_text(&second));
        assert_eq!(fs::read(&first).unwrap(), b"pixels");
        assert_eq!(fs::read(&second).unwrap(), b"other pixels");
    }

    #[test]
    fn existing_kept_file_stops_before_anything_is_written() {
        let fixture = fixture();
        let kept_raw = fixture.out.path().join("001-b.tif");
        fs::write(&kept_raw, b"someone else's").unwrap();

        let error = run(&fixture, &mut task(&fixture, true)).unwrap_err();
        assert!(error.to_string().contains("001-b.tif"));
        assert_eq!(fs::read(&kept_raw).unwrap(), b"someone else's");
        assert!(!fixture.out.path().join("result.jpg").exists());
        assert!(!fixture.out.path().join("result.pto").exists());
    }

    #[test]
    fn refuses_to_overwrite() {
        let fixture = fixture();
        fs::write(fixture.out.path().join("result.jpg"), b"precious").unwrap();
        let error = run(&fixture, &mut task(&fixture, false)).unwrap_err();
        assert!(error.to_string().contains("already exists"));
        assert_eq!(
            fs::read(fixture.out.path().join("result.jpg")).unwrap(),
            b"precious"
        );
    }

    #[test]
    fn missing_panorama_fails() {
        let fixture = fixture();
        fs::remove_file(fixture.work.path().join("panorama.jpg")).unwrap();
        assert!(run(&fixture, &mut task(&fixture, false)).is_err());
    }
}

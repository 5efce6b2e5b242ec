use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::{In, Reader, Tag};
use pano_pto::{
    BitDepth, Compression, FileFormat, FileType, Image, Interpolator, LensParameter,
    OptimisationParameter, Projection, PtoDocument, Size, SpeedUp, Version, VignettingMode,
};
use tracing::{debug, info};

use super::{PanoTask, PreprocessedMap, TaskContext, TaskError, path_text};
use crate::action::{PanoAction, PanoramaFileType};

/// Field of view assumed when the camera did not record a focal length.
pub const DEFAULT_FIELD_OF_VIEW: f64 = 50.0;

/// Width of a 35 mm film frame, in millimetres.
const FULL_FRAME_WIDTH: f64 = 36.0;

/// Write the initial project: one image per input, lens shared by all.
pub struct CreatePtoTask {
    pto: PathBuf,
    file_type: PanoramaFileType,
    inputs: Vec<PathBuf>,
    preprocessed: PreprocessedMap,
    gpano: bool,
    version: Version,
}

impl CreatePtoTask {
    #[must_use]
    pub const fn new(
        pto: PathBuf,
        file_type: PanoramaFileType,
        inputs: Vec<PathBuf>,
        preprocessed: PreprocessedMap,
        gpano: bool,
        version: Version,
    ) -> Self {
        Self {
            pto,
            file_type,
            inputs,
            preprocessed,
            gpano,
            version,
        }
    }

    fn document(&self, ctx: &TaskContext<'_>) -> Result<PtoDocument, TaskError> {
        let mut document = PtoDocument::new(self.version);

        if self.gpano {
            document.project.projection = Projection::Equirectangular;
            document.project.field_of_view = 360.0;
        } else {
            document.project.projection = Projection::Cylindrical;
        }
        match self.file_type {
            PanoramaFileType::Jpeg => {
                document.project.file_format = FileFormat {
                    file_type: FileType::Jpeg,
                    quality: 90,
                    ..FileFormat::default()
                };
            }
            PanoramaFileType::Tiff => {
                document.project.file_format = FileFormat {
                    file_type: FileType::Tiff,
                    compression: Compression::Lzw,
                    ..FileFormat::default()
                };
            }
            PanoramaFileType::Hdr => {
                document.project.file_format = FileFormat {
                    file_type: FileType::Tiff,
                    compression: Compression::Lzw,
                    ..FileFormat::default()
                };
                document.project.hdr = true;
                document.project.bit_depth = BitDepth::Float;
            }
        }

        document.stitcher.gamma = 1.0;
        document.stitcher.interpolator = Interpolator::Poly3;
        document.stitcher.speed_up = SpeedUp::Fast;
        document.stitcher.huber_sigma = 2.0;
        document.stitcher.photometric_huber_sigma = 2.0 / 255.0;

        for (id, input) in self.inputs.iter().enumerate() {
            ctx.check_abort()?;
            let urls = self.preprocessed.get(input).ok_or_else(|| {
                TaskError::Invalid(format!("{} was not preprocessed", input.display()))
            })?;
            let (width, height) = image::image_dimensions(&urls.preprocessed)?;
            let mut image = Image::new(path_text(&urls.preprocessed), Size::new(width, height));

            if id == 0 {
                let field_of_view = field_of_view(input).unwrap_or(DEFAULT_FIELD_OF_VIEW);
                debug!(input = %input.display(), field_of_view, "initial lens");
                image.field_of_view = LensParameter::Value(field_of_view);
                image.vignetting_mode = LensParameter::Value(VignettingMode::RADIAL_DIVIDE);
                image.vignetting_correction_i = LensParameter::Value(1.0);
                image.optimise(OptimisationParameter::LensA);
                image.optimise(OptimisationParameter::LensB);
                image.optimise(OptimisationParameter::LensC);
            } else {
                share_lens(&mut image, 0);
                image.optimise(OptimisationParameter::LensYaw);
                image.optimise(OptimisationParameter::LensPitch);
                image.optimise(OptimisationParameter::LensRoll);
                image.optimise(OptimisationParameter::Exposure);
            }
            document.images.push(image);
        }

        Ok(document)
    }
}

impl PanoTask for CreatePtoTask {
    fn action(&self) -> PanoAction {
        PanoAction::CreatePto
    }

    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<(), TaskError> {
        let document = self.document(ctx)?;
        document.create_file(&self.pto)?;
        info!(pto = %self.pto.display(), images = document.images.len(), "base project written");
        Ok(())
    }
}

/// Link every lens and photometric parameter of `image` to image `owner`.
fn share_lens(image: &mut Image, owner: usize) {
    let linked = LensParameter::Reference(owner);
    image.field_of_view = linked;
    image.lens_barrel_coefficient_a = linked;
    image.lens_barrel_coefficient_b = linked;
    image.lens_barrel_coefficient_c = linked;
    image.lens_center_offset_x = linked;
    image.lens_center_offset_y = linked;
    image.lens_shear_x = linked;
    image.lens_shear_y = linked;
    image.vignetting_mode = LensParameter::Reference(owner);
    image.vignetting_correction_i = linked;
    image.vignetting_correction_j = linked;
    image.vignetting_correction_k = linked;
    image.vignetting_correction_l = linked;
    image.vignetting_offset_x = linked;
    image.vignetting_offset_y = linked;
    image.photometric_emor_a = linked;
    image.photometric_emor_b = linked;
    image.photometric_emor_c = linked;
    image.photometric_emor_d = linked;
    image.photometric_emor_e = linked;
}

/// Horizontal field of view from the EXIF 35 mm equivalent focal length.
fn field_of_view(path: &Path) -> Option<f64> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;
    let focal_length = exif
        .get_field(Tag::FocalLengthIn35mmFilm, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|&focal_length| focal_length > 0)?;
    Some(field_of_view_for(f64::from(focal_length)))
}

fn field_of_view_for(focal_length_35mm: f64) -> f64 {
    2.0 * (FULL_FRAME_WIDTH / (2.0 * focal_length_35mm))
        .atan()
        .to_degrees()
}

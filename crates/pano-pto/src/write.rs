//! PTO text serializer.
//!
//! [`to_pto`] is a pure function returning the file contents; writing to
//! disk lives in [`PtoDocument::create_file`](crate::PtoDocument::create_file).
//!
//! Output order is fixed: project, stitcher, images, optimisation
//! variables (closed by a bare `v`), masks, control points, trailing
//! comments. Every entity is preceded by its comments.

use std::fmt::Write;

use crate::error::PtoError;
use crate::format::real;
use crate::types::{
    BitDepth, ControlPoint, FileFormat, FileType, Image, Project, PtoDocument, Rect, Stitcher,
    Version,
};

/// Render a document as PTO text.
///
/// # Errors
///
/// Returns [`PtoError::UnknownOptimisationParameter`] if an image carries
/// an [`OptimisationParameter::Unknown`](crate::OptimisationParameter::Unknown)
/// variable, which has no spelling.
pub fn to_pto(document: &PtoDocument) -> Result<String, PtoError> {
    let mut out = String::new();

    write_project(&mut out, &document.project);
    write_stitcher(&mut out, &document.stitcher);

    // --- Images ---
    for image in &document.images {
        write_comments(&mut out, &image.previous_comments);
        write_image(&mut out, image, document.version);
    }

    // --- Optimisation variables ---
    for (index, image) in document.images.iter().enumerate() {
        let mut optimisations: Vec<_> = image.optimisation_parameters.iter().collect();
        optimisations.sort_by_key(|optimisation| optimisation.parameter);
        for optimisation in optimisations {
            let name = optimisation
                .parameter
                .name()
                .ok_or(PtoError::UnknownOptimisationParameter { image: index })?;
            write_comments(&mut out, &optimisation.previous_comments);
            let _ = writeln!(out, "v {name}{index}");
        }
    }
    let _ = writeln!(out, "v");

    // --- Masks ---
    for (index, image) in document.images.iter().enumerate() {
        for mask in &image.masks {
            write_comments(&mut out, &mask.previous_comments);
            let hull: Vec<String> = mask
                .hull
                .iter()
                .flat_map(|&(x, y)| [real(x), real(y)])
                .collect();
            let _ = writeln!(
                out,
                "k i{index} t{} p\"{}\"",
                mask.mask_type.code(),
                hull.join(" ")
            );
        }
    }

    // --- Control points ---
    for point in &document.control_points {
        write_control_point(&mut out, point);
    }

    write_comments(&mut out, &document.last_comments);
    Ok(out)
}

fn write_comments(out: &mut String, comments: &[String]) {
    for comment in comments {
        let _ = writeln!(out, "{comment}");
    }
}

fn write_unmatched(out: &mut String, unmatched: &[String]) {
    for token in unmatched {
        let _ = write!(out, " {token}");
    }
}

fn write_crop(out: &mut String, crop: &Rect) {
    if !crop.is_null() {
        let _ = write!(
            out,
            " S{},{},{},{}",
            crop.left, crop.right, crop.top, crop.bottom
        );
    }
}

fn file_format(format: &FileFormat) -> String {
    let name = format.file_type.name();
    let mut text = match format.file_type {
        FileType::Png => name.to_owned(),
        FileType::Jpeg => format!("{name} q{}", format.quality),
        FileType::Tiff | FileType::TiffM | FileType::TiffMultilayer => {
            let mut text = format!("{name} c:{}", format.compression.name());
            if format.save_positions {
                text.push_str(" p1");
            }
            if format.cropped {
                text.push_str(" r:CROP");
            }
            text
        }
    };
    for option in &format.unmatched_options {
        text.push(' ');
        text.push_str(option);
    }
    text
}

fn write_project(out: &mut String, project: &Project) {
    write_comments(out, &project.previous_comments);

    let _ = write!(out, "p f{}", project.projection.code());
    if project.size.width > 0 {
        let _ = write!(out, " w{}", project.size.width);
    }
    if project.size.height > 0 {
        let _ = write!(out, " h{}", project.size.height);
    }
    if project.field_of_view != 0.0 {
        let _ = write!(out, " v{}", real(project.field_of_view));
    }
    write_crop(out, &project.crop);
    let _ = write!(out, " n\"{}\"", file_format(&project.file_format));
    if project.exposure != 0.0 {
        let _ = write!(out, " E{}", real(project.exposure));
    }
    if project.hdr {
        let _ = write!(out, " R1");
    }
    if project.bit_depth != BitDepth::Uint8 {
        let _ = write!(out, " T\"{}\"", project.bit_depth.name());
    }
    if project.photometric_reference_id != 0 {
        let _ = write!(out, " k{}", project.photometric_reference_id);
    }
    write_unmatched(out, &project.unmatched_parameters);
    out.push('\n');
}

fn write_stitcher(out: &mut String, stitcher: &Stitcher) {
    write_comments(out, &stitcher.previous_comments);

    let _ = write!(
        out,
        "m g{} i{} f{}",
        real(stitcher.gamma),
        stitcher.interpolator.code(),
        stitcher.speed_up.code()
    );
    if stitcher.huber_sigma != 0.0 {
        let _ = write!(out, " m{}", real(stitcher.huber_sigma));
    }
    if stitcher.photometric_huber_sigma != 0.0 {
        let _ = write!(out, " p{}", real(stitcher.photometric_huber_sigma));
    }
    write_unmatched(out, &stitcher.unmatched_parameters);
    out.push('\n');
}

fn write_image(out: &mut String, image: &Image, version: Version) {
    let _ = write!(
        out,
        "i w{} h{} f{} v{}",
        image.size.width,
        image.size.height,
        image.lens_projection.code(),
        image.field_of_view.to_pto()
    );
    let _ = write!(
        out,
        " Ra{} Rb{} Rc{} Rd{} Re{}",
        image.photometric_emor_a.to_pto(),
        image.photometric_emor_b.to_pto(),
        image.photometric_emor_c.to_pto(),
        image.photometric_emor_d.to_pto(),
        image.photometric_emor_e.to_pto()
    );
    let _ = write!(
        out,
        " Eev{} Er{} Eb{}",
        image.exposure.to_pto(),
        image.white_balance_red.to_pto(),
        image.white_balance_blue.to_pto()
    );
    let _ = write!(
        out,
        " y{} p{} r{}",
        real(image.yaw),
        real(image.pitch),
        real(image.roll)
    );
    let _ = write!(
        out,
        " TrX{} TrY{} TrZ{}",
        real(image.mosaic_camera_position_x),
        real(image.mosaic_camera_position_y),
        real(image.mosaic_camera_position_z)
    );
    if version == Version::V2014 {
        let _ = write!(
            out,
            " Tpy{} Tpp{}",
            real(image.mosaic_projection_plane_yaw),
            real(image.mosaic_projection_plane_pitch)
        );
    }
    let _ = write!(
        out,
        " j{} a{} b{} c{} d{} e{} g{} t{}",
        image.stack_number.to_pto(),
        image.lens_barrel_coefficient_a.to_pto(),
        image.lens_barrel_coefficient_b.to_pto(),
        image.lens_barrel_coefficient_c.to_pto(),
        image.lens_center_offset_x.to_pto(),
        image.lens_center_offset_y.to_pto(),
        image.lens_shear_x.to_pto(),
        image.lens_shear_y.to_pto()
    );
    let _ = write!(
        out,
        " Va{} Vb{} Vc{} Vd{} Vx{} Vy{} Vm{}",
        image.vignetting_correction_i.to_pto(),
        image.vignetting_correction_j.to_pto(),
        image.vignetting_correction_k.to_pto(),
        image.vignetting_correction_l.to_pto(),
        image.vignetting_offset_x.to_pto(),
        image.vignetting_offset_y.to_pto(),
        image.vignetting_mode.to_pto()
    );
    if !image.vignetting_flatfield_image_name.is_empty() {
        let _ = write!(out, " Vf\"{}\"", image.vignetting_flatfield_image_name);
    }
    write_crop(out, &image.crop);
    let _ = write!(out, " n\"{}\"", image.file_name);
    write_unmatched(out, &image.unmatched_parameters);
    out.push('\n');
}

fn write_control_point(out: &mut String, point: &ControlPoint) {
    write_comments(out, &point.previous_comments);
    let _ = write!(
        out,
        "c n{} N{} x{} y{} X{} Y{} t{}",
        point.image1_id,
        point.image2_id,
        real(point.p1_x),
        real(point.p1_y),
        real(point.p2_x),
        real(point.p2_y),
        point.kind
    );
    write_unmatched(out, &point.unmatched_parameters);
    out.push('\n');
}

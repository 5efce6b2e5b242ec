//! PTO text parser.
//!
//! The format is line oriented. The first token names the line type
//! (`p`, `m`, `i`, `v`, `k`, `c`), the rest are `<key><value>` tokens,
//! where quoted values may contain spaces. `#` lines are comments and
//! belong to the entity that follows them.

use std::mem;
use std::str::FromStr;

use tracing::warn;

use crate::error::PtoError;
use crate::types::{
    BitDepth, Compression, ControlPoint, FileFormat, FileType, Image, Interpolator, LensParameter,
    LensProjection, LensValue, Mask, MaskType, Optimisation, OptimisationParameter, Projection,
    PtoDocument, Rect, SpeedUp, Version,
};

/// Parse the text of a PTO file.
///
/// `version` selects the dialect: with [`Version::PreV2014`] the mosaic
/// projection-plane tokens are not interpreted and end up in
/// [`Image::unmatched_parameters`].
///
/// Lines with an unknown type are kept verbatim with the comments of the
/// next entity, so writing the document back preserves them.
///
/// # Errors
///
/// Returns [`PtoError::Parse`] when a known token carries a malformed
/// value or an unknown enumeration code, or when a `v` or `k` line refers
/// to an image that does not exist.
pub fn parse(text: &str, version: Version) -> Result<PtoDocument, PtoError> {
    let mut parser = Parser {
        document: PtoDocument::new(version),
        pending_comments: Vec::new(),
        line: 0,
    };

    for (index, line) in text.lines().enumerate() {
        parser.line = index + 1;
        parser.parse_line(line)?;
    }

    parser.document.last_comments = parser.pending_comments;
    Ok(parser.document)
}

struct Parser {
    document: PtoDocument,
    pending_comments: Vec<String>,
    line: usize,
}

impl Parser {
    fn parse_line(&mut self, line: &str) -> Result<(), PtoError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if trimmed.starts_with('#') {
            self.pending_comments.push(line.to_owned());
            return Ok(());
        }

        let tokens = tokenize(trimmed);
        let Some((&tag, rest)) = tokens.split_first() else {
            return Ok(());
        };

        match tag {
            "p" => self.project_line(rest),
            "m" => self.stitcher_line(rest),
            "i" => self.image_line(rest),
            "v" => self.variable_line(rest),
            "k" => self.mask_line(rest),
            "c" => self.control_point_line(rest),
            _ => {
                warn!(line = self.line, tag, "keeping line of unknown type as comment");
                self.pending_comments.push(line.to_owned());
                Ok(())
            }
        }
    }

    fn take_comments(&mut self) -> Vec<String> {
        mem::take(&mut self.pending_comments)
    }

    // --- Value helpers ---

    fn number<T: FromStr>(&self, key: &str, value: &str) -> Result<T, PtoError> {
        value
            .parse()
            .map_err(|_| PtoError::parse(self.line, format!("invalid value {value:?} for {key}")))
    }

    fn lens<T: LensValue>(&self, key: &str, value: &str) -> Result<LensParameter<T>, PtoError> {
        LensParameter::from_pto(value)
            .ok_or_else(|| PtoError::parse(self.line, format!("invalid value {value:?} for {key}")))
    }

    fn quoted<'t>(&self, key: &str, value: &'t str) -> Result<&'t str, PtoError> {
        value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .ok_or_else(|| {
                PtoError::parse(self.line, format!("expected a quoted value for {key}"))
            })
    }

    fn code<T>(&self, key: &str, value: &str, from_code: fn(u32) -> Option<T>) -> Result<T, PtoError> {
        from_code(self.number(key, value)?)
            .ok_or_else(|| PtoError::parse(self.line, format!("unknown code {value} for {key}")))
    }

    fn rect(&self, value: &str) -> Result<Rect, PtoError> {
        let edges = value
            .split(',')
            .map(|edge| self.number::<i64>("S", edge.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        match edges[..] {
            [left, right, top, bottom] => Ok(Rect::new(left, right, top, bottom)),
            _ => Err(PtoError::parse(
                self.line,
                format!("crop {value:?} must have four edges"),
            )),
        }
    }

    fn image_index(&self, value: &str, what: &str) -> Result<usize, PtoError> {
        let index: usize = self.number(what, value)?;
        if index < self.document.images.len() {
            Ok(index)
        } else {
            Err(PtoError::parse(
                self.line,
                format!("{what} refers to image {index}, which does not exist"),
            ))
        }
    }

    // --- Line types ---

    fn project_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        let comments = self.take_comments();
        self.document.project.previous_comments.extend(comments);

        for &token in tokens {
            let (key, value) = split_key(token);
            match key {
                "f" => self.document.project.projection = self.code(key, value, Projection::from_code)?,
                "w" => self.document.project.size.width = self.number(key, value)?,
                "h" => self.document.project.size.height = self.number(key, value)?,
                "v" => self.document.project.field_of_view = self.number(key, value)?,
                "S" => self.document.project.crop = self.rect(value)?,
                "n" => {
                    let format = self.quoted(key, value)?;
                    self.document.project.file_format = self.file_format(format)?;
                }
                "E" => self.document.project.exposure = self.number(key, value)?,
                "R" => self.document.project.hdr = self.number::<u32>(key, value)? != 0,
                "T" => {
                    let name = self.quoted(key, value)?;
                    match BitDepth::from_name(name) {
                        Some(depth) => self.document.project.bit_depth = depth,
                        None => self
                            .document
                            .project
                            .unmatched_parameters
                            .push(token.to_owned()),
                    }
                }
                "k" => self.document.project.photometric_reference_id = self.number(key, value)?,
                _ => self
                    .document
                    .project
                    .unmatched_parameters
                    .push(token.to_owned()),
            }
        }
        Ok(())
    }

    fn file_format(&self, text: &str) -> Result<FileFormat, PtoError> {
        let mut words = text.split_whitespace();
        let name = words.next().unwrap_or_default();
        let file_type = FileType::from_name(name).ok_or_else(|| {
            PtoError::parse(self.line, format!("unsupported output format {name:?}"))
        })?;

        let is_tiff = matches!(
            file_type,
            FileType::Tiff | FileType::TiffM | FileType::TiffMultilayer
        );
        let mut format = FileFormat {
            file_type,
            ..FileFormat::default()
        };
        for option in words {
            if let Some(quality) = option.strip_prefix('q') {
                format.quality = self.number("q", quality)?;
            } else if let Some(compression) = option.strip_prefix("c:") {
                format.compression = Compression::from_name(compression).ok_or_else(|| {
                    PtoError::parse(self.line, format!("unknown compression {compression:?}"))
                })?;
            } else if option == "r:CROP" && is_tiff {
                format.cropped = true;
            } else if let Some(flag) = option.strip_prefix('p')
                && is_tiff
            {
                format.save_positions = self.number::<u32>("p", flag)? != 0;
            } else {
                format.unmatched_options.push(option.to_owned());
            }
        }
        Ok(format)
    }

    fn stitcher_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        let mut stitcher = mem::take(&mut self.document.stitcher);
        stitcher.previous_comments.extend(self.take_comments());

        for &token in tokens {
            let (key, value) = split_key(token);
            match key {
                "g" => stitcher.gamma = self.number(key, value)?,
                "i" => stitcher.interpolator = self.code(key, value, Interpolator::from_code)?,
                "f" => stitcher.speed_up = self.code(key, value, SpeedUp::from_code)?,
                "m" => stitcher.huber_sigma = self.number(key, value)?,
                "p" => stitcher.photometric_huber_sigma = self.number(key, value)?,
                _ => stitcher.unmatched_parameters.push(token.to_owned()),
            }
        }

        self.document.stitcher = stitcher;
        Ok(())
    }

    fn image_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        let mut image = Image {
            previous_comments: self.take_comments(),
            ..Image::default()
        };

        for &token in tokens {
            let (key, value) = split_key(token);
            match key {
                "w" => image.size.width = self.number(key, value)?,
                "h" => image.size.height = self.number(key, value)?,
                "f" => image.lens_projection = self.code(key, value, LensProjection::from_code)?,
                "v" => image.field_of_view = self.lens(key, value)?,
                "y" => image.yaw = self.number(key, value)?,
                "p" => image.pitch = self.number(key, value)?,
                "r" => image.roll = self.number(key, value)?,
                "a" => image.lens_barrel_coefficient_a = self.lens(key, value)?,
                "b" => image.lens_barrel_coefficient_b = self.lens(key, value)?,
                "c" => image.lens_barrel_coefficient_c = self.lens(key, value)?,
                "d" => image.lens_center_offset_x = self.lens(key, value)?,
                "e" => image.lens_center_offset_y = self.lens(key, value)?,
                "g" => image.lens_shear_x = self.lens(key, value)?,
                "t" => image.lens_shear_y = self.lens(key, value)?,
                "Eev" => image.exposure = self.lens(key, value)?,
                "Er" => image.white_balance_red = self.lens(key, value)?,
                "Eb" => image.white_balance_blue = self.lens(key, value)?,
                "Vm" => image.vignetting_mode = self.lens(key, value)?,
                "Va" => image.vignetting_correction_i = self.lens(key, value)?,
                "Vb" => image.vignetting_correction_j = self.lens(key, value)?,
                "Vc" => image.vignetting_correction_k = self.lens(key, value)?,
                "Vd" => image.vignetting_correction_l = self.lens(key, value)?,
                "Vx" => image.vignetting_offset_x = self.lens(key, value)?,
                "Vy" => image.vignetting_offset_y = self.lens(key, value)?,
                "Vf" => image.vignetting_flatfield_image_name = self.quoted(key, value)?.to_owned(),
                "Ra" => image.photometric_emor_a = self.lens(key, value)?,
                "Rb" => image.photometric_emor_b = self.lens(key, value)?,
                "Rc" => image.photometric_emor_c = self.lens(key, value)?,
                "Rd" => image.photometric_emor_d = self.lens(key, value)?,
                "Re" => image.photometric_emor_e = self.lens(key, value)?,
                "TrX" => image.mosaic_camera_position_x = self.number(key, value)?,
                "TrY" => image.mosaic_camera_position_y = self.number(key, value)?,
                "TrZ" => image.mosaic_camera_position_z = self.number(key, value)?,
                "Tpy" if self.document.version == Version::V2014 => {
                    image.mosaic_projection_plane_yaw = self.number(key, value)?;
                }
                "Tpp" if self.document.version == Version::V2014 => {
                    image.mosaic_projection_plane_pitch = self.number(key, value)?;
                }
                "j" => image.stack_number = self.lens(key, value)?,
                "S" => image.crop = self.rect(value)?,
                "n" => image.file_name = self.quoted(key, value)?.to_owned(),
                _ => image.unmatched_parameters.push(token.to_owned()),
            }
        }

        self.document.images.push(image);
        Ok(())
    }

    fn variable_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        // A bare `v` terminates the variable section and carries nothing.
        for &token in tokens {
            let (name, index) = split_key(token);
            let image = self.image_index(index, "optimisation variable")?;
            let parameter = OptimisationParameter::from_name(name);
            if parameter == OptimisationParameter::Unknown {
                warn!(line = self.line, variable = name, "unknown optimisation variable");
            }
            let optimisation = Optimisation {
                previous_comments: self.take_comments(),
                parameter,
            };
            self.document.images[image].insert_optimisation(optimisation);
        }
        Ok(())
    }

    fn mask_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        let mut mask = Mask {
            previous_comments: self.take_comments(),
            ..Mask::default()
        };
        let mut image = None;

        for &token in tokens {
            let (key, value) = split_key(token);
            match key {
                "i" => image = Some(self.image_index(value, "mask")?),
                "t" => mask.mask_type = self.code(key, value, MaskType::from_code)?,
                "p" => mask.hull = self.hull(self.quoted(key, value)?)?,
                _ => warn!(line = self.line, token, "ignoring unknown mask token"),
            }
        }

        let image =
            image.ok_or_else(|| PtoError::parse(self.line, "mask without an image number"))?;
        self.document.images[image].masks.push(mask);
        Ok(())
    }

    fn hull(&self, text: &str) -> Result<Vec<(f64, f64)>, PtoError> {
        let coordinates = text
            .split_whitespace()
            .map(|coordinate| self.number::<f64>("p", coordinate))
            .collect::<Result<Vec<_>, _>>()?;
        if coordinates.len() % 2 != 0 {
            return Err(PtoError::parse(
                self.line,
                "mask polygon has an odd number of coordinates",
            ));
        }
        Ok(coordinates
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect())
    }

    fn control_point_line(&mut self, tokens: &[&str]) -> Result<(), PtoError> {
        let mut point = ControlPoint {
            previous_comments: self.take_comments(),
            ..ControlPoint::default()
        };

        for &token in tokens {
            let (key, value) = split_key(token);
            match key {
                "n" => point.image1_id = self.number(key, value)?,
                "N" => point.image2_id = self.number(key, value)?,
                "x" => point.p1_x = self.number(key, value)?,
                "y" => point.p1_y = self.number(key, value)?,
                "X" => point.p2_x = self.number(key, value)?,
                "Y" => point.p2_y = self.number(key, value)?,
                "t" => point.kind = self.number(key, value)?,
                _ => point.unmatched_parameters.push(token.to_owned()),
            }
        }

        self.document.control_points.push(point);
        Ok(())
    }
}

/// Split a line into whitespace separated tokens, keeping quoted runs whole.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut quoted = false;

    for (index, ch) in line.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        }
        if ch.is_whitespace() && !quoted {
            if let Some(begin) = start.take() {
                tokens.push(&line[begin..index]);
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }
    if let Some(begin) = start {
        tokens.push(&line[begin..]);
    }
    tokens
}

/// Split `Eev0.5` into `("Eev", "0.5")`: the key is the leading run of letters.
fn split_key(token: &str) -> (&str, &str) {
    let end = token
        .find(|ch: char| !ch.is_ascii_alphabetic())
        .unwrap_or(token.len());
    token.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VignettingCorrection, VignettingMode};

    #[test]
    fn tokenize_keeps_quoted_spaces() {
        assert_eq!(
            tokenize(r#"p f2 n"TIFF_m c:LZW r:CROP" E0"#),
            ["p", "f2", r#"n"TIFF_m c:LZW r:CROP""#, "E0"]
        );
        assert_eq!(
            tokenize(r#"i w10   n"my photo.jpg"  "#),
            ["i", "w10", r#"n"my photo.jpg""#]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn split_key_at_first_non_letter() {
        assert_eq!(split_key("Eev-0.5"), ("Eev", "-0.5"));
        assert_eq!(split_key("v=0"), ("v", "=0"));
        assert_eq!(split_key(r#"n"a.jpg""#), ("n", r#""a.jpg""#));
        assert_eq!(split_key("TrX1"), ("TrX", "1"));
        assert_eq!(split_key("xyz"), ("xyz", ""));
    }

    #[test]
    fn parses_project_line() {
        let document = parse(
            r#"p f2 w3000 h1500 v360 S10,2990,5,1495 n"TIFF_m c:DEFLATE p1 r:CROP" E1.5 R1 T"FLOAT" k2 P"x""#,
            Version::V2014,
        )
        .unwrap();
        let project = &document.project;
        assert_eq!(project.projection, Projection::Equirectangular);
        assert_eq!((project.size.width, project.size.height), (3000, 1500));
        assert!((project.field_of_view - 360.0).abs() < f64::EPSILON);
        assert_eq!(project.crop, Rect::new(10, 2990, 5, 1495));
        assert_eq!(project.file_format.file_type, FileType::TiffM);
        assert_eq!(project.file_format.compression, Compression::Deflate);
        assert!(project.file_format.save_positions);
        assert!(project.file_format.cropped);
        assert!((project.exposure - 1.5).abs() < f64::EPSILON);
        assert!(project.hdr);
        assert_eq!(project.bit_depth, BitDepth::Float);
        assert_eq!(project.photometric_reference_id, 2);
        assert_eq!(project.unmatched_parameters, [r#"P"x""#]);
    }

    #[test]
    fn parses_jpeg_quality() {
        let document = parse(r#"p f0 n"JPEG q75""#, Version::V2014).unwrap();
        assert_eq!(document.project.file_format.file_type, FileType::Jpeg);
        assert_eq!(document.project.file_format.quality, 75);
    }

    #[test]
    fn plain_tiff_keeps_crop_and_unknown_options() {
        let text = r#"p f2 w100 h50 v360 n"TIFF c:LZW r:CROP e1""#;
        let document = parse(text, Version::V2014).unwrap();
        let format = &document.project.file_format;
        assert_eq!(format.file_type, FileType::Tiff);
        assert!(format.cropped);
        assert_eq!(format.unmatched_options, ["e1"]);

        let written = crate::write::to_pto(&document).unwrap();
        assert_eq!(written.lines().next(), Some(text));
    }

    #[test]
    fn tiff_options_on_other_formats_are_kept_verbatim() {
        let document = parse(r#"p f0 n"PNG r:CROP p1""#, Version::V2014).unwrap();
        let format = &document.project.file_format;
        assert!(!format.cropped);
        assert!(!format.save_positions);
        assert_eq!(format.unmatched_options, ["r:CROP", "p1"]);
    }

    #[test]
    fn parses_stitcher_line() {
        let document = parse("m g1 i2 f2 m2 p0.00784314 x9", Version::V2014).unwrap();
        let stitcher = &document.stitcher;
        assert_eq!(stitcher.interpolator, Interpolator::Spline36);
        assert_eq!(stitcher.speed_up, SpeedUp::Slow);
        assert!((stitcher.huber_sigma - 2.0).abs() < f64::EPSILON);
        assert!((stitcher.photometric_huber_sigma - 0.007_843_14).abs() < 1e-12);
        assert_eq!(stitcher.unmatched_parameters, ["x9"]);
    }

    #[test]
    fn parses_image_line_with_references() {
        let text = "\
i w4000 h3000 f0 v50 Ra0 Rb0 Rc0 Rd0 Re0 Eev0 Er1 Eb1 r0 p0 y0 TrX0 TrY0 TrZ0 Tpy0 Tpp0 j0 a0 b0 c0 d0 e0 g0 t0 Va1 Vb0 Vc0 Vd0 Vx0 Vy0 Vm5 n\"a.jpg\"
i w4000 h3000 f0 v=0 Ra=0 Rb=0 Rc=0 Rd=0 Re=0 Eev0.5 Er1 Eb1 r1.5 p-2 y30 TrX0 TrY0 TrZ0 Tpy0 Tpp0 j0 a=0 b=0 c=0 d=0 e=0 g=0 t=0 Va=0 Vb=0 Vc=0 Vd=0 Vx=0 Vy=0 Vm=0 n\"b.jpg\"
";
        let document = parse(text, Version::V2014).unwrap();
        assert_eq!(document.images.len(), 2);

        let first = &document.images[0];
        assert_eq!(first.field_of_view, LensParameter::Value(50.0));
        assert_eq!(first.vignetting_mode, LensParameter::Value(VignettingMode::RADIAL_DIVIDE));
        assert_eq!(first.vignetting_correction_i, LensParameter::Value(1.0));
        assert_eq!(first.file_name, "a.jpg");
        assert!(first.unmatched_parameters.is_empty());

        let second = &document.images[1];
        assert_eq!(second.field_of_view.reference_id(), Some(0));
        assert_eq!(second.lens_barrel_coefficient_a.reference_id(), Some(0));
        assert_eq!(second.vignetting_mode.reference_id(), Some(0));
        assert_eq!(second.exposure, LensParameter::Value(0.5));
        assert!((second.yaw - 30.0).abs() < f64::EPSILON);
        assert!((second.pitch + 2.0).abs() < f64::EPSILON);
        assert!((second.roll - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn projection_plane_is_ignored_before_2014() {
        let text = "i w10 h10 f0 v50 Tpy12.5 Tpp-3 n\"a.jpg\"";

        let modern = parse(text, Version::V2014).unwrap();
        assert!((modern.images[0].mosaic_projection_plane_yaw - 12.5).abs() < f64::EPSILON);
        assert!((modern.images[0].mosaic_projection_plane_pitch + 3.0).abs() < f64::EPSILON);
        assert!(modern.images[0].unmatched_parameters.is_empty());

        let old = parse(text, Version::PreV2014).unwrap();
        assert!(old.images[0].mosaic_projection_plane_yaw.abs() < f64::EPSILON);
        assert!(old.images[0].mosaic_projection_plane_pitch.abs() < f64::EPSILON);
        assert_eq!(old.images[0].unmatched_parameters, ["Tpy12.5", "Tpp-3"]);
    }

    #[test]
    fn variables_attach_to_their_image() {
        let text = "\
i w10 h10 n\"a.jpg\"
i w10 h10 n\"b.jpg\"
# optimise these
v Eev1 y1
v a0
v
";
        let document = parse(text, Version::V2014).unwrap();
        let first: Vec<_> = document.images[0]
            .optimisation_parameters
            .iter()
            .map(|optimisation| optimisation.parameter)
            .collect();
        assert_eq!(first, [OptimisationParameter::LensA]);

        let second = &document.images[1].optimisation_parameters;
        assert_eq!(second[0].parameter, OptimisationParameter::LensYaw);
        assert_eq!(second[1].parameter, OptimisationParameter::Exposure);
        assert_eq!(second[1].previous_comments, ["# optimise these"]);
        assert!(second[0].previous_comments.is_empty());
    }

    #[test]
    fn unknown_variable_is_kept_as_unknown() {
        let document = parse("i w1 h1 n\"a\"\nv TrX0\n", Version::V2014).unwrap();
        assert_eq!(
            document.images[0].optimisation_parameters[0].parameter,
            OptimisationParameter::Unknown
        );
    }

    #[test]
    fn variable_for_missing_image_is_an_error() {
        let error = parse("i w1 h1 n\"a\"\nv y3\n", Version::V2014).unwrap_err();
        assert!(matches!(error, PtoError::Parse { line: 2, .. }));
    }

    #[test]
    fn parses_masks() {
        let text = "i w10 h10 n\"a\"\nk i0 t1 p\"1 2 3 4.5 5 6\"\n";
        let document = parse(text, Version::V2014).unwrap();
        let mask = &document.images[0].masks[0];
        assert_eq!(mask.mask_type, MaskType::Positive);
        assert_eq!(mask.hull, [(1.0, 2.0), (3.0, 4.5), (5.0, 6.0)]);
    }

    #[test]
    fn odd_mask_polygon_is_an_error() {
        let text = "i w10 h10 n\"a\"\nk i0 t0 p\"1 2 3\"\n";
        assert!(parse(text, Version::V2014).is_err());
    }

    #[test]
    fn parses_control_points() {
        let document = parse("c n0 N1 x10.5 y20 X30 Y40.25 t0 q7", Version::V2014).unwrap();
        let point = &document.control_points[0];
        assert_eq!((point.image1_id, point.image2_id), (0, 1));
        assert!((point.p1_x - 10.5).abs() < f64::EPSILON);
        assert!((point.p2_y - 40.25).abs() < f64::EPSILON);
        assert_eq!(point.kind, 0);
        assert_eq!(point.unmatched_parameters, ["q7"]);
    }

    #[test]
    fn comments_go_to_the_next_entity_and_the_end() {
        let text = "\
# hugin project file
#hugin_ptoversion 2
p f0 w100 h50 v90 n\"JPEG q90\"

m g1 i0 f0
#-hugin  cropFactor=1
i w10 h10 n\"a.jpg\"
#hugin_optimizeReferenceImage 0
";
        let document = parse(text, Version::V2014).unwrap();
        assert_eq!(
            document.project.previous_comments,
            ["# hugin project file", "#hugin_ptoversion 2"]
        );
        assert!(document.stitcher.previous_comments.is_empty());
        assert_eq!(document.images[0].previous_comments, ["#-hugin  cropFactor=1"]);
        assert_eq!(document.last_comments, ["#hugin_optimizeReferenceImage 0"]);
    }

    #[test]
    fn unknown_line_types_are_kept_as_comments() {
        let document = parse("o f0 y0\ni w1 h1 n\"a\"\n", Version::V2014).unwrap();
        assert_eq!(document.images[0].previous_comments, ["o f0 y0"]);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(parse("p f2 w12x", Version::V2014).is_err());
        assert!(parse("p f99", Version::V2014).is_err());
        assert!(parse(r#"p n"GIF""#, Version::V2014).is_err());
        assert!(parse("i w1 h1 Vm3 n\"a\"", Version::V2014).is_err());
        assert!(parse("i w1 h1 S1,2,3 n\"a\"", Version::V2014).is_err());
    }

    #[test]
    fn windows_line_endings() {
        let document = parse("p f1 w20 h10\r\ni w1 h1 n\"a\"\r\n", Version::V2014).unwrap();
        assert_eq!(document.project.projection, Projection::Cylindrical);
        assert_eq!(document.images[0].file_name, "a");
        assert_eq!(
            document.images[0].vignetting_mode.value().map(|mode| mode.correction),
            Some(VignettingCorrection::None)
        );
    }
}

//! In-memory model of a Hugin PTO project.
//!
//! The structs mirror the line types of the file format: one [`Project`]
//! (`p` line), one [`Stitcher`] (`m` line), an ordered list of [`Image`]s
//! (`i` lines, whose index is their id), and the [`ControlPoint`]s (`c`
//! lines). Optimisation variables (`v` lines) and masks (`k` lines) are
//! stored on the image they refer to.
//!
//! Nothing here validates values; the model holds whatever a file says.

use serde::{Deserialize, Serialize};

use crate::format;

/// PTO dialect, selected from the Hugin version the file belongs to.
///
/// Hugin 2014 added the mosaic projection-plane parameters `Tpy` and
/// `Tpp` to image lines; older Hugin releases reject them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    /// Hugin releases before 2014.0.
    PreV2014,
    /// Hugin 2014.0 and later.
    #[default]
    V2014,
}

impl Version {
    /// Pick the dialect for a Hugin version string such as `"2013.0.0"`
    /// or `"2019.2.0.b690dd9b"`.
    ///
    /// Only the leading major number is considered. Strings without one
    /// select the current dialect.
    #[must_use]
    pub fn from_hugin_version(version: &str) -> Self {
        let major: String = version
            .trim()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        match major.parse::<u32>() {
            Ok(major) if major < 2014 => Self::PreV2014,
            _ => Self::V2014,
        }
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// Pixels across.
    pub width: u32,
    /// Pixels down.
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Crop rectangle in the order PTO files spell it: `S<left>,<right>,<top>,<bottom>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// First column inside the rectangle.
    pub left: i64,
    /// First column past the rectangle.
    pub right: i64,
    /// First row inside the rectangle.
    pub top: i64,
    /// First row past the rectangle.
    pub bottom: i64,
}

impl Rect {
    #[must_use]
    pub const fn new(left: i64, right: i64, top: i64, bottom: i64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// A rectangle with every edge at zero, meaning "no crop".
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    #[must_use]
    pub const fn width(&self) -> i64 {
        self.right - self.left
    }

    #[must_use]
    pub const fn height(&self) -> i64 {
        self.bottom - self.top
    }

    /// True when the rectangle encloses no pixel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

// ---------------------------------------------------------------------------
// Lens parameters
// ---------------------------------------------------------------------------

/// A per-image lens or photometric value that may be shared with another
/// image.
///
/// Hugin links parameters of images shot with the same lens: the first
/// image owns the value and the others write `=<index>`. The reference is
/// kept as an index and never resolved into a copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LensParameter<T> {
    /// The image owns this value.
    Value(T),
    /// The value is owned by the image with this index.
    Reference(usize),
}

impl<T> LensParameter<T> {
    /// The owned value, if this is not a reference.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Reference(_) => None,
        }
    }

    /// The image index this parameter refers to, if any.
    #[must_use]
    pub const fn reference_id(&self) -> Option<usize> {
        match self {
            Self::Value(_) => None,
            Self::Reference(id) => Some(*id),
        }
    }

    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

impl<T: Default> Default for LensParameter<T> {
    fn default() -> Self {
        Self::Value(T::default())
    }
}

/// Values that can appear in a [`LensParameter`] and their PTO spelling.
pub trait LensValue: Sized {
    /// Render the value as it appears after the parameter name.
    fn to_pto(&self) -> String;

    /// Interpret the text following the parameter name.
    fn from_pto(text: &str) -> Option<Self>;
}

impl LensValue for f64 {
    fn to_pto(&self) -> String {
        format::real(*self)
    }

    fn from_pto(text: &str) -> Option<Self> {
        text.parse().ok()
    }
}

impl LensValue for i32 {
    fn to_pto(&self) -> String {
        self.to_string()
    }

    fn from_pto(text: &str) -> Option<Self> {
        text.parse().ok()
    }
}

impl LensValue for VignettingMode {
    fn to_pto(&self) -> String {
        self.code().to_string()
    }

    fn from_pto(text: &str) -> Option<Self> {
        text.parse().ok().and_then(Self::from_code)
    }
}

impl<T: LensValue> LensParameter<T> {
    /// Render as `<value>` or `=<index>`.
    #[must_use]
    pub fn to_pto(&self) -> String {
        match self {
            Self::Value(value) => value.to_pto(),
            Self::Reference(id) => format!("={id}"),
        }
    }

    /// Parse `<value>` or `=<index>`.
    #[must_use]
    pub fn from_pto(text: &str) -> Option<Self> {
        text.strip_prefix('=').map_or_else(
            || T::from_pto(text).map(Self::Value),
            |id| id.parse().ok().map(Self::Reference),
        )
    }
}

// ---------------------------------------------------------------------------
// Project (`p` line)
// ---------------------------------------------------------------------------

/// Output projection of the panorama, with Hugin's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    Rectilinear,
    Cylindrical,
    Equirectangular,
    FullFrameFisheye,
    Stereographic,
    Mercator,
    TransverseMercator,
    Sinusoidal,
    LambertEqualAreaConic,
    LambertAzimuthal,
    AlbersEqualAreaConic,
    MillerCylindrical,
    Panini,
    Architectural,
    Orthographic,
    Equisolid,
    EquirectangularPanini,
    Biplane,
    Triplane,
    PaniniGeneral,
    ThobyProjection,
    HammerAitoff,
}

impl Projection {
    const ALL: [Self; 22] = [
        Self::Rectilinear,
        Self::Cylindrical,
        Self::Equirectangular,
        Self::FullFrameFisheye,
        Self::Stereographic,
        Self::Mercator,
        Self::TransverseMercator,
        Self::Sinusoidal,
        Self::LambertEqualAreaConic,
        Self::LambertAzimuthal,
        Self::AlbersEqualAreaConic,
        Self::MillerCylindrical,
        Self::Panini,
        Self::Architectural,
        Self::Orthographic,
        Self::Equisolid,
        Self::EquirectangularPanini,
        Self::Biplane,
        Self::Triplane,
        Self::PaniniGeneral,
        Self::ThobyProjection,
        Self::HammerAitoff,
    ];

    /// The number written after `f` on the `p` line.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }
}

/// Container of the stitched output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Png,
    Tiff,
    /// One TIFF per remapped image.
    TiffM,
    TiffMultilayer,
    #[default]
    Jpeg,
}

impl FileType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Tiff => "TIFF",
            Self::TiffM => "TIFF_m",
            Self::TiffMultilayer => "TIFF_multilayer",
            Self::Jpeg => "JPEG",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PNG" => Some(Self::Png),
            "TIFF" => Some(Self::Tiff),
            "TIFF_m" => Some(Self::TiffM),
            "TIFF_multilayer" => Some(Self::TiffMultilayer),
            "JPEG" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// TIFF compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    #[default]
    Lzw,
    Deflate,
}

impl Compression {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Lzw => "LZW",
            Self::Deflate => "DEFLATE",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NONE" => Some(Self::None),
            "LZW" => Some(Self::Lzw),
            "DEFLATE" => Some(Self::Deflate),
            _ => None,
        }
    }
}

/// The `n"..."` output format of the project line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    /// Container, the first word inside `n"..."`.
    pub file_type: FileType,
    /// JPEG quality, 0-100.
    pub quality: u8,
    /// TIFF compression, written as `c:<name>`.
    pub compression: Compression,
    /// TIFF output: crop the image to its content (`r:CROP`).
    pub cropped: bool,
    /// TIFF output: store the image position (`p1`).
    pub save_positions: bool,
    /// Options this model has no field for, written back verbatim after
    /// the known ones.
    #[serde(default)]
    pub unmatched_options: Vec<String>,
}

impl Default for FileFormat {
    fn default() -> Self {
        Self {
            file_type: FileType::Jpeg,
            quality: 90,
            compression: Compression::Lzw,
            cropped: false,
            save_positions: false,
            unmatched_options: Vec::new(),
        }
    }
}

/// Sample format of the stitched output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    #[default]
    Uint8,
    Uint16,
    Float,
}

impl BitDepth {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "UINT8",
            Self::Uint16 => "UINT16",
            Self::Float => "FLOAT",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "UINT8" => Some(Self::Uint8),
            "UINT16" => Some(Self::Uint16),
            "FLOAT" => Some(Self::Float),
            _ => None,
        }
    }
}

/// Panorama-wide settings, written as the `p` line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    /// Comment lines directly above the `p` line.
    pub previous_comments: Vec<String>,
    /// Canvas size, `w` and `h`.
    pub size: Size,
    /// `S`; a null rectangle means the whole canvas.
    pub crop: Rect,
    /// `f`
    pub projection: Projection,
    /// Horizontal field of view in degrees.
    pub field_of_view: f64,
    /// `n"..."`
    pub file_format: FileFormat,
    /// Output exposure value.
    pub exposure: f64,
    /// `R1`: blend to a high dynamic range output.
    pub hdr: bool,
    /// `T"..."`, written only when not 8 bit.
    pub bit_depth: BitDepth,
    /// Image whose exposure and white balance anchor the photometric fit.
    pub photometric_reference_id: usize,
    /// Tokens this model has no field for, kept verbatim.
    pub unmatched_parameters: Vec<String>,
}

// ---------------------------------------------------------------------------
// Stitcher (`m` line)
// ---------------------------------------------------------------------------

/// Remapping interpolator, with Hugin's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolator {
    #[default]
    Poly3,
    Spline16,
    Spline36,
    Sinc256,
    Spline64,
    Bilinear,
    NearestNeighbor,
    Sinc1024,
}

impl Interpolator {
    const ALL: [Self; 8] = [
        Self::Poly3,
        Self::Spline16,
        Self::Spline36,
        Self::Sinc256,
        Self::Spline64,
        Self::Bilinear,
        Self::NearestNeighbor,
        Self::Sinc1024,
    ];

    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }
}

/// Transform approximation used while remapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUp {
    Slow,
    Medium,
    #[default]
    Fast,
}

impl SpeedUp {
    /// The number written after `f` on the `m` line.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Fast => 0,
            Self::Medium => 1,
            Self::Slow => 2,
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Fast),
            1 => Some(Self::Medium),
            2 => Some(Self::Slow),
            _ => None,
        }
    }
}

/// Remapping settings, written as the `m` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stitcher {
    /// Comment lines directly above the `m` line.
    pub previous_comments: Vec<String>,
    /// Gamma of the source images.
    pub gamma: f64,
    /// `i`
    pub interpolator: Interpolator,
    /// `f`: how much precision the optimiser trades for speed.
    pub speed_up: SpeedUp,
    /// Huber loss sigma of the geometric optimiser.
    pub huber_sigma: f64,
    /// Huber loss sigma of the photometric optimiser.
    pub photometric_huber_sigma: f64,
    /// Tokens this model has no field for, kept verbatim.
    pub unmatched_parameters: Vec<String>,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self {
            previous_comments: Vec::new(),
            gamma: 1.0,
            interpolator: Interpolator::Poly3,
            speed_up: SpeedUp::Fast,
            huber_sigma: 0.0,
            photometric_huber_sigma: 0.0,
            unmatched_parameters: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Images (`i`, `v` and `k` lines)
// ---------------------------------------------------------------------------

/// Projection of a source image's lens, with Hugin's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LensProjection {
    #[default]
    Rectilinear,
    Panoramic,
    CircularFisheye,
    FullFrameFisheye,
    Equirectangular,
    FisheyeOrthographic,
    FisheyeStereographic,
    FisheyeEquisolid,
    FisheyeThoby,
}

impl LensProjection {
    /// The number written after `f` on an `i` line.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Rectilinear => 0,
            Self::Panoramic => 1,
            Self::CircularFisheye => 2,
            Self::FullFrameFisheye => 3,
            Self::Equirectangular => 4,
            Self::FisheyeOrthographic => 8,
            Self::FisheyeStereographic => 10,
            Self::FisheyeThoby => 20,
            Self::FisheyeEquisolid => 21,
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Rectilinear),
            1 => Some(Self::Panoramic),
            2 => Some(Self::CircularFisheye),
            3 => Some(Self::FullFrameFisheye),
            4 => Some(Self::Equirectangular),
            8 => Some(Self::FisheyeOrthographic),
            10 => Some(Self::FisheyeStereographic),
            20 => Some(Self::FisheyeThoby),
            21 => Some(Self::FisheyeEquisolid),
            _ => None,
        }
    }
}

/// How vignetting is modelled for an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VignettingCorrection {
    #[default]
    None,
    /// Polynomial falloff from `Va..Vd` around `Vx, Vy`.
    Radial,
    /// Division by the flatfield image named by `Vf`.
    Flatfield,
}

/// The `Vm` bit field: correction kind plus the "divide" flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VignettingMode {
    /// Which correction model the `Vm` flags select.
    pub correction: VignettingCorrection,
    /// Apply the correction by division instead of addition.
    pub divide: bool,
}

impl VignettingMode {
    const DIVIDE: u32 = 4;

    /// Radial correction applied by division, Hugin's usual `Vm5`.
    pub const RADIAL_DIVIDE: Self = Self {
        correction: VignettingCorrection::Radial,
        divide: true,
    };

    #[must_use]
    pub const fn code(self) -> u32 {
        let kind = match self.correction {
            VignettingCorrection::None => 0,
            VignettingCorrection::Radial => 1,
            VignettingCorrection::Flatfield => 2,
        };
        if self.divide { kind | Self::DIVIDE } else { kind }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        let correction = match code & !Self::DIVIDE {
            0 => VignettingCorrection::None,
            1 => VignettingCorrection::Radial,
            2 => VignettingCorrection::Flatfield,
            _ => return None,
        };
        Some(Self {
            correction,
            divide: code & Self::DIVIDE != 0,
        })
    }
}

/// Whether a mask excludes or forces the pixels inside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskType {
    /// Exclude the area from this image.
    #[default]
    Negative,
    /// Force the area of this image into the output.
    Positive,
    /// Exclude the area from every image of the stack.
    NegativeStack,
    /// Force the area of every image of the stack.
    PositiveStack,
    /// Exclude the area from every image shot with the same lens.
    NegativeLens,
}

impl MaskType {
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Negative),
            1 => Some(Self::Positive),
            2 => Some(Self::NegativeStack),
            3 => Some(Self::PositiveStack),
            4 => Some(Self::NegativeLens),
            _ => None,
        }
    }
}

/// A polygonal mask on one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mask {
    /// Comment lines directly above the `k` line.
    pub previous_comments: Vec<String>,
    /// `t`
    pub mask_type: MaskType,
    /// Polygon vertices in image pixel coordinates.
    pub hull: Vec<(f64, f64)>,
}

/// A variable the optimiser is allowed to change.
///
/// The declaration order is the order `v` lines are written in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum OptimisationParameter {
    LensA,
    LensB,
    LensC,
    LensD,
    LensE,
    LensHfov,
    LensYaw,
    LensPitch,
    LensRoll,
    Exposure,
    WhiteBalanceRed,
    WhiteBalanceBlue,
    VignettingA,
    VignettingB,
    VignettingC,
    VignettingD,
    VignettingX,
    VignettingY,
    EmorA,
    EmorB,
    EmorC,
    EmorD,
    EmorE,
    /// A variable name this model does not know. Cannot be written back.
    Unknown,
}

impl OptimisationParameter {
    const NAMED: [(Self, &'static str); 23] = [
        (Self::LensA, "a"),
        (Self::LensB, "b"),
        (Self::LensC, "c"),
        (Self::LensD, "d"),
        (Self::LensE, "e"),
        (Self::LensHfov, "v"),
        (Self::LensYaw, "y"),
        (Self::LensPitch, "p"),
        (Self::LensRoll, "r"),
        (Self::Exposure, "Eev"),
        (Self::WhiteBalanceRed, "Er"),
        (Self::WhiteBalanceBlue, "Eb"),
        (Self::VignettingA, "Va"),
        (Self::VignettingB, "Vb"),
        (Self::VignettingC, "Vc"),
        (Self::VignettingD, "Vd"),
        (Self::VignettingX, "Vx"),
        (Self::VignettingY, "Vy"),
        (Self::EmorA, "Ra"),
        (Self::EmorB, "Rb"),
        (Self::EmorC, "Rc"),
        (Self::EmorD, "Rd"),
        (Self::EmorE, "Re"),
    ];

    /// The variable name used on `v` lines, `None` for [`Self::Unknown`].
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(parameter, _)| *parameter == self)
            .map(|(_, name)| *name)
    }

    /// Map a `v` line variable name; unknown names give [`Self::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::NAMED
            .iter()
            .find(|(_, known)| *known == name)
            .map_or(Self::Unknown, |(parameter, _)| *parameter)
    }
}

/// One `v` line entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimisation {
    /// Comment lines directly above the `v` line.
    pub previous_comments: Vec<String>,
    /// The variable left free for the optimiser.
    pub parameter: OptimisationParameter,
}

impl Optimisation {
    #[must_use]
    pub const fn new(parameter: OptimisationParameter) -> Self {
        Self {
            previous_comments: Vec::new(),
            parameter,
        }
    }
}

/// A source image and its camera model, written as an `i` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Comment lines above the `i` line, including Hugin's `#-hugin` hints.
    pub previous_comments: Vec<String>,
    /// Pixel size of the source file.
    pub size: Size,
    /// The `k` lines referring to this image.
    pub masks: Vec<Mask>,
    /// Free variables, kept in [`OptimisationParameter`] order.
    pub optimisation_parameters: Vec<Optimisation>,
    /// `f`
    pub lens_projection: LensProjection,
    /// Horizontal field of view in degrees.
    pub field_of_view: LensParameter<f64>,
    /// `y`, degrees.
    pub yaw: f64,
    /// `p`, degrees.
    pub pitch: f64,
    /// `r`, degrees.
    pub roll: f64,
    /// Radial distortion `a`.
    pub lens_barrel_coefficient_a: LensParameter<f64>,
    /// Radial distortion `b`.
    pub lens_barrel_coefficient_b: LensParameter<f64>,
    /// Radial distortion `c`.
    pub lens_barrel_coefficient_c: LensParameter<f64>,
    /// Optical centre shift `d`, pixels.
    pub lens_center_offset_x: LensParameter<f64>,
    /// Optical centre shift `e`, pixels.
    pub lens_center_offset_y: LensParameter<f64>,
    /// `g`
    pub lens_shear_x: LensParameter<f64>,
    /// `t`
    pub lens_shear_y: LensParameter<f64>,
    /// `Eev`, exposure value.
    pub exposure: LensParameter<f64>,
    /// `Er`, red channel multiplier.
    pub white_balance_red: LensParameter<f64>,
    /// `Eb`, blue channel multiplier.
    pub white_balance_blue: LensParameter<f64>,
    /// `Vm`
    pub vignetting_mode: LensParameter<VignettingMode>,
    /// `Va`, first coefficient of the radial vignetting polynomial.
    pub vignetting_correction_i: LensParameter<f64>,
    /// `Vb`
    pub vignetting_correction_j: LensParameter<f64>,
    /// `Vc`
    pub vignetting_correction_k: LensParameter<f64>,
    /// `Vd`
    pub vignetting_correction_l: LensParameter<f64>,
    /// `Vx`, vignetting centre shift in pixels.
    pub vignetting_offset_x: LensParameter<f64>,
    /// `Vy`, vignetting centre shift in pixels.
    pub vignetting_offset_y: LensParameter<f64>,
    /// `Vf`, used by flatfield vignetting correction. Empty when unset.
    pub vignetting_flatfield_image_name: String,
    /// `Ra`, first coefficient of the EMoR camera response curve.
    pub photometric_emor_a: LensParameter<f64>,
    /// `Rb`
    pub photometric_emor_b: LensParameter<f64>,
    /// `Rc`
    pub photometric_emor_c: LensParameter<f64>,
    /// `Rd`
    pub photometric_emor_d: LensParameter<f64>,
    /// `Re`
    pub photometric_emor_e: LensParameter<f64>,
    /// `TrX`, mosaic camera translation.
    pub mosaic_camera_position_x: f64,
    /// `TrY`
    pub mosaic_camera_position_y: f64,
    /// `TrZ`
    pub mosaic_camera_position_z: f64,
    /// Written only for [`Version::V2014`].
    pub mosaic_projection_plane_yaw: f64,
    /// Written only for [`Version::V2014`].
    pub mosaic_projection_plane_pitch: f64,
    /// `S`, crop in source pixels; a null rectangle means uncropped.
    pub crop: Rect,
    /// `j`, bracketed stack the image belongs to.
    pub stack_number: LensParameter<i32>,
    /// `n"..."`, relative to the project's directory or absolute.
    pub file_name: String,
    /// Tokens this model has no field for, kept verbatim.
    pub unmatched_parameters: Vec<String>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            previous_comments: Vec::new(),
            size: Size::default(),
            masks: Vec::new(),
            optimisation_parameters: Vec::new(),
            lens_projection: LensProjection::Rectilinear,
            field_of_view: LensParameter::default(),
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            lens_barrel_coefficient_a: LensParameter::default(),
            lens_barrel_coefficient_b: LensParameter::default(),
            lens_barrel_coefficient_c: LensParameter::default(),
            lens_center_offset_x: LensParameter::default(),
            lens_center_offset_y: LensParameter::default(),
            lens_shear_x: LensParameter::default(),
            lens_shear_y: LensParameter::default(),
            exposure: LensParameter::default(),
            white_balance_red: LensParameter::Value(1.0),
            white_balance_blue: LensParameter::Value(1.0),
            vignetting_mode: LensParameter::default(),
            vignetting_correction_i: LensParameter::default(),
            vignetting_correction_j: LensParameter::default(),
            vignetting_correction_k: LensParameter::default(),
            vignetting_correction_l: LensParameter::default(),
            vignetting_offset_x: LensParameter::default(),
            vignetting_offset_y: LensParameter::default(),
            vignetting_flatfield_image_name: String::new(),
            photometric_emor_a: LensParameter::default(),
            photometric_emor_b: LensParameter::default(),
            photometric_emor_c: LensParameter::default(),
            photometric_emor_d: LensParameter::default(),
            photometric_emor_e: LensParameter::default(),
            mosaic_camera_position_x: 0.0,
            mosaic_camera_position_y: 0.0,
            mosaic_camera_position_z: 0.0,
            mosaic_projection_plane_yaw: 0.0,
            mosaic_projection_plane_pitch: 0.0,
            crop: Rect::default(),
            stack_number: LensParameter::default(),
            file_name: String::new(),
            unmatched_parameters: Vec::new(),
        }
    }
}

impl Image {
    /// An image with Hugin's defaults for the given file and pixel size.
    #[must_use]
    pub fn new(file_name: impl Into<String>, size: Size) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            ..Self::default()
        }
    }

    /// Mark `parameter` as free for the optimiser.
    ///
    /// The list stays sorted in declaration order; adding a parameter
    /// twice has no effect.
    pub fn optimise(&mut self, parameter: OptimisationParameter) {
        self.insert_optimisation(Optimisation::new(parameter));
    }

    pub(crate) fn insert_optimisation(&mut self, optimisation: Optimisation) {
        match self
            .optimisation_parameters
            .binary_search_by(|entry| entry.parameter.cmp(&optimisation.parameter))
        {
            Ok(_) if optimisation.parameter != OptimisationParameter::Unknown => {}
            Ok(index) | Err(index) => self.optimisation_parameters.insert(index, optimisation),
        }
    }

    /// Whether `parameter` is free for the optimiser.
    #[must_use]
    pub fn is_optimised(&self, parameter: OptimisationParameter) -> bool {
        self.optimisation_parameters
            .iter()
            .any(|optimisation| optimisation.parameter == parameter)
    }
}

// ---------------------------------------------------------------------------
// Control points (`c` lines)
// ---------------------------------------------------------------------------

/// A pair of matching pixel positions in two images.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Comment lines directly above the `c` line.
    pub previous_comments: Vec<String>,
    /// `n`, index of the first image.
    pub image1_id: usize,
    /// `N`, index of the second image.
    pub image2_id: usize,
    /// `x`, pixel column in the first image.
    pub p1_x: f64,
    /// `y`
    pub p1_y: f64,
    /// `X`, pixel column in the second image.
    pub p2_x: f64,
    /// `Y`
    pub p2_y: f64,
    /// 0 for a normal point, 1-2 for horizontal/vertical lines, higher for line groups.
    pub kind: i32,
    /// Tokens this model has no field for, kept verbatim.
    pub unmatched_parameters: Vec<String>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A whole PTO project file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PtoDocument {
    /// The `p` line.
    pub project: Project,
    /// The `m` line.
    pub stitcher: Stitcher,
    /// Source images; an image's id is its index here.
    pub images: Vec<Image>,
    /// All `c` lines, in file order.
    pub control_points: Vec<ControlPoint>,
    /// Comments after the last entity.
    pub last_comments: Vec<String>,
    /// Dialect used when writing.
    pub version: Version,
}

impl PtoDocument {
    /// An empty project for the given dialect.
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }
}

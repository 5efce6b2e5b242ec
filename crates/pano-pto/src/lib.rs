//! pano-pto: Hugin PTO project files.
//!
//! A PTO file describes a panorama: the output canvas (`p`), the
//! remapper settings (`m`), every source image with its camera model
//! (`i`), which variables the optimiser may change (`v`), image masks
//! (`k`) and control points (`c`).
//!
//! [`parse`] and [`to_pto`] convert between text and [`PtoDocument`]
//! without touching the filesystem; [`PtoDocument::open_file`] and
//! [`PtoDocument::create_file`] are thin wrappers doing the I/O.

pub mod error;
pub mod format;
pub mod parse;
pub mod types;
pub mod write;

use std::fs;
use std::path::Path;

pub use error::PtoError;
pub use parse::parse;
pub use types::{
    BitDepth, Compression, ControlPoint, FileFormat, FileType, Image, Interpolator, LensParameter,
    LensProjection, LensValue, Mask, MaskType, Optimisation, OptimisationParameter, Project,
    Projection, PtoDocument, Rect, Size, SpeedUp, Stitcher, Version, VignettingCorrection,
    VignettingMode,
};
pub use write::to_pto;

impl PtoDocument {
    /// Read and parse a PTO file written by the given Hugin version.
    ///
    /// # Errors
    ///
    /// Returns [`PtoError::Io`] if the file cannot be read and
    /// [`PtoError::Parse`] if its contents are malformed.
    pub fn open_file(path: impl AsRef<Path>, hugin_version: &str) -> Result<Self, PtoError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PtoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&text, Version::from_hugin_version(hugin_version))
    }

    /// Serialize the document and write it to `path`.
    ///
    /// Nothing is written when serialization fails.
    ///
    /// # Errors
    ///
    /// Returns [`PtoError::UnknownOptimisationParameter`] if the document
    /// cannot be serialized and [`PtoError::Io`] if the file cannot be
    /// written.
    pub fn create_file(&self, path: impl AsRef<Path>) -> Result<(), PtoError> {
        let path = path.as_ref();
        let text = to_pto(self)?;
        fs::write(path, text).map_err(|source| PtoError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

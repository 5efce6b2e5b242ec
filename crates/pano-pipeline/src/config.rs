//! Tool locations and stitching options.
//!
//! Both structs deserialize from partial JSON: missing fields take their
//! defaults, so `{"options": {"celeste": true}}` is a complete config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::PanoramaFileType;
use crate::process::{ProcessRunner, query_version, version_major};

/// Paths (or bare names looked up on `PATH`) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryPaths {
    /// Control point detector.
    pub cpfind: PathBuf,
    /// Control point cleaner, drops outliers after `cpfind`.
    pub cpclean: PathBuf,
    /// Position, lens and photometric optimiser. Also asked for the Hugin
    /// version.
    pub autooptimiser: PathBuf,
    /// Sets the canvas and crop of an optimised project.
    pub pano_modify: PathBuf,
    /// Remapper, called from the `pto2mk` makefile.
    pub nona: PathBuf,
    /// Blender, called from the `pto2mk` makefile.
    pub enblend: PathBuf,
    /// Runs the `pto2mk` makefile.
    pub make: PathBuf,
    /// Writes the stitching makefile on Hugin releases before 2015.
    pub pto2mk: PathBuf,
    /// One-call stitcher of Hugin 2015 and later.
    pub hugin_executor: PathBuf,
    /// RAW decoder accepting `-T -Z <output.tif> <input>` (libraw's `dcraw_emu`).
    pub raw_converter: PathBuf,
}

impl Default for BinaryPaths {
    fn default() -> Self {
        Self {
            cpfind: "cpfind".into(),
            cpclean: "cpclean".into(),
            autooptimiser: "autooptimiser".into(),
            pano_modify: "pano_modify".into(),
            nona: "nona".into(),
            enblend: "enblend".into(),
            make: "make".into(),
            pto2mk: "pto2mk".into(),
            hugin_executor: "hugin_executor".into(),
            raw_converter: "dcraw_emu".into(),
        }
    }
}

/// Choices the user makes about the panorama.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoOptions {
    /// Container of the stitched panorama.
    pub file_type: PanoramaFileType,
    /// Let `cpfind` drop control points on clouds.
    pub celeste: bool,
    /// Let `autooptimiser` straighten the horizon.
    pub level_horizon: bool,
    /// Build a full 360x180 photo sphere.
    pub gpano: bool,
    /// Keep the project file (and converted RAW files) next to the result.
    pub save_pto: bool,
    /// Hugin version the project files are written for. Asked from
    /// `autooptimiser` when absent.
    pub hugin_version: Option<String>,
    /// Stitch with `hugin_executor` instead of `pto2mk` + `make`. Defaults
    /// to true for Hugin 2015 and later.
    pub use_hugin_executor: Option<bool>,
}

impl Default for PanoOptions {
    fn default() -> Self {
        Self {
            file_type: PanoramaFileType::Jpeg,
            celeste: false,
            level_horizon: true,
            gpano: false,
            save_pto: false,
            hugin_version: None,
            use_hugin_executor: None,
        }
    }
}

/// Complete configuration of a [`PanoManager`](crate::PanoManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoConfig {
    /// Where the Hugin tools are.
    pub binaries: BinaryPaths,
    /// What to build.
    pub options: PanoOptions,
}

impl PanoConfig {
    /// Fill in the Hugin version and stitching strategy by asking the
    /// installed tools, keeping anything already set.
    pub fn resolve(&mut self, runner: &dyn ProcessRunner) {
        if self.options.hugin_version.is_none() {
            self.options.hugin_version = query_version(runner, &self.binaries.autooptimiser);
        }
        if self.options.use_hugin_executor.is_none() {
            self.options.use_hugin_executor = Some(self.hugin_major() >= Some(2015));
        }
    }

    /// The Hugin version string, or the empty string when unknown.
    #[must_use]
    pub fn hugin_version(&self) -> &str {
        self.options.hugin_version.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn hugin_major(&self) -> Option<u32> {
        version_major(self.hugin_version())
    }

    /// Whether `hugin_executor` does the stitching.
    #[must_use]
    pub fn use_hugin_executor(&self) -> bool {
        self.options
            .use_hugin_executor
            .unwrap_or_else(|| self.hugin_major() >= Some(2015))
    }
}

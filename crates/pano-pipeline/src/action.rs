//! What the pipeline reports while it runs.

use serde::{Deserialize, Serialize};

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanoAction {
    #[default]
    None,
    PreprocessInput,
    CreatePto,
    Cpfind,
    Cpclean,
    Optimize,
    Autocrop,
    CreatePreviewPto,
    CreateMk,
    CreateMkPreview,
    CreateFinalPto,
    NonaFile,
    NonaFilePreview,
    Stitch,
    StitchPreview,
    HuginExecutor,
    HuginExecutorPreview,
    Copy,
}

impl PanoAction {
    /// Short human readable description used in progress logs.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::None => "idle",
            Self::PreprocessInput => "preprocessing input image",
            Self::CreatePto => "creating base project",
            Self::Cpfind => "finding control points",
            Self::Cpclean => "cleaning control points",
            Self::Optimize => "optimising positions",
            Self::Autocrop => "computing crop",
            Self::CreatePreviewPto => "creating preview project",
            Self::CreateMk | Self::CreateMkPreview => "creating makefile",
            Self::CreateFinalPto => "creating final project",
            Self::NonaFile | Self::NonaFilePreview => "remapping image",
            Self::Stitch | Self::StitchPreview => "blending",
            Self::HuginExecutor | Self::HuginExecutorPreview => "stitching",
            Self::Copy => "copying results",
        }
    }
}

/// Payload of every [`PanoEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    pub action: PanoAction,
    /// Image index for per-image tasks.
    pub id: Option<usize>,
    pub success: bool,
    /// Failure description; empty on success.
    pub message: String,
}

/// Progress notification delivered on the scheduler's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanoEvent {
    /// A task is about to run.
    Starting(ActionData),
    /// A task that is not the last of its job finished.
    StepFinished(ActionData),
    /// A task of the last step of its job finished.
    JobCollectionFinished(ActionData),
}

impl PanoEvent {
    #[must_use]
    pub const fn data(&self) -> &ActionData {
        match self {
            Self::Starting(data) | Self::StepFinished(data) | Self::JobCollectionFinished(data) => {
                data
            }
        }
    }

    /// True for the two "finished" kinds.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Starting(_))
    }

    /// A finished event reporting failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.is_finished() && !self.data().success
    }
}

/// Container of the final panorama.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanoramaFileType {
    #[default]
    Jpeg,
    Tiff,
    Hdr,
}

impl PanoramaFileType {
    /// File extension of the stitched output.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
            Self::Hdr => "hdr",
        }
    }
}

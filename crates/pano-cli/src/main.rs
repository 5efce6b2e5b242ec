//! pano: inspect Hugin project files and stitch panoramas from the
//! command line.
//!
//! # Usage
//!
//! ```text
//! pano inspect project.pto [--json]
//! pano rewrite in.pto out.pto
//! pano stitch IMG_01.jpg IMG_02.jpg IMG_03.jpg --output panorama.jpg
//! ```
//!
//! `stitch` needs the Hugin tools (`cpfind`, `autooptimiser`,
//! `pano_modify`, `hugin_executor` or `pto2mk`/`nona`/`enblend`) on
//! `PATH`, or their locations in `--config-json`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use pano_pipeline::{PanoConfig, PanoEvent, PanoManager, PanoramaFileType, SystemRunner};
use pano_pto::{LensParameter, PtoDocument, Rect};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Hugin version assumed when reading a project without `--hugin-version`.
const DEFAULT_HUGIN_VERSION: &str = "2019.2.0";

/// Hugin panorama projects and stitching.
#[derive(Parser)]
#[command(name = "pano", version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarise a project file.
    Inspect {
        pto: PathBuf,

        /// Hugin version that wrote the file.
        #[arg(long, default_value = DEFAULT_HUGIN_VERSION)]
        hugin_version: String,

        /// Dump the whole document as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Parse a project file and write it back.
    Rewrite {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, default_value = DEFAULT_HUGIN_VERSION)]
        hugin_version: String,
    },

    /// Stitch images into a panorama.
    Stitch(StitchArgs),
}

#[derive(Args)]
struct StitchArgs {
    /// Source images, JPEG, PNG, TIFF or camera RAW.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Where to write the panorama. Must not exist.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = FileTypeArg::Jpeg)]
    file_type: FileTypeArg,

    /// Remove control points on clouds.
    #[arg(long)]
    celeste: bool,

    /// Keep the horizon as the optimiser leaves it.
    #[arg(long)]
    no_level_horizon: bool,

    /// Full 360x180 photo sphere.
    #[arg(long)]
    gpano: bool,

    /// Keep the project file next to the panorama.
    #[arg(long)]
    save_pto: bool,

    /// Also write a small preview here.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Crop of the final panorama as `left,right,top,bottom`, in pixels.
    #[arg(long, value_parser = parse_crop)]
    crop: Option<Rect>,

    /// Hugin version of the installed tools; asked from them when absent.
    #[arg(long)]
    hugin_version: Option<String>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other option flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FileTypeArg {
    Jpeg,
    Tiff,
    Hdr,
}

impl From<FileTypeArg> for PanoramaFileType {
    fn from(value: FileTypeArg) -> Self {
        match value {
            FileTypeArg::Jpeg => Self::Jpeg,
            FileTypeArg::Tiff => Self::Tiff,
            FileTypeArg::Hdr => Self::Hdr,
        }
    }
}

fn parse_crop(text: &str) -> Result<Rect, String> {
    let edges: Vec<i64> = text
        .split(',')
        .map(|edge| edge.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid crop edge: {e}"))?;
    match edges[..] {
        [left, right, top, bottom] => Ok(Rect::new(left, right, top, bottom)),
        _ => Err(format!("expected 4 edges, got {}", edges.len())),
    }
}

/// Build a [`PanoConfig`] from the stitch arguments.
///
/// If `--config-json` is provided it is parsed directly and the option
/// flags are ignored.
fn config_from_cli(args: &StitchArgs) -> anyhow::Result<PanoConfig> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }

    let mut config = PanoConfig::default();
    let options = &mut config.options;
    options.file_type = args.file_type.into();
    options.celeste = args.celeste;
    options.level_horizon = !args.no_level_horizon;
    options.gpano = args.gpano;
    options.save_pto = args.save_pto;
    options.hugin_version.clone_from(&args.hugin_version);
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Inspect {
            pto,
            hugin_version,
            json,
        } => {
            let document = PtoDocument::open_file(&pto, &hugin_version)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print!("{}", summary(&document));
            }
            Ok(())
        }
        Command::Rewrite {
            input,
            output,
            hugin_version,
        } => {
            let document = PtoDocument::open_file(&input, &hugin_version)?;
            document.create_file(&output)?;
            eprintln!(
                "{} images, {} control points written to {}",
                document.images.len(),
                document.control_points.len(),
                output.display()
            );
            Ok(())
        }
        Command::Stitch(args) => stitch(&args),
    }
}

// --- stitch ---

fn stitch(args: &StitchArgs) -> anyhow::Result<()> {
    if args.output.exists() {
        bail!("{} already exists", args.output.display());
    }
    let config = config_from_cli(args)?;

    let mut manager = PanoManager::new(config, Arc::new(SystemRunner::default()))?;
    debug!(work_dir = ?manager.scheduler().work_dir(), "starting");

    let outputs = manager.preprocess(&args.images)?;
    debug!(pto = %outputs.cp_clean_pto.display(), "preprocessing queued");
    manager.wait(report)?;

    manager.optimise()?;
    manager.wait(report)?;

    if let Some(ref preview) = args.preview {
        let stitched = manager.preview()?.panorama.clone();
        manager.wait(report)?;
        copy_preview(&stitched, preview)?;
    }

    manager.compile(args.crop)?;
    manager.wait(report)?;

    manager.copy_files(args.output.clone())?;
    manager.wait(report)?;
    info!(panorama = %args.output.display(), "done");
    Ok(())
}

fn copy_preview(stitched: &Path, preview: &Path) -> anyhow::Result<()> {
    std::fs::copy(stitched, preview)
        .with_context(|| format!("copying preview to {}", preview.display()))?;
    info!(preview = %preview.display(), "preview written");
    Ok(())
}

fn report(event: &PanoEvent) {
    let data = event.data();
    let id = data.id.map(|id| format!(" #{id}")).unwrap_or_default();
    match event {
        PanoEvent::Starting(_) => info!("{}{id}", data.action.describe()),
        _ if data.success => debug!(action = ?data.action, "finished{id}"),
        _ => error!(action = ?data.action, "{}{id}: {}", data.action.describe(), data.message),
    }
}

// --- inspect ---

fn summary(document: &PtoDocument) -> String {
    let project = &document.project;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Projection:     {:?}, {} degrees",
        project.projection, project.field_of_view
    );
    let _ = writeln!(
        out,
        "Canvas:         {}x{}",
        project.size.width, project.size.height
    );
    if !project.crop.is_null() {
        let crop = project.crop;
        let _ = writeln!(
            out,
            "Crop:           {},{} - {},{} ({}x{})",
            crop.left,
            crop.top,
            crop.right,
            crop.bottom,
            crop.width(),
            crop.height()
        );
    }
    let _ = writeln!(
        out,
        "Output:         {}{}",
        project.file_format.file_type.name(),
        if project.hdr { " (HDR)" } else { "" }
    );
    let _ = writeln!(out, "Control points: {}", document.control_points.len());
    let _ = writeln!(out, "Images:         {}", document.images.len());

    for (index, image) in document.images.iter().enumerate() {
        let field_of_view = match image.field_of_view {
            LensParameter::Value(value) => format!("{value}"),
            LensParameter::Reference(owner) => format!("= image {owner}"),
        };
        let optimised: Vec<&str> = image
            .optimisation_parameters
            .iter()
            .filter_map(|optimisation| optimisation.parameter.name())
            .collect();
        let _ = writeln!(
            out,
            "  [{index}] {} {}x{} fov {field_of_view} y{} p{} r{}{}",
            image.file_name,
            image.size.width,
            image.size.height,
            image.yaw,
            image.pitch,
            image.roll,
            if optimised.is_empty() {
                String::new()
            } else {
                format!(" optimise {}", optimised.join(" "))
            }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use pano_pto::{Image, OptimisationParameter, Size, Version};

    use super::*;

    fn stitch_args(extra: &[&str]) -> StitchArgs {
        let mut argv = vec!["pano", "stitch", "a.jpg", "b.jpg", "-o", "out.jpg"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Stitch(args) => args,
            _ => unreachable!("parsed a stitch command"),
        }
    }

    #[test]
    fn flags_build_config() {
        let args = stitch_args(&["--file-type", "tiff", "--celeste", "--no-level-horizon"]);
        let config = config_from_cli(&args).unwrap();
        assert_eq!(config.options.file_type, PanoramaFileType::Tiff);
        assert!(config.options.celeste);
        assert!(!config.options.level_horizon);
        assert!(config.options.hugin_version.is_none());
    }

    #[test]
    fn json_config_overrides_flags() {
        let args = stitch_args(&[
            "--celeste",
            "--config-json",
            r#"{"options": {"gpano": true}, "binaries": {"cpfind": "/opt/hugin/cpfind"}}"#,
        ]);
        let config = config_from_cli(&args).unwrap();
        assert!(config.options.gpano);
        assert!(!config.options.celeste);
        assert_eq!(config.binaries.cpfind, Path::new("/opt/hugin/cpfind"));
    }

    #[test]
    fn crop_argument() {
        assert_eq!(parse_crop("10, 990,5,495"), Ok(Rect::new(10, 990, 5, 495)));
        assert!(parse_crop("1,2,3").is_err());
        assert!(parse_crop("1,2,x,4").is_err());
    }

    #[test]
    fn summary_lists_images() {
        let mut document = PtoDocument::new(Version::V2014);
        document.project.size = Size::new(4000, 2000);
        let mut first = Image::new("a.jpg", Size::new(3000, 2000));
        first.field_of_view = LensParameter::Value(65.5);
        first.optimise(OptimisationParameter::LensYaw);
        let mut second = Image::new("b.jpg", Size::new(3000, 2000));
        second.field_of_view = LensParameter::Reference(0);
        document.images = vec![first, second];

        let text = summary(&document);
        assert!(text.contains("Canvas:         4000x2000"));
        assert!(text.contains("[0] a.jpg 3000x2000 fov 65.5 y0 p0 r0 optimise y"));
        assert!(text.contains("[1] b.jpg 3000x2000 fov = image 0"));
    }
}

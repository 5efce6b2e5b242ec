//! Job plans: the task graphs the scheduler executes.
//!
//! A plan is a DAG of [`PanoTask`]s built step by step. Every task of a
//! step depends on every task of the step before it, so a step of several
//! tasks is a collection that runs in parallel and the next step waits for
//! all of it.
//!
//! The constructors at the bottom of this module lay out one plan per
//! pipeline stage, with the standard file names inside the work directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pano_pto::{PtoDocument, Rect, Version};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::action::PanoAction;
use crate::config::PanoConfig;
use crate::tasks::{
    AutoCropTask, CompileMkStepTask, CompileMkTask, CopyFilesTask, CpCleanTask, CpFindTask,
    CreateFinalPtoTask, CreateMkTask, CreatePreviewTask, CreatePtoTask, HuginExecutorTask,
    MakeTools, OptimisationTask, PanoTask, PreProcessTask, PreprocessedMap, PreprocessedUrls,
    Stitching,
};

// --- Graph ---

struct PlannedTask {
    action: PanoAction,
    id: Option<usize>,
    /// Taken out once handed to the pool.
    task: Option<Box<dyn PanoTask>>,
    /// Part of the final step: reports `JobCollectionFinished`.
    last: bool,
}

/// A task whose predecessors all succeeded.
pub(crate) struct ReadyTask {
    pub node: NodeIndex,
    pub task: Box<dyn PanoTask>,
    pub last: bool,
}

/// Dependency graph of the tasks of one pipeline stage.
pub struct JobPlan {
    name: &'static str,
    graph: DiGraph<PlannedTask, ()>,
}

impl JobPlan {
    #[must_use]
    pub fn builder(name: &'static str) -> JobPlanBuilder {
        JobPlanBuilder {
            name,
            graph: DiGraph::new(),
            previous: Vec::new(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Actions of the plan grouped by step, in execution order.
    #[must_use]
    pub fn steps(&self) -> Vec<Vec<PanoAction>> {
        let order = toposort(&self.graph, None).unwrap_or_default();
        let mut depth = vec![0_usize; self.graph.node_count()];
        let mut steps: Vec<Vec<PanoAction>> = Vec::new();
        for node in order {
            let level = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|parent| depth[parent.index()] + 1)
                .max()
                .unwrap_or(0);
            depth[node.index()] = level;
            if steps.len() <= level {
                steps.resize_with(level + 1, Vec::new);
            }
            steps[level].push(self.graph[node].action);
        }
        steps
    }

    /// Image ids of the tasks performing `action`.
    #[must_use]
    pub fn ids(&self, action: PanoAction) -> Vec<Option<usize>> {
        self.graph
            .node_weights()
            .filter(|planned| planned.action == action)
            .map(|planned| planned.id)
            .collect()
    }

    /// Hand out every task not yet run whose predecessors are all in
    /// `succeeded`.
    pub(crate) fn take_ready(&mut self, succeeded: &HashSet<NodeIndex>) -> Vec<ReadyTask> {
        let ready: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&node| {
                self.graph[node].task.is_some()
                    && self
                        .graph
                        .neighbors_directed(node, Direction::Incoming)
                        .all(|parent| succeeded.contains(&parent))
            })
            .collect();

        ready
            .into_iter()
            .filter_map(|node| {
                let planned = &mut self.graph[node];
                planned.task.take().map(|task| ReadyTask {
                    node,
                    task,
                    last: planned.last,
                })
            })
            .collect()
    }
}

/// Builds a [`JobPlan`] one step at a time.
pub struct JobPlanBuilder {
    name: &'static str,
    graph: DiGraph<PlannedTask, ()>,
    previous: Vec<NodeIndex>,
}

impl JobPlanBuilder {
    /// Append a step made of a single task.
    #[must_use]
    pub fn then(self, task: impl PanoTask + 'static) -> Self {
        self.then_all([Box::new(task) as Box<dyn PanoTask>])
    }

    /// Append a step of tasks that run in parallel. An empty step is
    /// skipped.
    #[must_use]
    pub fn then_all(mut self, tasks: impl IntoIterator<Item = Box<dyn PanoTask>>) -> Self {
        let step: Vec<NodeIndex> = tasks
            .into_iter()
            .map(|task| {
                self.graph.add_node(PlannedTask {
                    action: task.action(),
                    id: task.id(),
                    task: Some(task),
                    last: false,
                })
            })
            .collect();
        if step.is_empty() {
            return self;
        }
        for &from in &self.previous {
            for &to in &step {
                self.graph.add_edge(from, to, ());
            }
        }
        self.previous = step;
        self
    }

    #[must_use]
    pub fn build(mut self) -> JobPlan {
        for &node in &self.previous {
            self.graph[node].last = true;
        }
        JobPlan {
            name: self.name,
            graph: self.graph,
        }
    }
}

// --- File names ---

pub const BASE_PTO: &str = "pano_base.pto";
pub const CP_FIND_PTO: &str = "cp_pano.pto";
pub const CP_CLEAN_PTO: &str = "cp_pano_clean.pto";
pub const AUTO_OPTIMISED_PTO: &str = "auto_op_pano.pto";
pub const VIEW_CROP_PTO: &str = "view_crop_pano.pto";
pub const PREVIEW_PREFIX: &str = "preview";
pub const PANORAMA_PREFIX: &str = "panorama";

// --- Stage plans ---

/// Files produced by the preprocessing plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessOutputs {
    /// The inputs in the order they were queued, as absolute paths.
    pub inputs: Vec<PathBuf>,
    /// Converted file and preview of every input, keyed by input.
    pub preprocessed: PreprocessedMap,
    /// Project created from the inputs.
    pub base_pto: PathBuf,
    /// Project with the control points found by `cpfind`.
    pub cp_find_pto: PathBuf,
    /// Project after `cpclean`.
    pub cp_clean_pto: PathBuf,
}

/// Files produced by the optimisation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimiseOutputs {
    /// Project after `autooptimiser`.
    pub auto_optimised_pto: PathBuf,
    /// Project with canvas and crop set by `pano_modify`.
    pub view_crop_pto: PathBuf,
}

/// Files produced by a stitching plan, preview or final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchOutputs {
    /// Project the panorama is stitched from.
    pub pto: PathBuf,
    /// Stitched result inside the work directory.
    pub panorama: PathBuf,
}

/// `[PreProcess × N] → CreatePto → CpFind → CpClean`
#[must_use]
pub fn preprocess(
    config: &PanoConfig,
    work_dir: &Path,
    inputs: &[PathBuf],
) -> (JobPlan, PreprocessOutputs) {
    let preprocessed: PreprocessedMap = inputs
        .iter()
        .enumerate()
        .map(|(id, input)| (input.clone(), PreprocessedUrls::plan(work_dir, id, input)))
        .collect();
    let outputs = PreprocessOutputs {
        inputs: inputs.to_vec(),
        preprocessed: preprocessed.clone(),
        base_pto: work_dir.join(BASE_PTO),
        cp_find_pto: work_dir.join(CP_FIND_PTO),
        cp_clean_pto: work_dir.join(CP_CLEAN_PTO),
    };

    let binaries = &config.binaries;
    let options = &config.options;
    let preprocessing = inputs.iter().enumerate().map(|(id, input)| {
        Box::new(PreProcessTask::new(
            id,
            input.clone(),
            PreprocessedUrls::plan(work_dir, id, input),
            binaries.raw_converter.clone(),
        )) as Box<dyn PanoTask>
    });

    let plan = JobPlan::builder("preprocess")
        .then_all(preprocessing)
        .then(CreatePtoTask::new(
            outputs.base_pto.clone(),
            options.file_type,
            inputs.to_vec(),
            preprocessed,
            options.gpano,
            version(config),
        ))
        .then(CpFindTask::new(
            outputs.base_pto.clone(),
            outputs.cp_find_pto.clone(),
            options.celeste,
            binaries.cpfind.clone(),
        ))
        .then(CpCleanTask::new(
            outputs.cp_find_pto.clone(),
            outputs.cp_clean_pto.clone(),
            binaries.cpclean.clone(),
        ))
        .build();
    (plan, outputs)
}

/// `Optimisation → AutoCrop`
#[must_use]
pub fn optimise(config: &PanoConfig, work_dir: &Path, cp_clean_pto: &Path) -> (JobPlan, OptimiseOutputs) {
    let outputs = OptimiseOutputs {
        auto_optimised_pto: work_dir.join(AUTO_OPTIMISED_PTO),
        view_crop_pto: work_dir.join(VIEW_CROP_PTO),
    };
    let options = &config.options;
    let plan = JobPlan::builder("optimise")
        .then(OptimisationTask::new(
            cp_clean_pto.to_path_buf(),
            outputs.auto_optimised_pto.clone(),
            options.level_horizon,
            options.gpano,
            config.binaries.autooptimiser.clone(),
        ))
        .then(AutoCropTask::new(
            outputs.auto_optimised_pto.clone(),
            outputs.view_crop_pto.clone(),
            options.gpano,
            config.binaries.pano_modify.clone(),
        ))
        .build();
    (plan, outputs)
}

/// `CreatePreview → stitch`
#[must_use]
pub fn preview(
    config: &PanoConfig,
    work_dir: &Path,
    document: PtoDocument,
    preprocessed: PreprocessedMap,
) -> (JobPlan, StitchOutputs) {
    let prefix = work_dir.join(PREVIEW_PREFIX);
    let outputs = StitchOutputs {
        pto: prefix.with_extension("pto"),
        panorama: prefix.with_extension("jpg"),
    };
    let images = document.images.len();
    let builder = JobPlan::builder("preview").then(CreatePreviewTask::new(
        document,
        outputs.pto.clone(),
        preprocessed,
    ));
    let plan = stitch(builder, config, &outputs.pto, &prefix, images, Stitching::Preview).build();
    (plan, outputs)
}

/// `CreateFinalPto → stitch`
#[must_use]
pub fn compile(
    config: &PanoConfig,
    work_dir: &Path,
    document: PtoDocument,
    crop: Option<Rect>,
) -> (JobPlan, StitchOutputs) {
    let prefix = work_dir.join(PANORAMA_PREFIX);
    let outputs = StitchOutputs {
        pto: prefix.with_extension("pto"),
        panorama: prefix.with_extension(config.options.file_type.extension()),
    };
    let images = document.images.len();
    let builder = JobPlan::builder("compile").then(CreateFinalPtoTask::new(
        document,
        outputs.pto.clone(),
        crop,
    ));
    let plan = stitch(builder, config, &outputs.pto, &prefix, images, Stitching::Final).build();
    (plan, outputs)
}

/// `CopyFiles`
#[must_use]
pub fn copy(
    config: &PanoConfig,
    stitched: &StitchOutputs,
    final_panorama: PathBuf,
    preprocessed: PreprocessedMap,
) -> JobPlan {
    JobPlan::builder("copy")
        .then(CopyFilesTask::new(
            stitched.panorama.clone(),
            final_panorama,
            stitched.pto.clone(),
            preprocessed,
            config.options.save_pto,
            config.hugin_version().to_owned(),
        ))
        .build()
}

/// `HuginExecutor`, or `CreateMk → [CompileMkStep × N] → CompileMk`.
fn stitch(
    builder: JobPlanBuilder,
    config: &PanoConfig,
    pto: &Path,
    prefix: &Path,
    images: usize,
    stitching: Stitching,
) -> JobPlanBuilder {
    let binaries = &config.binaries;
    if config.use_hugin_executor() {
        return builder.then(HuginExecutorTask::new(
            pto.to_path_buf(),
            prefix.to_path_buf(),
            binaries.hugin_executor.clone(),
            stitching,
        ));
    }

    let mk = prefix.with_extension("mk");
    let tools = MakeTools {
        make: binaries.make.clone(),
        nona: binaries.nona.clone(),
        enblend: binaries.enblend.clone(),
    };
    let remapping = (0..images).map(|id| {
        Box::new(CompileMkStepTask::new(
            id,
            mk.clone(),
            prefix.to_path_buf(),
            tools.clone(),
            stitching,
        )) as Box<dyn PanoTask>
    });
    builder
        .then(CreateMkTask::new(
            pto.to_path_buf(),
            mk.clone(),
            prefix.to_path_buf(),
            binaries.pto2mk.clone(),
            stitching,
        ))
        .then_all(remapping)
        .then(CompileMkTask::new(mk, tools, stitching))
}

fn version(config: &PanoConfig) -> Version {
    Version::from_hugin_version(config.hugin_version())
}

#[cfg(test)]
mod tests {
    use pano_pto::{Image, Size};

    use super::*;

    fn config(hugin_version: &str) -> PanoConfig {
        let mut config = PanoConfig::default();
        config.options.hugin_version = Some(hugin_version.to_owned());
        config
    }

    fn document(images: usize) -> PtoDocument {
        let mut document = PtoDocument::new(Version::V2014);
        for id in 0..images {
            document
                .images
                .push(Image::new(format!("{id}.jpg"), Size::new(10, 10)));
        }
        document
    }

    #[test]
    fn preprocess_waits_for_every_image() {
        let inputs: Vec<PathBuf> = ["a.jpg", "b.nef", "c.jpg"].map(PathBuf::from).into();
        let (plan, outputs) = preprocess(&config("2019.2.0"), Path::new("/work"), &inputs);
        assert_eq!(
            plan.steps(),
            [
                vec![PanoAction::PreprocessInput; 3],
                vec![PanoAction::CreatePto],
                vec![PanoAction::Cpfind],
                vec![PanoAction::Cpclean],
            ]
        );
        assert_eq!(
            plan.ids(PanoAction::PreprocessInput),
            [Some(0), Some(1), Some(2)]
        );
        assert_eq!(outputs.cp_clean_pto, Path::new("/work/cp_pano_clean.pto"));
        assert_eq!(
            outputs.preprocessed[Path::new("b.nef")].preprocessed,
            Path::new("/work/001-b.tif")
        );
    }

    #[test]
    fn optimise_then_crop() {
        let (plan, outputs) = optimise(
            &config("2019.2.0"),
            Path::new("/work"),
            Path::new("/work/cp_pano_clean.pto"),
        );
        assert_eq!(
            plan.steps(),
            [vec![PanoAction::Optimize], vec![PanoAction::Autocrop]]
        );
        assert_eq!(outputs.view_crop_pto, Path::new("/work/view_crop_pano.pto"));
    }

    #[test]
    fn preview_with_hugin_executor() {
        let (plan, outputs) = preview(
            &config("2019.2.0"),
            Path::new("/work"),
            document(2),
            PreprocessedMap::new(),
        );
        assert_eq!(
            plan.steps(),
            [
                vec![PanoAction::CreatePreviewPto],
                vec![PanoAction::HuginExecutorPreview],
            ]
        );
        assert_eq!(outputs.panorama, Path::new("/work/preview.jpg"));
    }

    #[test]
    fn compile_through_makefile_on_old_hugin() {
        let mut config = config("2014.0.0");
        config.options.file_type = crate::action::PanoramaFileType::Tiff;
        let (plan, outputs) = compile(&config, Path::new("/work"), document(3), None);
        assert_eq!(
            plan.steps(),
            [
                vec![PanoAction::CreateFinalPto],
                vec![PanoAction::CreateMk],
                vec![PanoAction::NonaFile; 3],
                vec![PanoAction::Stitch],
            ]
        );
        assert_eq!(outputs.panorama, Path::new("/work/panorama.tif"));
        assert_eq!(outputs.pto, Path::new("/work/panorama.pto"));
    }

    #[test]
    fn only_the_final_step_is_last() {
        let (mut plan, _) = optimise(
            &config("2019.2.0"),
            Path::new("/work"),
            Path::new("/work/in.pto"),
        );
        let first = plan.take_ready(&HashSet::new());
        assert_eq!(first.len(), 1);
        assert!(!first[0].last);
        assert!(plan.take_ready(&HashSet::new()).is_empty());

        let second = plan.take_ready(&HashSet::from([first[0].node]));
        assert_eq!(second.len(), 1);
        assert!(second[0].last);
    }

    #[test]
    fn empty_collection_is_skipped() {
        let (plan, _) = preprocess(&config("2019.2.0"), Path::new("/work"), &[]);
        assert_eq!(plan.steps()[0], [PanoAction::CreatePto]);
        assert_eq!(plan.len(), 3);
    }
}

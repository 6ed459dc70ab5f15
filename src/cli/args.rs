// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_DET_SCOPE, DEFAULT_MODELS_DIR, DEFAULT_POSE_SCOPE};
use crate::detection::{DEFAULT_CLASS_THRESHOLD, PERSON_CLASS_ID};
use crate::metadata::ModelConfig;
use crate::wholebody::BodyRegion;

/// Default pose model config file name.
pub const DEFAULT_POSE_CONFIG: &str = "rtmw-l_384x288.yaml";
/// Default pose model checkpoint file name.
pub const DEFAULT_POSE_CHECKPOINT: &str = "rtmw-l_384x288.onnx";
/// Default detector config file name.
pub const DEFAULT_DET_CONFIG: &str = "rtmdet-m_640x640.yaml";
/// Default detector checkpoint file name.
pub const DEFAULT_DET_CHECKPOINT: &str = "rtmdet-m_640x640.onnx";

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Predict Options:
    --source, -s <SOURCE>      Input source (image, directory or glob)
    --models-dir <DIR>         Directory the model files are resolved against [default: models]
    --det-config <FILE>        Detector config file
    --det-checkpoint <FILE>    Detector ONNX checkpoint
    --pose-config <FILE>       Pose model config file
    --pose-checkpoint <FILE>   Pose model ONNX checkpoint
    --conf <CONF>              Person detection threshold [default: 0.5]
    --class-id <ID>            Detector class forwarded to the pose model [default: 0]
    --exhaustive               Do not assume detections are sorted by score
    --region <REGION>          Print keypoints of one region (body, foot, face, hand)
    --save                     Save annotated images to runs/pose/predict
    --verbose                  Show verbose output

Examples:
    wholebody-pose predict --source image.jpg
    wholebody-pose predict --source images/ --save
    wholebody-pose predict -s image.jpg --region hand --verbose false
    wholebody-pose predict -s image.jpg --det-scope ultralytics --det-checkpoint yolo11n.onnx"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run whole-body pose estimation on images
    Predict(PredictArgs),
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Input source (image, directory, or glob)
    #[arg(short, long)]
    pub source: String,

    /// Directory relative model paths are resolved against
    #[arg(long, default_value = DEFAULT_MODELS_DIR)]
    pub models_dir: String,

    /// Detector config file
    #[arg(long, default_value = DEFAULT_DET_CONFIG)]
    pub det_config: String,

    /// Detector ONNX checkpoint
    #[arg(long, default_value = DEFAULT_DET_CHECKPOINT)]
    pub det_checkpoint: String,

    /// Pose model config file
    #[arg(long, default_value = DEFAULT_POSE_CONFIG)]
    pub pose_config: String,

    /// Pose model ONNX checkpoint
    #[arg(long, default_value = DEFAULT_POSE_CHECKPOINT)]
    pub pose_checkpoint: String,

    /// Scope passed to the detector (overrides the detector config)
    #[arg(long)]
    pub det_scope: Option<String>,

    /// Scope passed to the pose model (overrides the pose config)
    #[arg(long)]
    pub pose_scope: Option<String>,

    /// Person detection threshold
    #[arg(long, default_value_t = DEFAULT_CLASS_THRESHOLD)]
    pub conf: f32,

    /// Detector class forwarded to the pose model
    #[arg(long, default_value_t = PERSON_CLASS_ID)]
    pub class_id: usize,

    /// Visit every detection instead of stopping at the first low score
    #[arg(long, default_value_t = false)]
    pub exhaustive: bool,

    /// Print the keypoints of one body region for every person
    #[arg(long)]
    pub region: Option<BodyRegion>,

    /// Font file used for box labels
    #[arg(long)]
    pub font: Option<String>,

    /// Save annotated images to <project>/predict
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Parent directory for saved runs
    #[arg(long, default_value = "runs/pose")]
    pub project: String,

    /// Intra-op threads for ONNX Runtime (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

impl PredictArgs {
    /// Detector scope: the flag, else the detector config's scope, else `mmdet`.
    #[must_use]
    pub fn det_scope_or<'a>(&'a self, config: &'a ModelConfig) -> &'a str {
        self.det_scope
            .as_deref()
            .unwrap_or_else(|| config.scope_or(DEFAULT_DET_SCOPE))
    }

    /// Pose scope: the flag, else the pose config's scope, else `mmpose`.
    #[must_use]
    pub fn pose_scope_or<'a>(&'a self, config: &'a ModelConfig) -> &'a str {
        self.pose_scope
            .as_deref()
            .unwrap_or_else(|| config.scope_or(DEFAULT_POSE_SCOPE))
    }
}

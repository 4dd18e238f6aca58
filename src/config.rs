use clap::Args;

use crate::cascade::DetectionParams;
use crate::error::{Error, Result};

/// Tunables of the per-frame pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Window step as a fraction of the window size.
    pub shift_factor: f64,
    /// Smallest face diameter searched, in pixels.
    pub min_size: u32,
    /// Largest face diameter searched, in pixels.
    pub max_size: u32,
    pub scale_factor: f64,
    /// Frames of raw detections kept for smoothing.
    pub memory_depth: usize,
    pub iou_threshold: f64,
    /// Clusters at or below this score are not decorated.
    pub score_threshold: f64,
    /// Jittered localizations per eye.
    pub perturbations: usize,
    /// Seed of the jitter generator.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shift_factor: 0.1,
            min_size: 100,
            max_size: 1000,
            scale_factor: 1.1,
            memory_depth: 5,
            iou_threshold: 0.2,
            score_threshold: 50.0,
            perturbations: 63,
            seed: 0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, msg: String| if ok { Ok(()) } else { Err(Error::InvalidConfig(msg)) };
        check(
            self.shift_factor > 0.0,
            format!("shift factor must be positive, got {}", self.shift_factor),
        )?;
        check(self.min_size > 0, "minimum size must be positive".to_owned())?;
        check(
            self.max_size > self.min_size,
            format!(
                "maximum size {} must exceed minimum size {}",
                self.max_size, self.min_size
            ),
        )?;
        check(
            self.scale_factor > 1.0,
            format!("scale factor must exceed 1, got {}", self.scale_factor),
        )?;
        check(self.memory_depth >= 1, "memory depth must be at least 1".to_owned())?;
        check(
            (0.0..=1.0).contains(&self.iou_threshold),
            format!("IoU threshold {} outside [0, 1]", self.iou_threshold),
        )?;
        check(
            self.score_threshold.is_finite(),
            format!("score threshold {} is not finite", self.score_threshold),
        )?;
        check(
            self.perturbations >= 1,
            "at least one localization per eye is required".to_owned(),
        )
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            shift_factor: self.shift_factor,
            min_size: f64::from(self.min_size),
            max_size: f64::from(self.max_size),
            scale_factor: self.scale_factor,
        }
    }
}

/// Command line flags for [`PipelineConfig`], meant to be flattened into a
/// binary's parser.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Detection window step relative to window size.
    #[clap(long, default_value_t = 0.1)]
    pub shift_factor: f64,

    /// Minimum face size in pixels.
    #[clap(long, default_value_t = 100)]
    pub min_size: u32,

    /// Maximum face size in pixels.
    #[clap(long, default_value_t = 1000)]
    pub max_size: u32,

    /// Window growth between scales.
    #[clap(long, default_value_t = 1.1)]
    pub scale_factor: f64,

    /// Frames of detections kept for temporal smoothing.
    #[clap(long, default_value_t = 5)]
    pub memory_depth: usize,

    /// Overlap above which detections are merged.
    #[clap(long, default_value_t = 0.2)]
    pub iou_threshold: f64,

    /// Minimum cluster score for a face to be decorated.
    #[clap(long, default_value_t = 50.0)]
    pub score_threshold: f64,

    /// Jittered localizations per eye.
    #[clap(long, default_value_t = 63)]
    pub perturbations: usize,

    /// Seed for the localization jitter.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
}

impl From<PipelineArgs> for PipelineConfig {
    fn from(args: PipelineArgs) -> Self {
        Self {
            shift_factor: args.shift_factor,
            min_size: args.min_size,
            max_size: args.max_size,
            scale_factor: args.scale_factor,
            memory_depth: args.memory_depth,
            iou_threshold: args.iou_threshold,
            score_threshold: args.score_threshold,
            perturbations: args.perturbations,
            seed: args.seed,
        }
    }
}

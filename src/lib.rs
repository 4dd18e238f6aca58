//! Real-time eye overlay: detect faces in camera frames, locate the pupils
//! and compute where to draw a decorative asset over the eyes.
//!
//! Per frame the [`FacePipeline`] converts RGBA to intensity, sweeps the
//! face cascade over a multiscale window grid, accumulates the raw hits of
//! the last few frames in a [`DetectionMemory`], merges overlapping hits
//! with [`cluster_detections`], localizes both pupils of every confident
//! face and finally derives an [`OverlayTransform`] from the eye pair.

mod cascade;
mod cluster;
mod config;
mod error;
mod image;
mod memory;
mod overlay;
mod pipeline;
mod puploc;

#[cfg(feature = "camera")]
pub mod camera;

pub use cascade::{run_cascade, CascadeModel, Detection, DetectionParams};
pub use cluster::{cluster_detections, overlap_ratio};
pub use config::{PipelineArgs, PipelineConfig};
pub use error::{Error, Result};
pub use image::{rgba_to_grayscale, Image, RgbaFrame};
pub use memory::DetectionMemory;
pub use overlay::{compute_transform, OverlayTransform, MAX_OVERLAY_SCALE};
pub use pipeline::{FacePipeline, FaceReport, FrameReport, FrameSource, Renderer};
pub use puploc::{eye_seeds, EyePoint, EyeSeed, PuplocModel};

use tracing_subscriber::EnvFilter;

/// Install the `RUST_LOG` driven log subscriber, defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

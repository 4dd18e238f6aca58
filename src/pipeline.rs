use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::cascade::{run_cascade, CascadeModel, Detection, DetectionParams};
use crate::cluster::cluster_detections;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::image::{Image, RgbaFrame};
use crate::memory::DetectionMemory;
use crate::overlay::{compute_transform, OverlayTransform};
use crate::puploc::{eye_seeds, EyePoint, PuplocModel};

/// Pull based access to the current camera frame.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbaFrame>;
}

/// Paints the overlay asset with a transform.
pub trait Renderer {
    /// Width in pixels of the asset being drawn.
    fn asset_width(&self) -> f64;

    fn draw_overlay(&mut self, transform: &OverlayTransform) -> Result<()>;
}

/// Outcome for one clustered face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceReport {
    pub detection: Detection,
    /// Left and right eye, `None` where localization failed.
    pub eyes: [Option<EyePoint>; 2],
    pub transform: Option<OverlayTransform>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Cascade output for this frame alone.
    pub raw: Vec<Detection>,
    /// Clusters over the whole detection memory.
    pub clusters: Vec<Detection>,
    /// Clusters above the score threshold.
    pub faces: Vec<FaceReport>,
}

impl FrameReport {
    pub fn transforms(&self) -> impl Iterator<Item = &OverlayTransform> {
        self.faces.iter().filter_map(|face| face.transform.as_ref())
    }
}

/// Everything that lives across frames of one video stream.
pub struct FacePipeline {
    cascade: CascadeModel,
    puploc: PuplocModel,
    config: PipelineConfig,
    params: DetectionParams,
    memory: DetectionMemory,
    rng: StdRng,
}

impl FacePipeline {
    pub fn new(cascade: CascadeModel, puploc: PuplocModel, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        info!(?config, "creating face pipeline");
        Ok(Self {
            cascade,
            puploc,
            params: config.detection_params(),
            memory: DetectionMemory::new(config.memory_depth),
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Forget accumulated detections, e.g. after switching streams.
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    pub fn process_rgba(&mut self, frame: &RgbaFrame, asset_width: f64) -> FrameReport {
        self.process_gray(&frame.to_grayscale(), asset_width)
    }

    /// Run detection, smoothing, clustering and eye localization on a frame.
    pub fn process_gray(&mut self, image: &Image, asset_width: f64) -> FrameReport {
        let raw = run_cascade(image, &self.cascade, &self.params);
        let remembered = self.memory.update(raw.clone());
        let clusters = cluster_detections(&remembered, self.config.iou_threshold);

        let threshold = self.config.score_threshold;
        let mut faces = Vec::new();
        for detection in clusters.iter().filter(|d| d.score > threshold) {
            let [left, right] = eye_seeds(detection);
            let eyes = [
                self.puploc
                    .locate(image, left, self.config.perturbations, &mut self.rng),
                self.puploc
                    .locate(image, right, self.config.perturbations, &mut self.rng),
            ];
            faces.push(FaceReport {
                detection: *detection,
                eyes,
                transform: compute_transform(eyes[0], eyes[1], asset_width),
            });
        }

        debug!(
            raw = raw.len(),
            remembered = remembered.len(),
            clusters = clusters.len(),
            faces = faces.len(),
            "processed frame"
        );
        FrameReport {
            raw,
            clusters,
            faces,
        }
    }

    /// Process a frame and draw one overlay per face with both eyes found.
    pub fn run_frame<R: Renderer>(&mut self, frame: &RgbaFrame, renderer: &mut R) -> Result<FrameReport> {
        let report = self.process_rgba(frame, renderer.asset_width());
        for transform in report.transforms() {
            renderer.draw_overlay(transform)?;
        }
        Ok(report)
    }

    /// Pull one frame from `source` and run it through [`Self::run_frame`].
    pub fn step<S: FrameSource, R: Renderer>(&mut self, source: &mut S, renderer: &mut R) -> Result<FrameReport> {
        let frame = source.next_frame()?;
        self.run_frame(&frame, renderer)
    }
}

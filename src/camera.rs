//! OpenCV and zenoh adapters for the frame source and renderer seams.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Args;
use opencv::core::{self, Mat, Scalar, Vector};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc, videoio};
use tracing::{info, warn};
use zenoh::prelude::r#async::*;

use crate::error::{Error, Result};
use crate::image::RgbaFrame;
use crate::overlay::OverlayTransform;
use crate::pipeline::{FrameSource, Renderer};

/// Topic carrying JPEG encoded camera frames.
pub const FRAME_TOPIC: &str = "eye-overlay/image";

const EMPTY_FRAME_BACKOFF: Duration = Duration::from_millis(50);

/// Model and asset locations shared by the drivers.
#[derive(Args, Debug, Clone)]
pub struct AssetArgs {
    /// Face detection cascade.
    #[clap(long, default_value = "data/facefinder.cascade")]
    pub cascade: PathBuf,

    /// Pupil localization model.
    #[clap(long, default_value = "data/puploc.bin")]
    pub puploc: PathBuf,

    /// Image drawn over the eyes.
    #[clap(long, default_value = "data/eyes.png")]
    pub asset: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ZenohArgs {
    /// Endpoints to connect to.
    #[clap(short = 'e', long)]
    pub connect: Vec<zenoh_config::EndPoint>,

    /// Endpoints to listen on.
    #[clap(long)]
    pub listen: Vec<zenoh_config::EndPoint>,
}

pub async fn open_zenoh_session(args: &ZenohArgs) -> Result<Arc<zenoh::Session>> {
    let mut zenoh_config = Config::default();
    if !args.listen.is_empty() {
        zenoh_config.listen.endpoints = args.listen.clone();
        info!(endpoints = ?zenoh_config.listen.endpoints, "configured listening endpoints");
    }
    if !args.connect.is_empty() {
        zenoh_config.connect.endpoints = args.connect.clone();
        info!(endpoints = ?zenoh_config.connect.endpoints, "configured connect endpoints");
    }

    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(Error::Zenoh)?;
    Ok(zenoh_session.into_arc())
}

pub struct CameraSource {
    cam: videoio::VideoCapture,
}

impl CameraSource {
    pub fn new(index: i32) -> Result<Self> {
        let cam = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        if !videoio::VideoCapture::is_opened(&cam)? {
            return Err(Error::Acquisition(format!("unable to open camera {index}")));
        }
        info!(index, "opened camera");
        Ok(Self { cam })
    }

    /// Next BGR frame, waiting out the empty frames some cameras emit while
    /// starting up.
    pub fn next_mat(&mut self) -> Result<Mat> {
        loop {
            let mut frame = Mat::default();
            if !self.cam.read(&mut frame)? {
                return Err(Error::Acquisition("camera stopped delivering frames".to_owned()));
            }
            if frame.size()?.width > 0 {
                return Ok(frame);
            }
            warn!("camera returned an empty frame");
            thread::sleep(EMPTY_FRAME_BACKOFF);
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<RgbaFrame> {
        let mat = self.next_mat()?;
        mat_to_rgba(&mat)
    }
}

/// Convert a BGR OpenCV image to an RGBA frame.
pub fn mat_to_rgba(bgr: &Mat) -> Result<RgbaFrame> {
    let mut rgba = Mat::default();
    imgproc::cvt_color_def(bgr, &mut rgba, imgproc::COLOR_BGR2RGBA)?;
    let size = rgba.size()?;
    RgbaFrame::new(
        rgba.data_bytes()?.to_vec(),
        size.height as usize,
        size.width as usize,
    )
}

pub fn jpeg_to_mat(data: &[u8]) -> Result<Mat> {
    let buffer = Vector::<u8>::from_slice(data);
    Ok(imgcodecs::imdecode(&buffer, imgcodecs::IMREAD_COLOR)?)
}

pub fn mat_to_jpeg(frame: &Mat) -> Result<Vec<u8>> {
    let mut buffer: Vector<u8> = Default::default();
    imgcodecs::imencode_def(".jpg", frame, &mut buffer)?;
    Ok(buffer.to_vec())
}

/// Draws the overlay asset onto a copy of the current camera frame.
pub struct OverlayRenderer {
    asset: Mat,
    canvas: Mat,
}

impl OverlayRenderer {
    /// Load a PNG asset, keeping its alpha channel.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loaded = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_UNCHANGED)?;
        if loaded.size()?.width == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unable to read overlay asset {}", path.display()),
            )));
        }
        let asset = if loaded.channels() == 4 {
            loaded
        } else {
            let mut bgra = Mat::default();
            imgproc::cvt_color_def(&loaded, &mut bgra, imgproc::COLOR_BGR2BGRA)?;
            bgra
        };
        info!(path = %path.display(), "loaded overlay asset");
        Ok(Self {
            asset,
            canvas: Mat::default(),
        })
    }

    /// Start drawing on a fresh copy of `frame`.
    pub fn begin_frame(&mut self, frame: &Mat) {
        self.canvas = frame.clone();
    }

    pub fn canvas(&self) -> &Mat {
        &self.canvas
    }

    fn asset_height(&self) -> f64 {
        f64::from(self.asset.rows())
    }
}

impl Renderer for OverlayRenderer {
    fn asset_width(&self) -> f64 {
        f64::from(self.asset.cols())
    }

    fn draw_overlay(&mut self, transform: &OverlayTransform) -> Result<()> {
        let m = transform.asset_affine(self.asset_width(), self.asset_height());
        let affine = Mat::from_slice_2d(&m)?;

        let mut warped = Mat::default();
        imgproc::warp_affine(
            &self.asset,
            &mut warped,
            &affine,
            self.canvas.size()?,
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        let mut channels: Vector<Mat> = Default::default();
        core::split(&warped, &mut channels)?;
        let mut mask = Mat::default();
        core::compare(&channels.get(3)?, &Scalar::all(127.0), &mut mask, core::CMP_GT)?;
        let colour: Vector<Mat> = channels.iter().take(3).collect();
        let mut bgr = Mat::default();
        core::merge(&colour, &mut bgr)?;

        bgr.copy_to_masked(&mut self.canvas, &mask)?;
        Ok(())
    }
}

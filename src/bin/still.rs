use std::path::PathBuf;

use clap::Parser;
use eye_overlay::camera::{mat_to_rgba, AssetArgs, OverlayRenderer};
use eye_overlay::{CascadeModel, FacePipeline, PipelineArgs, PuplocModel};
use opencv::core::Vector;
use opencv::imgcodecs;
use tracing::info;

/// Decorate the faces of a single image.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    input: PathBuf,

    #[clap(short, long, default_value = "overlay.jpg")]
    output: PathBuf,

    #[clap(flatten)]
    assets: AssetArgs,

    #[clap(flatten)]
    pipeline: PipelineArgs,
}

fn main() -> anyhow::Result<()> {
    eye_overlay::init_logging();
    let args: Args = Args::parse();

    let cascade = CascadeModel::from_file(&args.assets.cascade)?;
    let puploc = PuplocModel::from_file(&args.assets.puploc)?;
    let mut renderer = OverlayRenderer::from_file(&args.assets.asset)?;
    let mut pipeline = FacePipeline::new(cascade, puploc, args.pipeline.into())?;

    let frame = imgcodecs::imread_def(&args.input.to_string_lossy())?;
    if frame.size()?.width == 0 {
        anyhow::bail!("unable to read {}", args.input.display());
    }

    renderer.begin_frame(&frame);
    let report = pipeline.run_frame(&mat_to_rgba(&frame)?, &mut renderer)?;
    for face in &report.faces {
        info!(
            row = face.detection.row,
            col = face.detection.col,
            size = face.detection.size,
            score = face.detection.score,
            eyes = ?face.eyes,
            "face"
        );
    }

    imgcodecs::imwrite(
        &args.output.to_string_lossy(),
        renderer.canvas(),
        &Vector::new(),
    )?;
    info!(
        faces = report.faces.len(),
        output = %args.output.display(),
        "wrote decorated image"
    );
    Ok(())
}

use clap::Parser;
use eye_overlay::camera::{mat_to_rgba, AssetArgs, CameraSource, OverlayRenderer};
use eye_overlay::{CascadeModel, FacePipeline, PipelineArgs, PuplocModel};
use opencv::highgui;
use tracing::info;

const ESCAPE: i32 = 27;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Camera index.
    #[clap(long, default_value_t = 0)]
    camera: i32,

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

    let mut camera_source = CameraSource::new(args.camera)?;

    let window = "eye overlay";
    highgui::named_window_def(window)?;

    loop {
        let frame = camera_source.next_mat()?;
        renderer.begin_frame(&frame);
        pipeline.run_frame(&mat_to_rgba(&frame)?, &mut renderer)?;

        highgui::imshow(window, renderer.canvas())?;
        if highgui::poll_key()? == ESCAPE {
            info!("exit requested");
            return Ok(());
        }
    }
}

use clap::Parser;
use eye_overlay::camera::{
    jpeg_to_mat, mat_to_rgba, open_zenoh_session, AssetArgs, OverlayRenderer, ZenohArgs, FRAME_TOPIC,
};
use eye_overlay::{CascadeModel, Error, FacePipeline, PipelineArgs, PuplocModel};
use opencv::highgui;
use tracing::debug;
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    #[clap(flatten)]
    zenoh: ZenohArgs,

    #[clap(flatten)]
    assets: AssetArgs,

    #[clap(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eye_overlay::init_logging();
    let args: Args = Args::parse();

    let cascade = CascadeModel::from_file(&args.assets.cascade)?;
    let puploc = PuplocModel::from_file(&args.assets.puploc)?;
    let mut renderer = OverlayRenderer::from_file(&args.assets.asset)?;
    let mut pipeline = FacePipeline::new(cascade, puploc, args.pipeline.into())?;

    let zenoh_session = open_zenoh_session(&args.zenoh).await?;

    let subscriber = zenoh_session
        .declare_subscriber(FRAME_TOPIC)
        .best_effort()
        .res()
        .await
        .map_err(Error::Zenoh)?;

    let window = "eye overlay";
    highgui::named_window_def(window)?;

    loop {
        let msg = subscriber.recv_async().await?;
        let payload: Vec<u8> = msg.value.try_into()?;

        let frame = jpeg_to_mat(&payload)?;
        renderer.begin_frame(&frame);
        let report = pipeline.run_frame(&mat_to_rgba(&frame)?, &mut renderer)?;
        debug!(faces = report.faces.len(), "rendered frame");

        highgui::imshow(window, renderer.canvas())?;
        _ = highgui::poll_key()?;
    }
}

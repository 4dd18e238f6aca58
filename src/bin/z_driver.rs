use clap::Parser;
use eye_overlay::camera::{mat_to_jpeg, open_zenoh_session, CameraSource, ZenohArgs, FRAME_TOPIC};
use eye_overlay::Error;
use opencv::highgui;
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Camera index.
    #[clap(long, default_value_t = 0)]
    camera: i32,

    /// Show the published frames in a window.
    #[clap(long)]
    preview: bool,

    #[clap(flatten)]
    zenoh: ZenohArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eye_overlay::init_logging();
    let args: Args = Args::parse();

    let zenoh_session = open_zenoh_session(&args.zenoh).await?;

    let publisher = zenoh_session
        .declare_publisher(FRAME_TOPIC)
        .congestion_control(CongestionControl::Drop)
        .priority(Priority::InteractiveHigh)
        .res()
        .await
        .map_err(Error::Zenoh)?;

    let mut camera_source = CameraSource::new(args.camera)?;

    let window = "camera";
    if args.preview {
        highgui::named_window_def(window)?;
    }

    loop {
        let frame = camera_source.next_mat()?;
        let data = mat_to_jpeg(&frame)?;

        publisher.put(data).res().await.map_err(Error::Zenoh)?;

        if args.preview {
            highgui::imshow(window, &frame)?;
            _ = highgui::poll_key()?;
        }
    }
}

//! dslr_webcam - expose a tethered camera's live preview as a webcam
//!
//! This daemon:
//! 1. Negotiates YUYV output on the video sink
//! 2. Connects to the camera and fetches JPEG previews back to back
//! 3. Decodes and repacks each preview, writing one frame per iteration
//! 4. Drains on Ctrl-C or when the sink's reader goes away
//!
//! Exit status: 0 on clean shutdown, 1 for a camera SDK failure, 2 for anything else.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use dslr_webcam::{
    install_signal_handlers, BridgeConfig, CameraSource, OutputSink, PipelineController,
    SdkError, ShutdownFlag,
};

const EXIT_SDK_FAILURE: i32 = 1;
const EXIT_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "DSLR_WEBCAM_CONFIG")]
    config: Option<PathBuf>,
    /// Camera URI (gphoto2:// or stub://<name>).
    #[arg(long)]
    camera: Option<String>,
    /// Output device: /dev/videoN, `-` for stdout, or a file/FIFO path.
    #[arg(long)]
    device: Option<String>,
    /// Attempts per capture before a busy camera is fatal (1 disables retries).
    #[arg(long)]
    retry_attempts: Option<u32>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(args) {
        log::error!("{:#}", err);
        let code = if err.downcast_ref::<SdkError>().is_some() {
            EXIT_SDK_FAILURE
        } else {
            EXIT_FAILURE
        };
        std::process::exit(code);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = BridgeConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        config.camera_uri = camera;
    }
    if let Some(device) = args.device {
        config.sink_device = device;
    }
    if let Some(attempts) = args.retry_attempts {
        config.retry.max_attempts = attempts;
    }
    config.validate()?;

    let sink = OutputSink::open(&config.sink_device)?;
    let source = CameraSource::new(config.camera_config()?)?;
    let mut pipeline = PipelineController::new(config.pipeline_config()?, source, sink);
    pipeline.start()?;

    let shutdown = ShutdownFlag::new();
    install_signal_handlers(&shutdown)?;
    pipeline.run(&shutdown)?;
    Ok(())
}

//! Camera Session demo
//!
//! Drives a full session lifecycle against the in-memory camera subsystem:
//! open, preview, a series of still captures written to disk, and close.

use camera_session::{
    device::{MockHal, SurfaceId},
    host::{
        headless::{FixedDisplay, OffscreenSurface, RecordingNotifier, StaticPermissions},
        FsStorage,
    },
    CameraController, FileConfig, SessionDeps, SessionNotice, SessionState, Size,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "camera-session-demo", version, about = "Camera session demo on a mock device")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of stills to capture.
    #[arg(short = 'n', long, default_value_t = 3)]
    captures: u32,

    /// Directory pictures are written under (overrides the config file).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Preview view width.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Preview view height.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Print Prometheus metrics before exiting.
    #[arg(long)]
    metrics: bool,
}

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Camera Session demo v{}", camera_session::VERSION);
    info!("This is a demonstration using a mock camera device");

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(output) = args.output {
        config.storage.pictures_root = output;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let viewport = Size::new(args.width, args.height);
    let deps = SessionDeps {
        hal: Arc::new(MockHal::new()),
        display: Arc::new(FixedDisplay::new(Size::new(1080, 1920))),
        surface: Arc::new(OffscreenSurface::new(SurfaceId(1), viewport)),
        storage: Arc::new(FsStorage),
        media: Arc::new(RecordingNotifier::new()),
    };
    let mut controller = match CameraController::new(
        config.session,
        config.storage,
        deps,
        Arc::new(StaticPermissions::new(true)),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    let notices = controller.subscribe();

    if let Err(e) = controller.start() {
        eprintln!("Failed to open camera: {}", e);
        std::process::exit(1);
    }
    if !controller
        .session()
        .wait_for_state(SessionState::PreviewActive, STEP_TIMEOUT)
    {
        error!("Preview did not start, session is {}", controller.state());
        std::process::exit(1);
    }
    if let Some(stream) = controller.session().stream_config() {
        info!(
            "Preview {} / still {} (aspect {})",
            stream.preview, stream.still, stream.aspect_ratio
        );
    }

    let mut saved = 0;
    for i in 0..args.captures {
        if stop.load(Ordering::SeqCst) {
            warn!("Interrupted, stopping early");
            break;
        }
        if let Err(e) = controller.capture() {
            warn!("Capture {} rejected: {}", i, e);
            continue;
        }

        // Wait for this capture's outcome and for preview to come back.
        let mut finished = false;
        while let Ok(notice) = notices.recv_timeout(STEP_TIMEOUT) {
            match notice {
                SessionNotice::ImageSaved { path, bytes } => {
                    info!("Saved {} ({} bytes)", path.display(), bytes);
                    saved += 1;
                }
                SessionNotice::Failed(e) => warn!("Capture {} failed: {}", i, e),
                SessionNotice::PreviewStarted { .. } => {
                    finished = true;
                    break;
                }
                _ => {}
            }
        }
        if !finished {
            error!("Session stalled in {}", controller.state());
            break;
        }
        // File names resolve to the second.
        std::thread::sleep(Duration::from_millis(1100));
    }

    if let Err(e) = controller.pause() {
        error!("Close failed: {}", e);
    }
    info!(
        "Done. {} of {} stills saved, latest: {:?}",
        saved,
        args.captures,
        controller.latest_file()
    );

    if args.metrics {
        match controller.session().metrics().render() {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }
}

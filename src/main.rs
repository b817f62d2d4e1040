use anyhow::{anyhow, Context, Result};
use camagent::{
    AfState, AgentConfig, CameraAgent, CameraProxy, CameraSettings, FocusMode, OpenCallback,
    PreviewTexture, SimulatedSubsystem, Size, TokioExecutor,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "camctl")]
#[command(about = "Drive the camera agent against a simulated camera subsystem")]
#[command(version)]
#[command(long_about = "Builds a camera agent over an in-process simulated camera \
subsystem, prints the device registry and walks a full session: open, apply settings, \
bind a preview texture, start preview, autofocus, cancel autofocus and release.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camagent.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Simulated device ids; the first faces back, the rest front
    #[arg(long, value_delimiter = ',', default_value = "0,1")]
    devices: Vec<String>,

    /// Camera index to open
    #[arg(long, default_value_t = 0)]
    camera: usize,

    /// Print device info as JSON
    #[arg(long)]
    json: bool,

    /// Print device info and exit without opening a camera
    #[arg(long)]
    info_only: bool,

    /// Interval between simulated frames
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,
}

enum OpenOutcome {
    Opened(CameraProxy),
    Failed(String),
}

struct ChannelOpenCallback(mpsc::UnboundedSender<OpenOutcome>);

impl OpenCallback for ChannelOpenCallback {
    fn on_camera_opened(&self, camera: CameraProxy) {
        let _ = self.0.send(OpenOutcome::Opened(camera));
    }

    fn on_camera_disabled(&self, camera_index: usize) {
        let _ = self
            .0
            .send(OpenOutcome::Failed(format!("camera {} is disabled", camera_index)));
    }

    fn on_device_open_failure(&self, camera_index: usize, info: String) {
        let _ = self.0.send(OpenOutcome::Failed(format!(
            "camera {} failed to open ({})",
            camera_index, info
        )));
    }

    fn on_device_opened_already(&self, camera_index: usize, info: String) {
        let _ = self.0.send(OpenOutcome::Failed(format!(
            "camera {} is already open ({})",
            camera_index, info
        )));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# Camera agent configuration");
        println!("{}", toml::to_string_pretty(&AgentConfig::default())?);
        return Ok(());
    }

    init_logging(&args)?;
    info!("Starting camctl v{}", env!("CARGO_PKG_VERSION"));

    let config = match AgentConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let ids: Vec<&str> = args.devices.iter().map(String::as_str).collect();
    let sim = SimulatedSubsystem::new(&ids);
    let job_timeout = config.dispatch.job_timeout();
    let agent = Arc::new(CameraAgent::new(Arc::new(sim.clone()), config)?);

    let device_info = agent.camera_device_info()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&device_info)?);
    } else {
        println!("Cameras: {}", device_info.number_of_cameras());
        for (index, id) in device_info.camera_ids().iter().enumerate() {
            let facing = device_info
                .characteristics(index)
                .map(|c| format!("{:?}", c.lens_facing))
                .unwrap_or_else(|| "gone".to_string());
            println!("  [{}] {} ({})", index, id.as_deref().unwrap_or("-"), facing);
        }
    }

    let result = if args.info_only {
        Ok(())
    } else {
        run_session(&agent, &sim, &args, job_timeout).await
    };

    let stats = agent.stats();
    info!(
        "Handler processed {} actions and {} hardware events ({} rejected, {} failed)",
        stats.actions_processed, stats.hardware_events, stats.rejected_commands, stats.failures
    );

    tokio::task::spawn_blocking(move || agent.recycle()).await?;
    result
}

async fn run_session(
    agent: &Arc<CameraAgent>,
    sim: &SimulatedSubsystem,
    args: &Args,
    timeout: Duration,
) -> Result<()> {
    let executor = TokioExecutor::current();
    agent.set_camera_exception_callback(executor.clone(), |err| {
        error!("Camera agent reported a fatal error: {}", err);
    });

    let (open_tx, mut open_rx) = mpsc::unbounded_channel();
    agent.open_camera(
        executor.clone(),
        args.camera,
        Arc::new(ChannelOpenCallback(open_tx)),
    )?;
    let camera = match tokio::time::timeout(timeout, open_rx.recv()).await {
        Ok(Some(OpenOutcome::Opened(camera))) => camera,
        Ok(Some(OpenOutcome::Failed(reason))) => return Err(anyhow!(reason)),
        Ok(None) | Err(_) => return Err(anyhow!("camera {} did not open", args.camera)),
    };
    info!("Opened camera {}", camera.camera_index());

    // Frames flow only while a repeating request is active
    let pump = {
        let sim = sim.clone();
        let interval = Duration::from_millis(args.frame_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sim.emit_frame();
            }
        })
    };

    let result = drive_preview(&camera, sim, timeout, executor).await;
    pump.abort();

    let closer = Arc::clone(agent);
    tokio::task::spawn_blocking(move || closer.close_camera(Some(&camera), true))
        .await?
        .context("releasing camera")?;
    info!("Camera released");
    result
}

async fn drive_preview(
    camera: &CameraProxy,
    sim: &SimulatedSubsystem,
    timeout: Duration,
    executor: Arc<TokioExecutor>,
) -> Result<()> {
    let mut settings = CameraSettings::new(Size::new(1920, 1080), Size::new(4000, 3000));
    settings.focus_mode = FocusMode::ContinuousPicture;
    if !camera.apply_settings(&settings) {
        return Err(anyhow!("camera rejected settings"));
    }
    camera.set_preview_texture(PreviewTexture::new())?;

    camera.set_auto_focus_move_callback(
        executor.clone(),
        Some(|moving: bool, camera: CameraProxy| {
            info!("Camera {} lens {}", camera.camera_index(), if moving { "moving" } else { "settled" });
        }),
    )?;

    let (started_tx, started_rx) = oneshot::channel();
    camera.start_preview(
        executor.clone(),
        Some(move || {
            let _ = started_tx.send(());
        }),
    )?;
    tokio::time::timeout(timeout, started_rx)
        .await
        .context("preview did not start")??;
    info!("Preview started");

    sim.set_af_state(AfState::PassiveScan);
    tokio::time::sleep(Duration::from_millis(100)).await;
    sim.set_af_state(AfState::PassiveFocused);
    tokio::time::sleep(Duration::from_millis(100)).await;

    sim.set_af_state(AfState::FocusedLocked);
    let (focus_tx, focus_rx) = oneshot::channel();
    camera.auto_focus(
        executor,
        Some(move |focused: bool, _camera: CameraProxy| {
            let _ = focus_tx.send(focused);
        }),
    )?;
    match tokio::time::timeout(timeout, focus_rx).await {
        Ok(Ok(focused)) => info!("Autofocus finished, in focus: {}", focused),
        _ => warn!("Autofocus did not finish within {:?}", timeout),
    }

    camera.cancel_auto_focus()?;
    camera.stop_preview()?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camagent={},camctl={}", log_level, log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use clockface_client::{FaceEngineClient, HttpConfig, HttpTransport};
use clockface_core::overlay::render_capture;
use clockface_core::registration::RegistrationCapture;
use clockface_core::{DetectOptions, ModelSet};
use clockface_hw::frame::is_dark_frame;
use clockface_hw::{
    list_devices, MediaStreamManager, ReadyState, StreamConstraints, V4lBackend, VideoSurface,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WARMUP_FRAMES: usize = 4;
const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[zbus::proxy(
    interface = "org.clockface.Kiosk1",
    default_service = "org.clockface.Kiosk",
    default_path = "/org/clockface/Kiosk1"
)]
trait Kiosk {
    fn start_detection(&self) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<()>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "clockface", about = "Clockface attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a detection cycle on the running kiosk
    Start,
    /// Stop detection on the running kiosk
    Stop,
    /// Show kiosk status
    Status,
    /// Capture a face descriptor for an employee
    Register {
        #[arg(long)]
        employee_id: i64,
        /// Send the descriptor to the attendance server
        #[arg(long)]
        submit: bool,
        /// Write the captured frame with the detection drawn on it
        #[arg(long)]
        overlay: Option<PathBuf>,
        #[arg(long, default_value = "/dev/video0")]
        device: String,
        #[arg(long, default_value = "http://localhost:8069")]
        server: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "/hr_attendance_face_recognition/static/models")]
        model_base: String,
    },
    /// Run camera diagnostics
    Test {
        #[arg(long, default_value = "/dev/video0")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let outcome = kiosk().await?.start_detection().await?;
            println!("{outcome}");
        }
        Commands::Stop => {
            kiosk().await?.stop().await?;
            println!("stopped");
        }
        Commands::Status => {
            let raw = kiosk().await?.status().await?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("kiosk returned invalid status JSON")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Register {
            employee_id,
            submit,
            overlay,
            device,
            server,
            session_id,
            model_base,
        } => {
            let encoded = register(&device, &model_base, overlay).await?;
            println!("{encoded}");
            if submit {
                let mut config = HttpConfig::new(server);
                config.session_id = session_id;
                let reply = HttpTransport::new(config)
                    .register(employee_id, &encoded)
                    .await?;
                let message = reply.message.unwrap_or_default();
                if !reply.success {
                    bail!("registration rejected: {message}");
                }
                println!("registered employee {employee_id}: {message}");
            }
        }
        Commands::Test { device } => camera_test(&device).await?,
    }

    Ok(())
}

async fn kiosk() -> Result<KioskProxy<'static>> {
    let connection = zbus::Connection::system().await?;
    KioskProxy::new(&connection)
        .await
        .context("clockfaced is not reachable on the system bus")
}

async fn wait_ready(surface: &VideoSurface) -> Result<()> {
    let deadline = Instant::now() + READY_TIMEOUT;
    while surface.ready_state() < ReadyState::HaveEnoughData {
        if Instant::now() >= deadline {
            bail!("camera produced no usable frames ({:?})", surface.ready_state());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

/// One-shot capture. Returns the encoded descriptor.
async fn register(device: &str, model_base: &str, overlay: Option<PathBuf>) -> Result<String> {
    let connection = zbus::Connection::system().await?;
    let engine = FaceEngineClient::connect(&connection).await?;
    ModelSet::load_all(&engine, model_base).await?;

    tracing::debug!(device, "acquiring camera for registration");
    let mut stream = MediaStreamManager::new(Arc::new(V4lBackend::new(device)), WARMUP_FRAMES);
    let info = stream
        .acquire(StreamConstraints::registration())
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    let ready = wait_ready(&info.surface).await;
    let frame = info
        .surface
        .current_frame()
        .and_then(|f| f.to_rgb_image());
    stream.release();
    ready?;

    let mut capture = RegistrationCapture::new(DetectOptions::default());
    let captured = capture
        .capture(&engine, true, frame.as_ref())
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    if let (Some(path), Some(frame)) = (overlay, frame.as_ref()) {
        render_capture(frame, &captured.detection)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("overlay written to {}", path.display());
    }
    Ok(captured.encoded)
}

async fn camera_test(device: &str) -> Result<()> {
    println!("Running camera diagnostics...");
    let devices = list_devices();
    if devices.is_empty() {
        println!("no V4L2 capture devices found");
    }
    for d in &devices {
        println!("  {}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }

    let mut stream = MediaStreamManager::new(Arc::new(V4lBackend::new(device)), WARMUP_FRAMES);
    let started = Instant::now();
    let info = stream
        .acquire(StreamConstraints::kiosk())
        .await
        .map_err(|e| anyhow!("{e}: {}", e.user_message()))?;
    for track in &info.tracks {
        println!("track: {} {}x{}", track.label, track.width, track.height);
    }

    let ready = wait_ready(&info.surface).await;
    let frame = info.surface.current_frame();
    println!(
        "ready state: {:?} after {} ms, {} frames decoded",
        info.surface.ready_state(),
        started.elapsed().as_millis(),
        info.surface.frames_decoded()
    );
    stream.release();
    ready?;

    let frame = frame.ok_or_else(|| anyhow!("no frame captured"))?;
    let luma = frame.luma();
    println!("frame: {}x{}", frame.width, frame.height);
    println!("brightness: {:.1}", frame.avg_brightness());
    if let Some(warning) = exposure_warning(&luma) {
        println!("warning: {warning}");
    }
    Ok(())
}

fn exposure_warning(luma: &[u8]) -> Option<&'static str> {
    is_dark_frame(luma, 0.95).then_some("frame is nearly black; check lighting and lens cover")
}

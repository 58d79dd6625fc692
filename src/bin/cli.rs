use anyhow::{anyhow, bail, Context};
use crabcapture::testing::{
    back_camera, unique_camera_id, SimulatedCamera, SimulatedEncoder, StaticCapabilities,
    StaticSurfaceProvider,
};
use crabcapture::{CameraSession, CaptureSettings, TakePhotoOptions};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Args {
    command: String,
    path: Option<PathBuf>,
    duration_ms: u64,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let command = args
        .get(1)
        .cloned()
        .ok_or_else(|| anyhow!("Usage: crabcapture-cli <demo-photo|demo-record|print-config> [args]"))?;

    let mut parsed = Args {
        command,
        path: None,
        duration_ms: 2_000,
        config: None,
        json: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--ms" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--ms requires a value"))?;
                parsed.duration_ms = value.parse().context("--ms must be a number")?;
            }
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--json" => parsed.json = true,
            other => {
                if parsed.path.is_none() {
                    parsed.path = Some(PathBuf::from(other));
                }
            }
        }
        i += 1;
    }
    Ok(parsed)
}

fn load_settings(args: &Args) -> anyhow::Result<CaptureSettings> {
    match &args.config {
        Some(path) => Ok(CaptureSettings::load_from_file(path)?),
        None => Ok(CaptureSettings::load_or_default()),
    }
}

fn open_session(settings: CaptureSettings) -> anyhow::Result<CameraSession> {
    let camera_id = unique_camera_id();
    let session = CameraSession::new(
        &camera_id,
        SimulatedCamera::new(),
        &StaticCapabilities::new(back_camera(&camera_id)),
        Arc::new(StaticSurfaceProvider::new()),
        Box::new(SimulatedEncoder::new()),
        settings,
    )?;
    Ok(session)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crabcapture::init_logging();

    let raw: Vec<String> = env::args().collect();
    let args = parse_args(&raw)?;

    match args.command.as_str() {
        "demo-photo" => cmd_demo_photo(&args).await,
        "demo-record" => cmd_demo_record(&args).await,
        "print-config" => cmd_print_config(&args),
        other => bail!("Unknown command: {}", other),
    }
}

async fn cmd_demo_photo(args: &Args) -> anyhow::Result<()> {
    let path = args
        .path
        .clone()
        .ok_or_else(|| anyhow!("Usage: crabcapture-cli demo-photo <path> [--json]"))?;

    let session = open_session(load_settings(args)?)?;
    let ready = session.initialize().await?;
    if !args.json {
        println!("Camera {} ready: {:?}", ready.camera_id, ready.configuration);
    }

    let result = session.take_photo(TakePhotoOptions::new(path)).await;
    session.close().await;
    let photo = result?;

    if args.json {
        println!("{}", serde_json::to_string(&photo)?);
    } else {
        println!(
            "Photo saved to {} ({}x{})",
            photo.path.display(),
            photo.width,
            photo.height
        );
    }
    Ok(())
}

async fn cmd_demo_record(args: &Args) -> anyhow::Result<()> {
    let path = args
        .path
        .clone()
        .ok_or_else(|| anyhow!("Usage: crabcapture-cli demo-record <path> [--ms N] [--json]"))?;

    let session = open_session(load_settings(args)?)?;
    session.initialize().await?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let failure = Arc::new(std::sync::Mutex::new(None));
    let failure_clone = failure.clone();
    session.start_recording(
        session.video_options(path),
        |_| {},
        move |e| {
            if let Ok(mut slot) = failure_clone.lock() {
                *slot = Some(e);
            }
        },
    )?;

    if !args.json {
        println!("Recording... (press Ctrl+C to stop early)");
    }
    let start = Instant::now();
    let target = Duration::from_millis(args.duration_ms);
    while start.elapsed() < target {
        if stop_flag.load(Ordering::SeqCst) {
            if !args.json {
                println!("Stopping early...");
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let result = session.stop_recording().await;
    session.close().await;

    if let Some(e) = failure.lock().ok().and_then(|mut slot| slot.take()) {
        bail!("Recording failed: {}", e);
    }
    let video = result?;

    if args.json {
        println!("{}", serde_json::to_string(&video)?);
    } else {
        println!(
            "Video saved to {} ({:.1}s, {} bytes)",
            video.path.display(),
            video.duration_secs,
            video.size_bytes
        );
    }
    Ok(())
}

fn cmd_print_config(args: &Args) -> anyhow::Result<()> {
    let settings = load_settings(args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        print!("{}", toml::to_string_pretty(&settings)?);
    }
    Ok(())
}

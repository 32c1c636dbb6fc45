use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tandem_scribe::audio::device::{DeviceCatalog, DeviceDirection};
use tandem_scribe::config::{MAX_CHUNK_SECS, MIN_CHUNK_SECS};
use tandem_scribe::transcribe::DryRunTranscriber;
use tandem_scribe::{CaptureController, CaptureEvent, Config};
use tracing::info;

#[derive(Parser)]
#[command(name = "tandem-scribe", version, about = "Dual-source audio capture and chunked transcription")]
struct Cli {
    /// Path to a config file (without extension), e.g. `config/tandem-scribe`.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available audio devices.
    Devices {
        /// Emit the device list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Record system audio and a microphone until interrupted.
    Record {
        /// System (loopback) device name.
        #[arg(long)]
        system: String,
        /// Microphone device name.
        #[arg(long)]
        mic: String,
        /// Chunk length in seconds.
        #[arg(long)]
        chunk_seconds: Option<u64>,
        /// Directory for chunk files; overrides the configured one.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Devices { json } => list_devices(json),
        Command::Record {
            system,
            mic,
            chunk_seconds,
            output_dir,
        } => record(config, system, mic, chunk_seconds, output_dir).await,
    }
}

fn list_devices(json: bool) -> Result<()> {
    let devices = DeviceCatalog::enumerate()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for device in &devices {
        println!("{:>7}  {}", device.direction.to_string(), device.name);
    }
    if devices.is_empty() {
        println!("no audio devices found");
    }
    Ok(())
}

async fn record(
    mut config: Config,
    system: String,
    mic: String,
    chunk_seconds: Option<u64>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(secs) = chunk_seconds {
        if !(MIN_CHUNK_SECS..=MAX_CHUNK_SECS).contains(&secs) {
            bail!("--chunk-seconds must be between {MIN_CHUNK_SECS} and {MAX_CHUNK_SECS}, got {secs}");
        }
        config.session.chunk_seconds = secs;
    }
    if let Some(dir) = output_dir {
        config.audio.output_dir = dir;
    }

    info!("tandem-scribe v{}", env!("CARGO_PKG_VERSION"));
    info!("output dir: {}", config.audio.output_dir.display());

    let controller = CaptureController::new(config, Arc::new(DryRunTranscriber));
    let mut events = controller.subscribe();

    // Print events as they arrive; lagging just skips old ones.
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CaptureEvent::Transcript(text)) => println!("{text}"),
                Ok(CaptureEvent::Status(s)) => eprintln!("[status] {s}"),
                Ok(CaptureEvent::Error(e)) => eprintln!("[error] {e}"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    controller.select_device(DeviceDirection::Output, system);
    controller.select_device(DeviceDirection::Input, mic);
    controller.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping");
    controller.stop().await?;
    Ok(())
}

use std::path::PathBuf;

use allsky_core::protocol::block_checksum;
use allsky_core::{
    AcquisitionOutcome, AcquisitionParams, AllskyCamera, CameraConfig, ChecksumPolicy, FrameKind,
    ImageKind, SubframeParams,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "SBIG AllSky 340 camera tool", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device (overrides the configuration)
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate (overrides the configuration)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Fail on checksum mismatches instead of logging them
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check that the camera answers
    Test,
    /// Print the firmware version
    Version,
    /// Print the serial number
    Serial,
    /// Switch the dew heater
    Heater { state: Switch },
    /// Switch the chopper
    Chop { state: Switch },
    /// Move the shutter
    Shutter { action: ShutterAction },
    /// Define the subframe used by custom frame acquisitions
    Subframe {
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
        #[arg(long)]
        size: i32,
    },
    /// Abort a running exposure
    Abort,
    /// Take an image and report what was received
    Acquire {
        #[arg(long, default_value = "light")]
        image: ImageKind,
        #[arg(long, default_value = "full")]
        frame: FrameKind,
        /// Subframe size for custom frames
        #[arg(long)]
        size: Option<u32>,
        /// Exposure in seconds
        #[arg(short, long)]
        exposure: f64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ShutterAction {
    Open,
    Close,
}

fn load_config(args: &Args) -> Result<CameraConfig> {
    let mut config = match &args.config {
        Some(path) => CameraConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CameraConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if args.strict {
        config.checksum_policy = ChecksumPolicy::Strict;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let mut camera = AllskyCamera::from_config(&config);
    camera
        .open()
        .with_context(|| format!("Failed to open {}", config.device))?;

    match args.command {
        Cmd::Test => {
            camera.send_test()?;
            println!("Test passed.");
        }
        Cmd::Version => {
            let version = camera.get_firmware_version()?;
            println!("Firmware version: {version} (0x{version:04X})");
        }
        Cmd::Serial => {
            println!("Serial number: {}", camera.get_serial_number()?);
        }
        Cmd::Heater { state } => match state {
            Switch::On => camera.heater_on()?,
            Switch::Off => camera.heater_off()?,
        },
        Cmd::Chop { state } => match state {
            Switch::On => camera.chop_on()?,
            Switch::Off => camera.chop_off()?,
        },
        Cmd::Shutter { action } => match action {
            ShutterAction::Open => camera.open_shutter()?,
            ShutterAction::Close => camera.close_shutter()?,
        },
        Cmd::Subframe { x, y, size } => {
            camera.define_subframe(SubframeParams {
                x_start: x,
                y_start: y,
                size,
            })?;
        }
        Cmd::Abort => camera.abort()?,
        Cmd::Acquire {
            image,
            frame,
            size,
            exposure,
        } => {
            let mut params = AcquisitionParams::new(image, frame, exposure);
            if let Some(size) = size {
                params = params.with_subframe_size(size);
            }

            let mut last_percent = None;
            let outcome = camera.acquire(&params, |progress| {
                let percent = progress.display_percent();
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    info!("{progress}");
                }
            })?;

            match outcome {
                AcquisitionOutcome::Complete(image) => {
                    println!(
                        "Received {}x{} {} image: {} bytes, checksum 0x{:02X}",
                        image.width,
                        image.height,
                        image.image_kind,
                        image.data.len(),
                        block_checksum(&image.data)
                    );
                }
                AcquisitionOutcome::Cancelled => println!("Acquisition aborted."),
            }
        }
    }

    camera.close()?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting AllSky camera tool...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

//! Command-line slicer: load a WAV, detect onsets, print the region table
//! and optionally audition slices.

use clap::Parser;
use reslice::{Error, EnvelopeMode, Result, SliceConfig, SliceSession};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reslice", version, about = "Slice a recording at its onsets onto a tempo grid")]
struct Cli {
    /// WAV file to slice
    file: Option<PathBuf>,

    /// Session settings as JSON (any subset of fields)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Tempo for the grid and quantizer
    #[arg(long)]
    bpm: Option<f64>,

    /// Rows per 4/4 bar
    #[arg(long)]
    rows_per_bar: Option<u32>,

    /// Quantize steps per bar
    #[arg(long)]
    subdivision: Option<u32>,

    /// Estimate the tempo and use it for the grid. Onsets are snapped to the
    /// detected tempo, not the --bpm value
    #[arg(long)]
    detect_tempo: bool,

    /// Skip onset detection and keep one region spanning the file
    #[arg(long)]
    no_detect: bool,

    /// Leave out zero-length regions instead of failing on them
    #[arg(long)]
    lenient: bool,

    /// Play one region by index
    #[arg(long, value_name = "INDEX")]
    region: Option<usize>,

    /// Play the whole file
    #[arg(long, conflicts_with = "region")]
    play_all: bool,

    /// Output device index (see --list-devices)
    #[arg(long)]
    device: Option<usize>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_devices {
        write_devices(&reslice::list_devices()?, &mut std::io::stdout().lock())?;
        return Ok(());
    }

    let Some(file) = cli.file.as_deref() else {
        return Err(Error::Config("no input file given".into()));
    };

    let mut config = match cli.config.as_deref() {
        Some(path) => read_config(path)?,
        None => SliceConfig::default(),
    };
    if let Some(bpm) = cli.bpm {
        config.bpm = bpm;
    }
    if let Some(rows_per_bar) = cli.rows_per_bar {
        config.rows_per_bar = rows_per_bar;
    }
    if let Some(subdivision) = cli.subdivision {
        config.subdivision = subdivision;
    }

    let mut builder = SliceSession::builder()
        .config(config)
        .wav(file)
        .envelope_mode(EnvelopeMode::Peak);
    if let Some(device) = cli.device {
        builder = builder.output_device(device);
    }
    let mut session = builder.build()?;

    if !cli.no_detect {
        let detection = session.detect_onsets(cli.detect_tempo)?;
        if let Some(bpm) = detection.detected_bpm {
            println!("detected tempo: {bpm:.1} bpm");
        }
    }

    let grid = session.grid()?;
    println!(
        "{}: {:.2}s at {} Hz, {} bpm, {} rows ({} per bar, {} samples per row)",
        file.display(),
        session.audio().duration_seconds(),
        session.sample_rate(),
        grid.bpm(),
        grid.total_rows(),
        grid.rows_per_bar(),
        grid.samples_per_row(),
    );

    for region in session.export_regions(!cli.lenient)? {
        println!("{region}");
    }

    if cli.region.is_some() || cli.play_all {
        session.start_output()?;
        let range = match cli.region {
            Some(index) => session.play_region(index)?,
            None => session.play_all(),
        };
        if let Some(range) = range {
            let length = range.len() as f64 / f64::from(session.sample_rate().max(1));
            let deadline = Instant::now() + Duration::from_secs_f64(length + 1.0);
            while session.is_playing() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
        session.stop_output();
    }

    Ok(())
}

/// Device entries already carry their index.
fn write_devices(devices: &[String], out: &mut impl Write) -> std::io::Result<()> {
    for device in devices {
        writeln!(out, "{device}")?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<SliceConfig> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use mobiledoas::acquisition::{plan, MeasurementConfig, DEFAULT_MAX_SCANS_PER_CAPTURE};
use mobiledoas::io::read_std_file;

/// Inspect spectrum files and measurement settings
#[derive(Parser, Debug)]
#[command(version, about)]
struct App {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe an STD spectrum file, gzip-compressed or not
    Info {
        path: PathBuf,
        /// Print the spectrum as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Show how a time resolution is split into device and host co-adding
    Plan {
        /// The exposure of a single scan in milliseconds
        #[arg(short, long)]
        exposure: u32,
        /// The time between reported spectra in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        resolution: u32,
        #[arg(short, long, default_value_t = DEFAULT_MAX_SCANS_PER_CAPTURE)]
        max_scans: u32,
    },
    /// Load and check a JSON measurement configuration
    Config { path: PathBuf },
}

fn describe(path: PathBuf, json: bool) -> io::Result<()> {
    let spectrum = read_std_file(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&spectrum)?);
        return Ok(());
    }
    let info = &spectrum.info;
    println!("File: {}", path.display());
    println!("Name: {}", info.name);
    println!(
        "Spectrometer: {} {}",
        info.spectrometer_model, info.spectrometer_serial
    );
    println!("Samples: {}", spectrum.len());
    println!("Exposure: {} ms x {} scans", info.exposure_time, info.scans);
    if let (Some(start), Some(stop)) = (info.start_time, info.stop_time) {
        println!("Captured: {start} to {}", stop.time());
    }
    match info.gps {
        Some(fix) => println!(
            "Position: {:.6}, {:.6} at {:.1} m",
            fix.latitude, fix.longitude, fix.altitude
        ),
        None => println!("Position: unknown"),
    }
    println!("Dark: {}", info.is_dark);
    if let Some((low, high)) = spectrum.min_max(0) {
        println!(
            "Intensity: min {low:.1}, max {high:.1}, mean {:.1}",
            spectrum.average(0)
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let app = App::parse();
    let result = match app.command {
        Command::Info { path, json } => describe(path, json),
        Command::Plan {
            exposure,
            resolution,
            max_scans,
        } => plan(exposure, resolution, max_scans)
            .map(|p| {
                println!(
                    "{} scans on the device x {} on the host = {} ms",
                    p.scans_on_device,
                    p.groups_on_host,
                    p.duration_ms(exposure)
                );
            })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e)),
        Command::Config { path } => MeasurementConfig::from_json_file(&path).and_then(|config| {
            config
                .validate()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            println!("{config:#?}");
            Ok(())
        }),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

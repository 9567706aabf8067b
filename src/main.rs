use std::process::ExitCode;

use clap::Parser;
use qibla_core::{AppError, Config, ConfigError};
use qibla_locate::{calculate_bearing, Compass, Coordinate, LocationRecord, RawOrientation};
use tokio::io::{AsyncBufReadExt, BufReader};

mod services;

#[derive(Parser)]
#[command(name = "qibla", version, about = "Qibla direction from your current location")]
struct Cli {
    /// Ignore the cached location and ask the device for a new fix
    #[arg(long)]
    refresh: bool,

    /// Delete the cached location and exit
    #[arg(long)]
    clear: bool,

    /// Read orientation events (`webkit:<deg>` or `alpha:<deg>`) from stdin
    /// and print the dial rotation for each
    #[arg(long)]
    headings: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize core
    if let Err(e) = qibla_core::init() {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let (config, _validation) = Config::load_validated().map_err(AppError::classify)?;
    let store = services::build_store(&config)?;

    if cli.clear {
        store.clear().map_err(services::location_error)?;
        println!("Location cache cleared.");
        return Ok(());
    }

    let reference = Coordinate::new(config.qibla.latitude, config.qibla.longitude)
        .map_err(|e| ConfigError::Invalid(format!("qibla reference point: {}", e)))?;

    let record = store
        .resolve(cli.refresh)
        .await
        .map_err(services::location_error)?;
    let bearing = calculate_bearing(&reference, &record.coordinate);
    print_location(&record);
    println!("Qibla:    {} from true north", bearing);

    if cli.headings {
        let compass = Compass::activate(&services::StdinOrientation)
            .await
            .map_err(services::compass_error)?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawOrientation = match line.parse() {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("Skipping orientation event: {}", e);
                    continue;
                }
            };
            let Some(heading) = compass.publish(raw) else {
                continue;
            };
            let rotation = compass.rotation(&bearing).map_err(services::compass_error)?;
            match rotation.relative_degrees {
                Some(relative) => println!(
                    "heading {:6.1}°  dial {:7.1}°  qibla {:6.1}° clockwise",
                    heading.degrees(),
                    rotation.dial_degrees,
                    relative
                ),
                None => println!(
                    "heading {:6.1}°  dial {:7.1}°  qibla undetermined",
                    heading.degrees(),
                    rotation.dial_degrees
                ),
            }
        }
    }

    Ok(())
}

fn print_location(record: &LocationRecord) {
    println!("Location: {}, {}", record.city, record.country);
    match record.accuracy_meters {
        Some(accuracy) => println!("Position: {} (±{:.0} m)", record.coordinate, accuracy),
        None => println!("Position: {}", record.coordinate),
    }
    println!(
        "Captured: {}",
        record.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

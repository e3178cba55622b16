// Headless driver: probes a range, plays it, and prints every session event
// as one JSON object per line.
//
//   framelapse --start 2025-05-12T16:40:00Z --end 2025-05-12T17:00:00Z --ticks 6

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use framelapse_lib::check::HttpExistenceCheck;
use framelapse_lib::frames::{default_base_time, Clock, SystemClock, TimeRange};
use framelapse_lib::logging;
use framelapse_lib::session::{spawn_session, EngineEvent};
use framelapse_lib::settings::EngineSettings;

#[derive(Parser, Debug)]
#[command(name = "framelapse", version, about = "Preload and play a time range of raster frames")]
struct Cli {
    /// Range start (RFC 3339 or YYYY-MM-DD). Defaults to the lagged default base.
    #[arg(long)]
    start: Option<String>,

    /// Range end, inclusive.
    #[arg(long)]
    end: Option<String>,

    /// Delay between frames in milliseconds.
    #[arg(long)]
    speed_ms: Option<u64>,

    /// Settings file (TOML). Defaults to the user config file if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the log to a timestamped file in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Exit after this many frame changes.
    #[arg(long, default_value_t = 10)]
    ticks: usize,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.log_dir {
        logging::init_file_logging(dir)?;
    }

    let settings = EngineSettings::load(cli.config.as_deref())?;
    let check = HttpExistenceCheck::new(&settings)?;
    let default_start = default_base_time(
        SystemClock.now(),
        settings.default_lag_hours,
        settings.interval_minutes,
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let handle = spawn_session(settings, Arc::new(check), Arc::new(tx), Arc::new(SystemClock));

    if let Some(speed_ms) = cli.speed_ms {
        handle.set_speed(speed_ms)?;
    }
    if let Some(range) = TimeRange::from_params(cli.start.as_deref(), cli.end.as_deref(), default_start) {
        handle.start_range(range)?;
    }

    let mut frames_shown = 0;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let line = serde_json::to_string(&event)
                    .map_err(|e| format!("Failed to serialize {} event: {}", event.name(), e))?;
                println!("{}", line);

                match event {
                    EngineEvent::DisplayTime(_) => {
                        frames_shown += 1;
                        if frames_shown >= cli.ticks {
                            break;
                        }
                    }
                    EngineEvent::NoData { .. } | EngineEvent::PlaybackStopped { .. } => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await?;
    logging::stop_file_logging();
    Ok(())
}

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::analytics::{
    read_series_csv, summarize, write_series_csv, write_summary_csv, EmptyDataError,
};
use crate::db::Database;
use crate::detection::{DetectionController, DetectionModel, RunEnd};
use crate::replay::{ReplayModel, ReplaySource};
use crate::settings::{AnalyticsSettings, SettingsStore};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const DATABASE_FILE_NAME: &str = "footfall.sqlite3";

#[derive(Parser, Debug)]
#[command(name = "footfall", about = "Occupancy tracking and footfall analytics")]
pub struct Cli {
    /// Directory holding the observation database and settings.
    #[arg(long, global = true, default_value = "analytics")]
    pub data_dir: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run occupancy sampling over a recorded track log.
    Replay(ReplayArgs),
    /// Print summary statistics over the stored series.
    Summary {
        /// Print as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Write the stored series (or its summary) as CSV.
    Export {
        /// Export summary statistics instead of raw observations.
        #[arg(long)]
        summary: bool,
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Append observations from a CSV export to the store.
    Import { path: PathBuf },
    /// Delete all stored observations.
    Reset,
    /// Show or change persisted settings.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines recording, one `{"track_ids": [...]}` object per frame.
    pub recording: PathBuf,
    /// Playback rate; 0 replays as fast as possible.
    #[arg(long, default_value_t = 10.0)]
    pub fps: f64,
    /// Override the configured sampling interval for this run.
    #[arg(long)]
    pub sampling_interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(long)]
    pub sampling_interval_ms: Option<u64>,
    #[arg(long)]
    pub live_queue_depth: Option<usize>,
}

/// Shared resources opened once per invocation.
pub struct AppContext {
    pub db: Database,
    pub settings: SettingsStore,
}

impl AppContext {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
        let db = Database::new(data_dir.join(DATABASE_FILE_NAME))?;
        let settings = SettingsStore::in_dir(data_dir)?;
        Ok(Self { db, settings })
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = AppContext::open(&cli.data_dir)?;

    match cli.command {
        Command::Replay(args) => replay(&ctx, args).await,
        Command::Summary { json } => print_summary(&ctx, json).await,
        Command::Export { summary, output } => export(&ctx, summary, output.as_deref()).await,
        Command::Import { path } => import(&ctx, &path).await,
        Command::Reset => {
            let removed = ctx.db.reset_observations().await?;
            info!("Analytics reset; removed {removed} observations");
            println!("Analytics reset.");
            Ok(())
        }
        Command::Config(args) => configure(&ctx, args),
    }
}

async fn replay(ctx: &AppContext, args: ReplayArgs) -> Result<()> {
    let mut settings = ctx.settings.analytics();
    if let Some(interval_ms) = args.sampling_interval_ms {
        settings.sampling_interval_ms = interval_ms;
    }
    let config = settings.sampling_config()?;

    let model = ReplayModel::from_path(&args.recording)?;
    // Zero means unpaced; anything else is validated by the source.
    let fps = (args.fps != 0.0).then_some(args.fps);
    let source = ReplaySource::new(&model, fps)?;
    let model: Arc<dyn DetectionModel> = Arc::new(model);

    let mut controller =
        DetectionController::new(ctx.db.clone(), model, config, settings.live_queue_depth);
    let mut live = controller.start(Box::new(source))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let stop_requested = loop {
        tokio::select! {
            frame = live.recv() => match frame {
                Some(frame) => log_debug!(
                    "frame {}: {} detections, occupancy {}{}",
                    frame.frame.index,
                    frame.detections.len(),
                    frame.occupancy,
                    if frame.sampled { " (sampled)" } else { "" }
                ),
                None => break false,
            },
            _ = &mut ctrl_c => {
                info!("Stop requested; flushing sampled observations");
                break true;
            }
        }
    };

    let report = if stop_requested {
        controller.stop().await?
    } else {
        controller.wait().await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let RunEnd::Failed(reason) = &report.end {
        bail!("detection run failed: {reason}");
    }
    Ok(())
}

async fn print_summary(ctx: &AppContext, json: bool) -> Result<()> {
    let series = ctx.db.load_observations().await?;
    let summary = match summarize(&series) {
        Ok(summary) => summary,
        Err(EmptyDataError) => {
            println!("No analytics data available.");
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Average occupancy: {:.2}", summary.mean_occupancy_rounded());
    println!("Peak occupancy:    {}", summary.peak_occupancy);
    println!("Peak time:         {}", summary.peak_timestamp.format("%H:%M:%S"));
    println!("Observations:      {}", summary.observation_count);
    println!("Average occupancy per hour:");
    for (hour, average) in &summary.hourly_average {
        println!("  {hour:02}:00  {average:.2}");
    }
    Ok(())
}

async fn export(ctx: &AppContext, summary_only: bool, output: Option<&Path>) -> Result<()> {
    let series = ctx.db.load_observations().await?;
    let summary = if summary_only {
        match summarize(&series) {
            Ok(summary) => Some(summary),
            Err(EmptyDataError) => {
                println!("No analytics data available.");
                return Ok(());
            }
        }
    } else {
        None
    };

    // The output file is only truncated once there is data to write.
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    match summary {
        Some(summary) => write_summary_csv(&summary, writer)?,
        None => write_series_csv(&series, writer)?,
    }

    if let Some(path) = output {
        info!("Exported analytics to {}", path.display());
    }
    Ok(())
}

async fn import(ctx: &AppContext, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let series = read_series_csv(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))?;
    let written = ctx.db.append_observations(&series).await?;
    println!("Imported {written} observations.");
    Ok(())
}

fn configure(ctx: &AppContext, args: ConfigArgs) -> Result<()> {
    let current = ctx.settings.analytics();
    let updated = AnalyticsSettings {
        sampling_interval_ms: args
            .sampling_interval_ms
            .unwrap_or(current.sampling_interval_ms),
        live_queue_depth: args.live_queue_depth.unwrap_or(current.live_queue_depth),
    };

    if updated != current {
        ctx.settings.update_analytics(updated.clone())?;
        info!("Settings saved to {}", ctx.settings.path().display());
    }
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_dir;

    #[test]
    fn cli_parses_replay_with_overrides() {
        let cli = Cli::parse_from([
            "footfall",
            "--data-dir",
            "/tmp/store",
            "replay",
            "walk.jsonl",
            "--fps",
            "0",
            "--sampling-interval-ms",
            "250",
        ]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/store"));
        match cli.command {
            Command::Replay(args) => {
                assert_eq!(args.recording, PathBuf::from("walk.jsonl"));
                assert_eq!(args.fps, 0.0);
                assert_eq!(args.sampling_interval_ms, Some(250));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn data_dir_defaults_to_analytics() {
        let cli = Cli::parse_from(["footfall", "summary", "--json"]);
        assert_eq!(cli.data_dir, PathBuf::from("analytics"));
        assert!(matches!(cli.command, Command::Summary { json: true }));
    }

    #[tokio::test]
    async fn summary_export_of_empty_store_keeps_previous_report() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir.0).unwrap();
        let report = dir.0.join("report.csv");
        let previous = "metric,value\nmean_occupancy,3.33\n";
        std::fs::write(&report, previous).unwrap();

        let cli = Cli::parse_from([
            "footfall",
            "--data-dir",
            dir.0.join("analytics").to_str().unwrap(),
            "export",
            "--summary",
            "--output",
            report.to_str().unwrap(),
        ]);
        execute(cli).await.unwrap();

        assert_eq!(std::fs::read_to_string(&report).unwrap(), previous);
    }

    #[tokio::test]
    async fn negative_fps_is_rejected_not_unpaced() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir.0).unwrap();
        let recording = dir.0.join("walk.jsonl");
        std::fs::write(&recording, "{\"track_ids\": [1]}\n").unwrap();

        let cli = Cli::parse_from([
            "footfall",
            "--data-dir",
            dir.0.join("analytics").to_str().unwrap(),
            "replay",
            recording.to_str().unwrap(),
            "--fps=-5",
        ]);
        let err = execute(cli).await.unwrap_err();
        assert!(err.to_string().contains("fps must be positive"));

        let db = Database::new(dir.0.join("analytics").join(DATABASE_FILE_NAME)).unwrap();
        assert_eq!(db.count_observations().await.unwrap(), 0);
    }
}

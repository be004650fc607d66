//! Cache command - inspect the store cache volume

use crate::cache::{labels, CacheState, CacheVolume};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::environment::EnvironmentLayout;
use crate::error::FlakeboxResult;
use crate::orchestration::{create_runtime, ContainerRuntime, VolumeInfo};
use console::style;
use serde::Serialize;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> FlakeboxResult<()> {
    let runtime = create_runtime()?;

    match args.action {
        CacheAction::Status { format } => show_status(&*runtime, config, format).await,
    }
}

/// What is known about the cache volume
#[derive(Debug, Serialize)]
struct CacheReport {
    volume: String,
    state: CacheState,
    base_image: String,
    seeded_from: Option<String>,
    created_at: Option<String>,
    mountpoint: Option<String>,
    stale: bool,
}

impl CacheReport {
    fn new(volume: &CacheVolume, state: CacheState, info: Option<&VolumeInfo>) -> Self {
        let seeded_from = info.and_then(|i| i.labels.get(labels::BASE_IMAGE).cloned());
        let created_at = info.and_then(|i| {
            i.labels
                .get(labels::CREATED_AT)
                .cloned()
                .or_else(|| i.created_at.clone())
        });
        let stale = seeded_from
            .as_deref()
            .is_some_and(|image| image != volume.base_image);

        Self {
            volume: volume.name.clone(),
            state,
            base_image: volume.base_image.clone(),
            seeded_from,
            created_at,
            mountpoint: info.and_then(|i| i.mountpoint.clone()),
            stale,
        }
    }
}

async fn show_status(
    runtime: &dyn ContainerRuntime,
    config: &Config,
    format: OutputFormat,
) -> FlakeboxResult<()> {
    runtime.ensure_ready().await?;

    let volume = EnvironmentLayout::from_config(config).volume;
    let state = volume.probe(runtime).await?;
    let info = match state {
        CacheState::Absent => None,
        _ => runtime.volume_inspect(&volume.name).await?,
    };
    let report = CacheReport::new(&volume, state, info.as_ref());

    match format {
        OutputFormat::Table => print_report_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

fn print_report_table(report: &CacheReport) {
    let state_display = match report.state {
        CacheState::Ready => style("ready").green().to_string(),
        CacheState::Seeding => style("seeding").yellow().to_string(),
        CacheState::Absent => style("absent (seeded on first check)").dim().to_string(),
    };

    println!("{:<14} {}", "VOLUME", report.volume);
    println!("{:<14} {}", "STATE", state_display);
    println!("{:<14} {}", "BASE IMAGE", report.base_image);

    if let Some(ref image) = report.seeded_from {
        let shown = if report.stale {
            style(format!("{} (differs from base image)", image))
                .yellow()
                .to_string()
        } else {
            image.clone()
        };
        println!("{:<14} {}", "SEEDED FROM", shown);
    }
    if let Some(ref created) = report.created_at {
        println!("{:<14} {}", "CREATED", created);
    }
    if let Some(ref mountpoint) = report.mountpoint {
        println!("{:<14} {}", "MOUNTPOINT", mountpoint);
    }
}

mod capture;
mod config;
mod panels;
mod yolo;

use anyhow::{Context, Result};
use capture::OpenCvOpener;
use config::MonitorConfig;
use lanewatch::{AnalysisController, PanelBus, StatusLevel};
use panels::PanelDisplay;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use yolo::YoloDetector;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lanewatch=info,lane_monitor=info")),
        )
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: lane_monitor <config.yaml> <video_path>...");
        return Ok(());
    }
    let config = MonitorConfig::load(Path::new(&args[1]))?;
    let videos = &args[2..];
    info!("✓ Configuration loaded");

    // --- 2. Detector & Controller ---
    let detector = YoloDetector::load(&config.model)?;
    let bus = PanelBus::new(videos.len());
    let mut controller = AnalysisController::new(
        config.analysis.clone(),
        Arc::new(OpenCvOpener),
        Arc::new(detector),
        Arc::new(bus.clone()),
    )
    .context("Failed to create analysis controller")?;

    // Subscribe every panel before any worker can publish.
    let mut display = PanelDisplay::new(&bus, &config.output)?;
    let mut status = controller.status();
    controller.upload(videos.iter());
    controller.analyze().context("Failed to start analysis")?;

    // --- 3. Display Loop ---
    let mut tick = tokio::time::interval(Duration::from_millis(config.output.refresh_ms));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_counts = controller.lane_counts();

    loop {
        tokio::select! {
            _ = tick.tick() => {
                display.render()?;

                let counts = controller.lane_counts();
                if counts != last_counts {
                    info!(%counts, "lane counts");
                    last_counts = counts;
                }
                if controller.active_workers() == 0 {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupt received, stopping analysis");
                controller.stop();
                break;
            }
            Ok(()) = status.changed() => {
                let message = status.borrow_and_update().clone();
                match message.level {
                    StatusLevel::Info => info!("{}", message.text),
                    StatusLevel::Error => warn!("{}", message.text),
                }
            }
        }
    }

    // --- 4. Shutdown ---
    let reports = controller.join(config.analysis.join_timeout()).await;
    display.render()?;

    for report in &reports {
        match &report.open_error {
            Some(err) => error!(panel = report.panel + 1, "{}", err),
            None => info!(
                panel = report.panel + 1,
                source = %report.source,
                reason = ?report.stop_reason,
                decoded = report.frames_decoded,
                processed = report.frames_processed,
                vehicles = report.detections,
                "stream finished"
            ),
        }
    }
    info!(frames = ?display.frames_shown(), "panels rendered");
    info!(counts = %controller.lane_counts(), "Processing complete");
    Ok(())
}

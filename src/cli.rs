use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};

use crate::analysis::{
    AnalysisOrchestrator, AnalysisResult, AnalysisState, HttpAnalysisBackend, PredictedLoads,
    StateTransition, VideoUpload,
};
use crate::config::Settings;
use crate::error::AppError;
use crate::heatmap::{format_percentage, save_png, HeatmapRenderer, Zone};

#[derive(Parser, Debug)]
#[command(
    name = "vorma",
    about = "Video-based Orthotic Recommendation through ML & Gait Analysis"
)]
pub struct Cli {
    /// Settings file; defaults to an optional vorma.toml in the working directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Launch the desktop app (the default).
    Gui,
    /// Analyze a video without the desktop app.
    Analyze {
        video: PathBuf,
        /// Also write the pressure heatmap to this PNG file.
        #[arg(long)]
        heatmap: Option<PathBuf>,
        /// Print the full result as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Render a heatmap for the given loads.
    Render {
        #[arg(long)]
        forefoot: f64,
        #[arg(long)]
        midfoot: f64,
        #[arg(long)]
        rearfoot: f64,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Runs one analysis to completion. Returns whether it completed.
pub async fn analyze(
    settings: &Settings,
    video: &Path,
    heatmap: Option<&Path>,
    json: bool,
) -> Result<bool, AppError> {
    let upload = VideoUpload::from_path(video, settings.upload.max_file_bytes)?;
    let backend = HttpAnalysisBackend::new(&settings.services)?;
    let orchestrator = AnalysisOrchestrator::builder()
        .backend(Arc::new(backend))
        .min_display(settings.pipeline.min_display())
        .build()?;

    let mut transitions = orchestrator.transitions();
    let mut handle = orchestrator.submit(upload)?;

    loop {
        tokio::select! {
            joined = &mut handle => {
                joined.map_err(|e| AppError::Task(format!("Analysis task failed: {}", e)))?;
                break;
            }
            received = transitions.recv() => match received {
                Ok(transition) => report_progress(&transition),
                Err(RecvError::Lagged(n)) => warn!("Missed {} state transitions", n),
                Err(RecvError::Closed) => {}
            },
        }
    }
    loop {
        match transitions.try_recv() {
            Ok(transition) => report_progress(&transition),
            Err(TryRecvError::Lagged(n)) => warn!("Missed {} state transitions", n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    let snapshot = orchestrator.snapshot();
    match (snapshot.state, snapshot.result) {
        (AnalysisState::Completed, Some(result)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(result.as_ref())?);
            } else {
                print!("{}", format_report(&result));
            }
            if let Some(path) = heatmap {
                render(
                    &result.predicted_loads,
                    settings.heatmap.width,
                    settings.heatmap.height,
                    path,
                )?;
            }
            Ok(true)
        }
        _ => {
            let message = snapshot
                .error_message
                .unwrap_or_else(|| format!("Analysis ended while {}", snapshot.state));
            eprintln!("{}", message);
            eprintln!("Please try uploading your video again.");
            Ok(false)
        }
    }
}

fn report_progress(transition: &StateTransition) {
    if transition.to.is_busy() {
        eprintln!("{}", transition.to.description());
    }
}

/// Renders a heatmap straight to a PNG file.
pub fn render(
    loads: &PredictedLoads,
    width: u32,
    height: u32,
    output: &Path,
) -> Result<(), AppError> {
    let renderer = HeatmapRenderer::new()?;
    let pixmap = renderer.render(width, height, loads).ok_or_else(|| {
        AppError::Render(format!("Cannot render onto a {}x{} canvas", width, height))
    })?;
    save_png(&pixmap, output)?;
    info!("Heatmap written to {}", output.display());
    Ok(())
}

/// Plain text summary of a completed run.
pub fn format_report(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({} frames analyzed)",
        result.video_filename, result.num_frames
    );

    let _ = writeln!(out, "\nPressure distribution");
    for zone in Zone::ALL {
        let _ = writeln!(
            out,
            "  {:<24}{:>8}",
            zone.label(),
            format_percentage(zone.load(&result.predicted_loads))
        );
    }

    let _ = writeln!(out, "\nOrthotic prescription");
    let _ = writeln!(out, "  {:<24}{:>8}", "Parameter", "Height (mm)");
    for (label, value) in result.orthotic_prescription.rows() {
        let _ = writeln!(out, "  {:<24}{:>8.2}", label, value);
    }
    out
}

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vorma::app::VormaApp;
use vorma::cli::{self, Cli, Command};
use vorma::config::Settings;
use vorma::error::AppError;

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    let args = Cli::parse();
    let settings = Settings::load(args.config.as_deref())?;
    init_logging(&settings);

    match args.command.unwrap_or(Command::Gui) {
        Command::Gui => {
            info!("Starting desktop app");
            VormaApp::start_gui(settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze {
            video,
            heatmap,
            json,
        } => {
            let completed = cli::analyze(&settings, &video, heatmap.as_deref(), json).await?;
            Ok(if completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Render {
            forefoot,
            midfoot,
            rearfoot,
            width,
            height,
            output,
        } => {
            let loads = vorma::analysis::PredictedLoads {
                forefoot,
                midfoot,
                rearfoot,
            };
            cli::render(
                &loads,
                width.unwrap_or(settings.heatmap.width),
                height.unwrap_or(settings.heatmap.height),
                &output,
            )?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

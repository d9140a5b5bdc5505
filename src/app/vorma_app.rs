use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::analysis::{AnalysisOrchestrator, AnalysisSnapshot, HttpAnalysisBackend};
use crate::app::views::{result_view::ResultView, upload_view::UploadView, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::heatmap::HeatmapRenderer;

const TITLE: &str = "VORMA";
const SUBTITLE: &str = "Video-based Orthotic Recommendation through ML & Gait Analysis";
const BUSY_REPAINT: Duration = Duration::from_millis(100);

pub struct VormaApp {
    orchestrator: AnalysisOrchestrator,
    snapshot_rx: watch::Receiver<AnalysisSnapshot>,
    upload_view: UploadView,
    result_view: ResultView,
    errors: Vec<AppError>,
}

impl VormaApp {
    pub fn new(orchestrator: AnalysisOrchestrator, settings: &Settings) -> Self {
        let mut errors = Vec::new();
        let renderer = match HeatmapRenderer::new() {
            Ok(renderer) => Some(renderer),
            Err(e) => {
                error!("Heatmap renderer unavailable: {}", e);
                errors.push(e);
                None
            }
        };

        Self {
            snapshot_rx: orchestrator.subscribe(),
            orchestrator,
            upload_view: UploadView::new(settings.upload.max_file_bytes),
            result_view: ResultView::new(renderer, settings.heatmap.width, settings.heatmap.height),
            errors,
        }
    }

    pub fn start_gui(settings: Settings) -> Result<(), AppError> {
        let backend = HttpAnalysisBackend::new(&settings.services)?;
        info!(
            "Using extractor {} and predictor {}",
            backend.analyze_url(),
            backend.predict_url()
        );
        let orchestrator = AnalysisOrchestrator::builder()
            .backend(Arc::new(backend))
            .min_display(settings.pipeline.min_display())
            .build()?;

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(1100.0, 760.0))
                .with_title(TITLE)
                .with_drag_and_drop(true),
            ..Default::default()
        };

        eframe::run_native(
            TITLE,
            options,
            Box::new(move |_cc| Ok(Box::new(VormaApp::new(orchestrator, &settings)))),
        )
        .map_err(|e| AppError::Ui(e.to_string()))
    }

    fn sync_state(&mut self) {
        if self.snapshot_rx.has_changed().unwrap_or(false) {
            let snapshot = self.snapshot_rx.borrow_and_update().clone();
            self.upload_view.set_state(snapshot.state);
            self.result_view.set_snapshot(snapshot);
        }
    }

    fn handle_requests(&mut self) {
        if let Some(video) = self.upload_view.take_request() {
            // The run task finishes on its own; progress arrives through the snapshot.
            if let Err(e) = self.orchestrator.submit(video) {
                warn!("Submission refused: {}", e);
                self.errors.push(e);
            }
        }

        if self.result_view.take_new_analysis() {
            if let Err(e) = self.orchestrator.reset() {
                self.errors.push(e);
            }
            self.upload_view.clear();
        }
    }
}

impl eframe::App for VormaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.sync_state();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(egui::RichText::new(TITLE).strong().size(32.0));
                ui.label(SUBTITLE);
            });
        });

        if !self.errors.is_empty() {
            egui::TopBottomPanel::bottom("error_panel")
                .resizable(true)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.heading("Error Log");
                        if ui.button("Dismiss").clicked() {
                            self.errors.clear();
                        }
                    });
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        for error in self.errors.iter().rev() {
                            ui.label(format!("[ERROR] {}", error));
                        }
                    });
                });
        }

        egui::SidePanel::left("upload_panel")
            .resizable(false)
            .exact_width(340.0)
            .show(ctx, |ui| {
                self.upload_view.draw(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.result_view.draw(ui);
            });
        });

        self.handle_requests();

        if self.orchestrator.state().is_busy() {
            ctx.request_repaint_after(BUSY_REPAINT);
        }
    }
}

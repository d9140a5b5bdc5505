use egui::TextureOptions;
use egui_extras::{Column, TableBuilder};
use tracing::{debug, error};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, AnalysisSnapshot, AnalysisState, GaitFeatures};
use crate::app::views::View;
use crate::heatmap::{legend, to_color_image, HeatmapRenderer};

const RETRY_HINT: &str = "Please try uploading your video again.";
const DISCLAIMER: &str = "These recommendations are generated by machine learning models and \
should be reviewed by a qualified healthcare professional before use.";

/// Right hand card: progress while a run is in flight, the outcome after.
pub struct ResultView {
    renderer: Option<HeatmapRenderer>,
    canvas: (u32, u32),
    snapshot: AnalysisSnapshot,
    heatmap: Option<(Uuid, egui::TextureHandle)>,
    metrics: Option<(Uuid, Option<GaitFeatures>)>,
    new_analysis: bool,
}

impl ResultView {
    pub fn new(renderer: Option<HeatmapRenderer>, width: u32, height: u32) -> Self {
        Self {
            renderer,
            canvas: (width, height),
            snapshot: AnalysisSnapshot::idle(),
            heatmap: None,
            metrics: None,
            new_analysis: false,
        }
    }

    pub fn set_snapshot(&mut self, snapshot: AnalysisSnapshot) {
        if snapshot.result.is_none() {
            self.heatmap = None;
            self.metrics = None;
        }
        self.snapshot = snapshot;
    }

    /// Whether the user asked to start over since the last call.
    pub fn take_new_analysis(&mut self) -> bool {
        std::mem::take(&mut self.new_analysis)
    }

    fn draw_idle(&self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.heading("Awaiting video upload");
            ui.label("Upload a walking video to receive a pressure map and orthotic prescription.");
        });
    }

    fn draw_busy(&self, ui: &mut egui::Ui, state: AnalysisState) {
        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.spinner();
            ui.heading(&self.snapshot.loading_message);
            if let Some(detail) = state.detail() {
                ui.label(detail);
            }
            ui.add(egui::ProgressBar::new(state.progress()).show_percentage());
            if let Some(filename) = &self.snapshot.filename {
                ui.small(filename);
            }
        });
    }

    fn draw_error(&self, ui: &mut egui::Ui) {
        let message = self
            .snapshot
            .error_message
            .as_deref()
            .unwrap_or("An unknown error occurred");
        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.heading("Analysis failed");
            ui.colored_label(ui.visuals().error_fg_color, message);
            ui.label(RETRY_HINT);
        });
    }

    fn draw_completed(&mut self, ui: &mut egui::Ui, run_id: Uuid, result: &AnalysisResult) {
        ui.horizontal(|ui| {
            ui.heading("Analysis Results");
            ui.label(
                egui::RichText::new(format!("{} frames analyzed", result.num_frames))
                    .background_color(ui.visuals().faint_bg_color),
            );
        });
        ui.label(&result.video_filename);
        ui.separator();

        ui.columns(2, |columns| {
            self.draw_heatmap(&mut columns[0], run_id, result);
            draw_prescription(&mut columns[1], result);
        });

        ui.separator();
        self.draw_metrics(ui, run_id, result);

        ui.separator();
        ui.small(DISCLAIMER);
        if ui.button("New Analysis").clicked() {
            self.new_analysis = true;
        }
    }

    fn draw_heatmap(&mut self, ui: &mut egui::Ui, run_id: Uuid, result: &AnalysisResult) {
        ui.strong("Pressure Distribution");

        let cached = matches!(&self.heatmap, Some((id, _)) if *id == run_id);
        if !cached {
            self.heatmap = self.render_texture(ui.ctx(), result).map(|t| (run_id, t));
        }

        match &self.heatmap {
            Some((_, texture)) => {
                ui.image(texture);
            }
            None => {
                ui.label("Heatmap unavailable");
            }
        }

        ui.horizontal(|ui| {
            for stop in legend() {
                let (rect, _) = ui.allocate_exact_size(egui::vec2(14.0, 14.0), egui::Sense::hover());
                ui.painter().rect_filled(rect, 2.0, stop.color.to_egui());
                ui.label(stop.label);
            }
        });
    }

    fn render_texture(
        &self,
        ctx: &egui::Context,
        result: &AnalysisResult,
    ) -> Option<egui::TextureHandle> {
        let renderer = self.renderer.as_ref()?;
        let (width, height) = self.canvas;
        let pixmap = renderer.render(width, height, &result.predicted_loads)?;
        debug!("Rendered {}x{} heatmap", width, height);
        Some(ctx.load_texture("heatmap", to_color_image(&pixmap), TextureOptions::LINEAR))
    }

    fn draw_metrics(&mut self, ui: &mut egui::Ui, run_id: Uuid, result: &AnalysisResult) {
        if !matches!(&self.metrics, Some((id, _)) if *id == run_id) {
            let decoded = match result.gait_features.decode() {
                Ok(features) => Some(features),
                Err(e) => {
                    error!("Gait features could not be read: {}", e);
                    None
                }
            };
            self.metrics = Some((run_id, decoded));
        }

        ui.strong("Key Gait Metrics");
        match self.metrics.as_ref().and_then(|(_, features)| features.as_ref()) {
            Some(features) => {
                egui::Grid::new("gait_metrics").num_columns(2).show(ui, |ui| {
                    for (label, value) in metric_rows(features) {
                        ui.label(label);
                        ui.label(value);
                        ui.end_row();
                    }
                });
            }
            None => {
                ui.label("Gait metrics unavailable");
            }
        }
    }
}

fn draw_prescription(ui: &mut egui::Ui, result: &AnalysisResult) {
    ui.strong("Orthotic Prescription");
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::remainder())
        .column(Column::auto())
        .header(20.0, |mut header| {
            header.col(|ui| {
                ui.strong("Parameter");
            });
            header.col(|ui| {
                ui.strong("Height (mm)");
            });
        })
        .body(|mut body| {
            for (label, value) in result.orthotic_prescription.rows() {
                body.row(18.0, |mut row| {
                    row.col(|ui| {
                        ui.label(label);
                    });
                    row.col(|ui| {
                        ui.monospace(format!("{:.2}", value));
                    });
                });
            }
        });
}

/// Display rows for the gait metrics panel.
pub fn metric_rows(features: &GaitFeatures) -> [(&'static str, String); 4] {
    [
        ("Cadence", format!("{:.1} steps/min", features.cadence)),
        ("Stance Ratio", format!("{:.1}%", features.stance_ratio * 100.0)),
        ("Step Height", format!("{:.3} m", features.mean_step_height)),
        ("Ankle Range", format!("{:.1}°", features.ankle_angle_range)),
    ]
}

impl View for ResultView {
    fn draw(&mut self, ui: &mut egui::Ui) {
        let state = self.snapshot.state;
        ui.group(|ui| match state {
            AnalysisState::Idle => self.draw_idle(ui),
            AnalysisState::Uploading | AnalysisState::Extracting | AnalysisState::Predicting => {
                self.draw_busy(ui, state)
            }
            AnalysisState::Error => self.draw_error(ui),
            AnalysisState::Completed => {
                match (self.snapshot.run_id, self.snapshot.result.clone()) {
                    (Some(run_id), Some(result)) => self.draw_completed(ui, run_id, &result),
                    _ => self.draw_idle(ui),
                }
            }
        });
    }
}

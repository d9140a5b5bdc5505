use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::analysis::types::{format_file_size, video_mime_type};
use crate::analysis::{AnalysisState, VideoUpload};
use crate::app::views::View;
use crate::error::AppError;

/// Video selection card: a path field, drag and drop, and the analyze button.
pub struct UploadView {
    max_file_bytes: u64,
    state: AnalysisState,
    path_input: String,
    selected: Option<VideoUpload>,
    notice: Option<String>,
    requested: Option<VideoUpload>,
}

impl UploadView {
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            state: AnalysisState::Idle,
            path_input: String::new(),
            selected: None,
            notice: None,
            requested: None,
        }
    }

    pub fn set_state(&mut self, state: AnalysisState) {
        self.state = state;
    }

    pub fn selected(&self) -> Option<&VideoUpload> {
        self.selected.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.upload_enabled()
    }

    pub fn can_submit(&self) -> bool {
        self.selected.is_some() && self.is_enabled()
    }

    pub fn select_path(&mut self, path: &Path) {
        if !self.is_enabled() {
            return;
        }
        let loaded = VideoUpload::from_path(path, self.max_file_bytes);
        self.accept(loaded);
    }

    pub fn select_dropped(&mut self, file: &egui::DroppedFile) {
        if !self.is_enabled() {
            return;
        }
        if let Some(path) = &file.path {
            self.select_path(path);
        } else if let Some(bytes) = &file.bytes {
            let loaded = self.from_dropped_bytes(&file.name, bytes);
            self.accept(loaded);
        }
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.notice = None;
        self.path_input.clear();
    }

    /// The video the user asked to analyze since the last call, if any.
    pub fn take_request(&mut self) -> Option<VideoUpload> {
        self.requested.take()
    }

    fn request(&mut self) {
        if self.can_submit() {
            self.requested = self.selected.clone();
        }
    }

    fn from_dropped_bytes(&self, name: &str, bytes: &[u8]) -> Result<VideoUpload, AppError> {
        let mime_type = video_mime_type(Path::new(name))
            .ok_or_else(|| AppError::Video(format!("{} is not a recognised video file", name)))?;
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(AppError::Video(format!(
                "{} is {}, the limit is {}",
                name,
                format_file_size(bytes.len() as u64),
                format_file_size(self.max_file_bytes)
            )));
        }
        Ok(VideoUpload::new(name, mime_type, bytes.to_vec()))
    }

    fn accept(&mut self, loaded: Result<VideoUpload, AppError>) {
        match loaded {
            Ok(video) => {
                debug!("Selected {} ({})", video.filename, format_file_size(video.size()));
                self.notice = None;
                self.selected = Some(video);
            }
            Err(e) => {
                warn!("Rejected video: {}", e);
                self.notice = Some(e.to_string());
            }
        }
    }

    fn handle_drops(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(file) = dropped.first() {
            self.select_dropped(file);
        }
    }
}

impl View for UploadView {
    fn draw(&mut self, ui: &mut egui::Ui) {
        self.handle_drops(ui.ctx());

        ui.group(|ui| {
            ui.heading("Upload Gait Video");
            ui.label("Drop a walking video here or enter its path.");

            ui.add_enabled_ui(self.is_enabled(), |ui| {
                ui.horizontal(|ui| {
                    let field = ui.text_edit_singleline(&mut self.path_input);
                    let submitted =
                        field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if ui.button("Select").clicked() || submitted {
                        let path = PathBuf::from(self.path_input.trim());
                        self.select_path(&path);
                    }
                });
            });

            if let Some(notice) = &self.notice {
                ui.colored_label(ui.visuals().error_fg_color, notice);
            }

            let mut cleared = false;
            if let Some(video) = &self.selected {
                ui.horizontal(|ui| {
                    ui.strong(&video.filename);
                    ui.label(format_file_size(video.size()));
                    cleared = ui
                        .add_enabled(self.state.upload_enabled(), egui::Button::new("Clear"))
                        .clicked();
                });
            }
            if cleared {
                self.clear();
            }

            ui.separator();
            if ui
                .add_enabled(self.can_submit(), egui::Button::new("Analyze Gait"))
                .clicked()
            {
                self.request();
            }
        });
    }
}

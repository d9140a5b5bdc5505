pub mod result_view;
pub mod upload_view;

/// A panel of the desktop app.
pub trait View {
    fn draw(&mut self, ui: &mut egui::Ui);
}

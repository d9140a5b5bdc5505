pub mod views;
pub mod vorma_app;

pub use views::result_view::ResultView;
pub use views::upload_view::UploadView;
pub use vorma_app::VormaApp;

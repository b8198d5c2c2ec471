pub mod image;
pub mod session;

pub use image::ImageUpload;
pub use session::{AnalysisResult, NewSession, SessionMeta};

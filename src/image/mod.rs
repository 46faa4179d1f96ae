//! Image types and the edit adapter.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageEditor;
pub use types::{EditRequest, EditedImage, ImageFormat, UploadedImage};

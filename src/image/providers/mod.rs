//! Image editing backends.

mod gemini;

pub use gemini::{GeminiEditor, GeminiEditorBuilder, GeminiModel};

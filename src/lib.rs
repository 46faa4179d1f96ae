#![warn(missing_docs)]
//! gemedit - edit images with natural-language instructions via Gemini.
//!
//! Upload an image, describe the change, and get the edited image back as a
//! displayable `data:` URI.
//!
//! # Quick Start
//!
//! ```no_run
//! use gemedit::{Credential, EditRequest, GeminiEditor, ImageEditor, UploadedImage};
//!
//! #[tokio::main]
//! async fn main() -> gemedit::Result<()> {
//!     let editor = GeminiEditor::builder().build()?;
//!     let key = Credential::new(std::env::var("GEMINI_API_KEY").unwrap_or_default())?;
//!     let upload = UploadedImage::from_path("photo.png")?;
//!     let request = EditRequest::for_upload(&upload, "Make the sky a vibrant sunset orange");
//!     let edited = editor.edit(&request, &key).await?;
//!     edited.save("edited.png")?;
//!     Ok(())
//! }
//! ```
//!
//! # Sessions
//!
//! [`EditSession`] combines a gallery of uploads, an [`ImageEditor`] and a
//! [`CredentialSource`], and turns outcomes into status messages. A rejected
//! key moves the session to [`CredentialState::Missing`] and invalidates the
//! source so the next submission provisions a new one.
//!
//! # Credential sources
//!
//! - [`HostNegotiated`]: a host key manager (e.g. [`HelperCommandHost`]).
//! - [`PersistedCredential`]: prompt once, keep in a local store.
//! - [`InjectedCredential`]: environment variables read at startup.

mod error;

pub mod credential;
pub mod gallery;
pub mod image;
pub mod prompts;
pub mod session;

// Re-export error types at crate root
pub use error::{EditError, ErrorKind, Result};

pub use credential::{
    classify_failure, is_credential_rejection, Credential, CredentialSource, HelperCommandHost,
    HostNegotiated, InjectedCredential, KeyManagerHost, KeyPrompt, LocalStore,
    PersistedCredential,
};
pub use gallery::{DisplayHandle, DisplayHandles, Gallery, GalleryEntry};
pub use image::providers::{GeminiEditor, GeminiEditorBuilder, GeminiModel};
pub use image::{EditRequest, EditedImage, ImageEditor, ImageFormat, UploadedImage};
pub use session::{CredentialState, EditSession, Status};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::credential::{Credential, CredentialSource};
    pub use crate::error::{EditError, ErrorKind, Result};
    pub use crate::image::providers::GeminiEditor;
    pub use crate::image::{EditRequest, EditedImage, ImageEditor, UploadedImage};
    pub use crate::session::EditSession;
}

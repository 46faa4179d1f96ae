//! Image editor trait.

use crate::credential::Credential;
use crate::error::Result;
use crate::image::types::{EditRequest, EditedImage};
use async_trait::async_trait;

/// Something that can apply a natural-language edit to an image.
///
/// Implementations issue exactly one upstream call per [`ImageEditor::edit`]
/// and never retry. The credential is opaque: the editor does not know which
/// [`CredentialSource`](crate::credential::CredentialSource) produced it.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Applies `request.instruction` to `request.image`.
    async fn edit(&self, request: &EditRequest, credential: &Credential) -> Result<EditedImage>;

    /// Returns the model identifier used for edits.
    fn model(&self) -> &str;
}

//! The editing session: gallery state plus one editor and one credential
//! source, with outcomes mapped to user-facing status.

use crate::credential::{classify_failure, CredentialSource};
use crate::error::{EditError, ErrorKind, Result};
use crate::gallery::Gallery;
use crate::image::{EditRequest, EditedImage, ImageEditor, UploadedImage};

/// Message shown after the upstream rejected the key.
pub const INVALID_KEY_MESSAGE: &str = "Your API key is invalid. Please select a new one.";

/// Whether the session currently has a usable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Not checked yet.
    Unknown,
    /// No key, or the last one was rejected.
    Missing,
    /// A key was obtained.
    Ready,
}

/// Whether a submission is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for input.
    Idle,
    /// An edit request is outstanding.
    Loading,
}

/// One user's editing session.
///
/// `submit` takes `&mut self`, so a session can never have two edits in
/// flight at once.
pub struct EditSession<E, C> {
    editor: E,
    credentials: C,
    gallery: Gallery,
    credential_state: CredentialState,
    status: Status,
    error: Option<String>,
}

impl<E: ImageEditor, C: CredentialSource> EditSession<E, C> {
    /// Creates a session with an empty gallery.
    pub fn new(editor: E, credentials: C) -> Result<Self> {
        Ok(Self {
            editor,
            credentials,
            gallery: Gallery::new()?,
            credential_state: CredentialState::Unknown,
            status: Status::Idle,
            error: None,
        })
    }

    /// Obtains a key up front so the user can be prompted before editing.
    pub async fn connect(&mut self) -> CredentialState {
        match self.credentials.credential().await {
            Ok(_) => {
                self.credential_state = CredentialState::Ready;
                self.error = None;
            }
            Err(e) => {
                tracing::debug!("no API key available: {e}");
                self.credential_state = CredentialState::Missing;
                self.error = Some(e.user_message());
            }
        }
        self.credential_state
    }

    /// Adds uploads to the gallery and selects the first one.
    pub fn upload(&mut self, batch: Vec<UploadedImage>) -> Result<usize> {
        let added = self.gallery.upload(batch)?;
        if added > 0 {
            self.error = None;
        }
        Ok(added)
    }

    /// Replaces the whole gallery with a new batch.
    pub fn replace(&mut self, batch: Vec<UploadedImage>) -> Result<usize> {
        self.error = None;
        self.gallery.replace(batch)
    }

    /// Selects an image by index.
    pub fn select(&mut self, index: usize) -> Result<()> {
        self.gallery.select(index)?;
        self.error = None;
        Ok(())
    }

    /// Sets the free-text instruction.
    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.gallery.set_instruction(instruction);
    }

    /// Uses a preset instruction; ignored while nothing is selected.
    pub fn apply_preset(&mut self, preset: &str) -> bool {
        self.gallery.apply_preset(preset)
    }

    /// Edits the selected image with the current instruction.
    ///
    /// On success the result becomes the gallery's current result. On failure
    /// the error message is recorded; a rejected key additionally invalidates
    /// the credential source and moves to [`CredentialState::Missing`].
    pub async fn submit(&mut self) -> Result<&EditedImage> {
        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => return Err(self.record(e)),
        };

        let credential = match self.credentials.credential().await {
            Ok(credential) => {
                self.credential_state = CredentialState::Ready;
                credential
            }
            Err(e) => {
                self.credential_state = CredentialState::Missing;
                return Err(self.record(e));
            }
        };

        self.error = None;
        self.gallery.clear_result();
        self.status = Status::Loading;
        let outcome = self.editor.edit(&request, &credential).await;
        self.status = Status::Idle;

        match outcome {
            Ok(image) => Ok(self.gallery.set_result(image)),
            Err(e) => {
                let e = classify_failure(e);
                if e.kind() == ErrorKind::InvalidCredential {
                    tracing::warn!(source = self.credentials.describe(), "API key rejected");
                    self.credentials.invalidate().await;
                    self.credential_state = CredentialState::Missing;
                    self.error = Some(INVALID_KEY_MESSAGE.to_string());
                    return Err(e);
                }
                Err(self.record(e))
            }
        }
    }

    fn build_request(&self) -> Result<EditRequest> {
        let entry = self
            .gallery
            .selected()
            .ok_or_else(|| EditError::InvalidRequest("Please select an image to edit.".into()))?;
        let request = EditRequest::for_upload(&entry.image, self.gallery.instruction());
        request.validate()?;
        Ok(request)
    }

    fn record(&mut self, err: EditError) -> EditError {
        tracing::debug!(kind = ?err.kind(), "edit failed: {err}");
        self.error = Some(err.user_message());
        err
    }

    /// The gallery.
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Mutable access to the gallery.
    pub fn gallery_mut(&mut self) -> &mut Gallery {
        &mut self.gallery
    }

    /// The editor in use.
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// The credential source in use.
    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Current credential state.
    pub fn credential_state(&self) -> CredentialState {
        self.credential_state
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The last error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Tears the session down, releasing all preview handles.
    pub fn close(self) -> Result<usize> {
        self.gallery.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, InjectedCredential};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const PNG: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[derive(Default)]
    struct ScriptedEditor {
        outcomes: Mutex<VecDeque<Result<EditedImage>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEditor {
        fn with(outcomes: Vec<Result<EditedImage>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageEditor for ScriptedEditor {
        async fn edit(&self, request: &EditRequest, credential: &Credential) -> Result<EditedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(credential.expose(), "key");
            assert!(!request.instruction.trim().is_empty());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(EditError::EmptyResponse))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct TrackingSource {
        invalidated: AtomicBool,
    }

    #[async_trait]
    impl CredentialSource for TrackingSource {
        async fn credential(&self) -> Result<Credential> {
            Credential::new("key")
        }

        async fn invalidate(&self) {
            self.invalidated.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> &'static str {
            "tracking"
        }
    }

    fn edited(mime: &str) -> EditedImage {
        EditedImage {
            data: vec![7, 7, 7],
            mime_type: mime.into(),
            model: "scripted".into(),
            duration: Duration::ZERO,
        }
    }

    fn upload(name: &str) -> UploadedImage {
        UploadedImage::from_bytes(PNG.to_vec(), name).unwrap()
    }

    fn session(outcomes: Vec<Result<EditedImage>>) -> EditSession<ScriptedEditor, TrackingSource> {
        EditSession::new(ScriptedEditor::with(outcomes), TrackingSource::default()).unwrap()
    }

    #[tokio::test]
    async fn test_no_selection_is_invalid_without_call() {
        let mut s = session(vec![]);
        s.set_instruction("Add a hat");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(s.error(), Some("Please select an image to edit."));
        assert_eq!(s.editor().calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_instruction_is_invalid_without_call() {
        let mut s = session(vec![]);
        s.upload(vec![upload("a.png")]).unwrap();
        s.set_instruction("   \n");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            s.error(),
            Some("Please enter a prompt to describe your edit.")
        );
        assert_eq!(s.editor().calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_submit_sets_result() {
        let mut s = session(vec![Ok(edited("image/webp"))]);
        s.upload(vec![upload("a.png")]).unwrap();
        assert!(s.apply_preset("Make it snow"));

        let image = s.submit().await.unwrap();
        assert!(image.data_uri().starts_with("data:image/webp;base64,"));
        assert_eq!(s.status(), Status::Idle);
        assert_eq!(s.credential_state(), CredentialState::Ready);
        assert!(s.gallery().result().is_some());
        assert_eq!(s.editor().calls(), 1);
    }

    #[tokio::test]
    async fn test_new_submission_replaces_result() {
        let mut s = session(vec![Ok(edited("image/png")), Err(EditError::EmptyResponse)]);
        s.upload(vec![upload("a.png")]).unwrap();
        s.set_instruction("first");
        s.submit().await.unwrap();

        s.set_instruction("second");
        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);
        assert!(s.gallery().result().is_none());
    }

    #[tokio::test]
    async fn test_new_selection_clears_result() {
        let mut s = session(vec![Ok(edited("image/png"))]);
        s.upload(vec![upload("a.png"), upload("b.png")]).unwrap();
        s.set_instruction("Add a hat");
        s.submit().await.unwrap();

        s.select(1).unwrap();
        assert!(s.gallery().result().is_none());

        s.upload(vec![upload("c.png")]).unwrap();
        assert!(s.gallery().result().is_none());
    }

    #[tokio::test]
    async fn test_credential_rejection_prompts_for_new_key() {
        let rejection = EditError::Api {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".into(),
            code: Some("INVALID_ARGUMENT".into()),
            reason: Some("API_KEY_INVALID".into()),
        };
        let mut s = session(vec![Err(rejection)]);
        s.upload(vec![upload("a.png"), upload("b.png")]).unwrap();
        s.select(1).unwrap();
        s.set_instruction("Add a hat");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);
        assert_eq!(s.credential_state(), CredentialState::Missing);
        assert_eq!(s.error(), Some(INVALID_KEY_MESSAGE));
        assert!(s.credentials().invalidated.load(Ordering::SeqCst));

        // Gallery, selection and instruction survive.
        assert_eq!(s.gallery().entries().len(), 2);
        assert_eq!(s.gallery().selected_index(), Some(1));
        assert_eq!(s.gallery().instruction(), "Add a hat");
    }

    #[tokio::test]
    async fn test_legacy_not_found_message_is_rejection() {
        let mut s = session(vec![Err(EditError::Api {
            status: 404,
            message: "Requested entity was not found.".into(),
            code: None,
            reason: None,
        })]);
        s.upload(vec![upload("a.png")]).unwrap();
        s.set_instruction("Add a hat");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);
        assert_eq!(s.credential_state(), CredentialState::Missing);
    }

    #[tokio::test]
    async fn test_other_failures_leave_credential_alone() {
        let mut s = session(vec![Err(EditError::GenerationBlocked("SAFETY".into()))]);
        s.upload(vec![upload("a.png")]).unwrap();
        s.set_instruction("Add a hat");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationBlocked);
        assert_eq!(s.credential_state(), CredentialState::Ready);
        assert_eq!(
            s.error(),
            Some("Image generation was blocked due to: SAFETY.")
        );
        assert!(!s.credentials().invalidated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_injected_key_fails_before_call() {
        let mut s = EditSession::new(
            ScriptedEditor::default(),
            InjectedCredential::from_value(None),
        )
        .unwrap();
        s.upload(vec![upload("a.png")]).unwrap();
        s.set_instruction("Add a hat");

        let err = s.submit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(s.credential_state(), CredentialState::Missing);
        assert_eq!(s.editor().calls(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_handles() {
        let mut s = session(vec![]);
        s.upload(vec![upload("a.png"), upload("b.png")]).unwrap();
        s.replace(vec![upload("c.png")]).unwrap();
        assert_eq!(s.gallery().handles().released(), 2);
        assert_eq!(s.close().unwrap(), 1);
    }
}

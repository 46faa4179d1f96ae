//! Gemini (Google) image editing backend.

use crate::credential::Credential;
use crate::error::{sanitize_error_message, EditError, Result};
use crate::image::provider::ImageEditor;
use crate::image::types::{EditRequest, EditedImage};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Finish reason reported for a normal, complete generation.
const FINISH_STOP: &str = "STOP";

/// Gemini image model variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
    /// Any other model id accepted by `generateContent`.
    Custom(String),
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "gemini-3-pro-image-preview",
            Self::Custom(id) => id,
        }
    }

    /// Parses a model id, mapping known ids to their variants.
    pub fn parse(id: &str) -> Self {
        match id.trim() {
            "gemini-2.5-flash-image" | "nano-banana" => Self::NanoBanana,
            "gemini-3-pro-image-preview" | "nano-banana-pro" => Self::NanoBananaPro,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Builder for [`GeminiEditor`].
#[derive(Debug, Clone, Default)]
pub struct GeminiEditorBuilder {
    model: Option<GeminiModel>,
    base_url: Option<String>,
    client: Option<reqwest::Client>,
}

impl GeminiEditorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Gemini model. Falls back to `GEMEDIT_MODEL`, then Nano Banana.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Overrides the API root (scheme and host, no trailing path).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Uses a preconfigured HTTP client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the editor.
    pub fn build(self) -> Result<GeminiEditor> {
        let model = self
            .model
            .or_else(|| {
                std::env::var("GEMEDIT_MODEL")
                    .ok()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| GeminiModel::parse(&m))
            })
            .unwrap_or_default();

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(EditError::Config(format!(
                "base URL must start with http:// or https://, got {base_url}"
            )));
        }

        Ok(GeminiEditor {
            client: self.client.unwrap_or_default(),
            base_url,
            model,
        })
    }
}

/// Edits images through the Gemini `generateContent` endpoint.
pub struct GeminiEditor {
    client: reqwest::Client,
    base_url: String,
    model: GeminiModel,
}

impl GeminiEditor {
    /// Creates a new `GeminiEditorBuilder`.
    pub fn builder() -> GeminiEditorBuilder {
        GeminiEditorBuilder::new()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model.as_str()
        )
    }

    async fn edit_impl(&self, request: &EditRequest, credential: &Credential) -> Result<EditedImage> {
        request.validate()?;

        let start = Instant::now();
        let body = GeminiRequest::from_edit_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            mime_type = %request.mime_type,
            image_bytes = request.image.len(),
            "sending Gemini edit request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = parse_error(status.as_u16(), &text);
            tracing::debug!(status = status.as_u16(), "Gemini edit request failed: {err}");
            return Err(err);
        }

        let text = response.text().await?;
        let gemini_response: GeminiResponse = serde_json::from_str(&text)?;

        extract_image(gemini_response, self.model.as_str(), start.elapsed())
    }
}

#[async_trait]
impl ImageEditor for GeminiEditor {
    async fn edit(&self, request: &EditRequest, credential: &Credential) -> Result<EditedImage> {
        self.edit_impl(request, credential).await
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }
}

/// Picks the first inline image of the first candidate, or classifies why
/// there is none.
fn extract_image(response: GeminiResponse, model: &str, duration: Duration) -> Result<EditedImage> {
    let candidate = response.candidates.into_iter().next();

    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());

    let inline_data = candidate
        .and_then(|c| c.content)
        .and_then(|content| content.parts.into_iter().find_map(|p| p.inline_data));

    if let Some(inline_data) = inline_data {
        let data = base64::engine::general_purpose::STANDARD
            .decode(inline_data.data.trim())
            .map_err(|e| EditError::Decode(e.to_string()))?;

        tracing::debug!(
            mime_type = %inline_data.mime_type,
            size = data.len(),
            duration_ms = duration.as_millis() as u64,
            "Gemini edit complete"
        );

        return Ok(EditedImage {
            data,
            mime_type: inline_data.mime_type,
            model: model.to_string(),
            duration,
        });
    }

    if let Some(reason) = finish_reason.filter(|r| r != FINISH_STOP) {
        return Err(EditError::GenerationBlocked(reason));
    }

    // Prompt-level blocks come back as HTTP 200 with no candidates.
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(EditError::GenerationBlocked(reason));
    }

    Err(EditError::EmptyResponse)
}

/// Turns a non-2xx response into an [`EditError::Api`], keeping the structured
/// fields of Google's error envelope when the body has one.
fn parse_error(status: u16, text: &str) -> EditError {
    match serde_json::from_str::<GeminiErrorEnvelope>(text) {
        Ok(envelope) => {
            let reason = envelope
                .error
                .details
                .into_iter()
                .find_map(|d| d.reason);
            EditError::Api {
                status,
                message: sanitize_error_message(&envelope.error.message),
                code: envelope.error.status,
                reason,
            }
        }
        Err(_) => EditError::Api {
            status,
            message: sanitize_error_message(text),
            code: None,
            reason: None,
        },
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn from_edit_request(req: &EditRequest) -> Self {
        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: req.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&req.image),
                },
            },
            GeminiRequestPart::Text {
                text: req.instruction.clone(),
            },
        ];

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

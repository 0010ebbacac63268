//! Compositor capability - merges a logo onto a product image
//!
//! The service is a black box: one request in, one encoded image out.
//! No retries, no streaming.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompositorSettings;

const INSTRUCTION_CENTERED: &str = "Add the client logo to the center of the product, \
making it prominent but not overwhelming. Ensure the logo is clearly visible and \
properly scaled. Apply the logo exactly once.";

const INSTRUCTION_MASKED: &str = "Add the client logo inside the masked region of the \
product, centered within that region, making it prominent but not overwhelming. Ensure \
the logo is clearly visible and properly scaled. Apply the logo exactly once.";

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("Compositor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Compositor API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Compositor returned no image payload")]
    EmptyPayload,

    #[error("Compositor payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Low,
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(format!("unknown quality tier: {other}")),
        }
    }
}

/// An image handed to the compositor, with the file name it is sent under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImagePart {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());
        Ok(Self { file_name, bytes })
    }

    fn mime(&self) -> &'static str {
        mime_for(Path::new(&self.file_name))
    }
}

/// Content type by file extension; PNG when unknown.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// Placement directive sent with every request.
pub fn instruction_for(has_mask: bool) -> &'static str {
    if has_mask {
        INSTRUCTION_MASKED
    } else {
        INSTRUCTION_CENTERED
    }
}

/// One (client, product) composition. Never persisted.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub base: ImagePart,
    pub overlay: ImagePart,
    pub mask: Option<ImagePart>,
    pub instruction: String,
    pub quality: QualityTier,
}

impl CompositionRequest {
    pub fn new(
        base: ImagePart,
        overlay: ImagePart,
        mask: Option<ImagePart>,
        quality: QualityTier,
    ) -> Self {
        let instruction = instruction_for(mask.is_some()).to_string();
        Self {
            base,
            overlay,
            mask,
            instruction,
            quality,
        }
    }
}

#[async_trait]
pub trait Compositor: Send + Sync {
    /// Compose one image and return the decoded raster bytes.
    async fn compose(&self, request: &CompositionRequest) -> Result<Vec<u8>, CompositionError>;
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    #[serde(default)]
    data: Vec<EditImage>,
}

#[derive(Debug, Deserialize)]
struct EditImage {
    b64_json: Option<String>,
}

/// Image-edit client for an OpenAI-compatible `/images/edits` endpoint.
pub struct OpenAiCompositor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompositor {
    pub fn new(settings: &CompositorSettings) -> Result<Self, CompositionError> {
        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: &CompositorSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        }
    }

    fn form(&self, request: &CompositionRequest) -> Result<reqwest::multipart::Form, CompositionError> {
        use reqwest::multipart::{Form, Part};

        let part = |image: &ImagePart| -> Result<Part, CompositionError> {
            Ok(Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(image.mime())?)
        };

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", request.instruction.clone())
            .text("n", "1")
            .text("size", "auto")
            .text("quality", request.quality.as_str())
            .part("image[]", part(&request.base)?)
            .part("image[]", part(&request.overlay)?);

        if let Some(mask) = &request.mask {
            form = form.part("mask", part(mask)?);
        }

        Ok(form)
    }
}

#[async_trait]
impl Compositor for OpenAiCompositor {
    async fn compose(&self, request: &CompositionRequest) -> Result<Vec<u8>, CompositionError> {
        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(self.form(request)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CompositionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: EditResponse = response.json().await?;
        decode_payload(body)
    }
}

fn decode_payload(body: EditResponse) -> Result<Vec<u8>, CompositionError> {
    let encoded = body
        .data
        .into_iter()
        .next()
        .and_then(|image| image.b64_json)
        .filter(|b64| !b64.is_empty())
        .ok_or(CompositionError::EmptyPayload)?;

    Ok(base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        encoded.trim(),
    )?)
}

//! External AI capabilities used by the caption pipeline.
//!
//! The pipeline only depends on two traits: [`ImageAnalyzer`] turns image bytes into structured
//! findings, and [`ChatCompleter`] turns a two-message prompt into ranked completions. The
//! concrete HTTP clients live in [`vision`] (Azure AI Vision) and [`chat`] (Azure OpenAI or any
//! OpenAI-compatible endpoint). Both are built once at startup and shared by every request.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::{ChatConfig, VisionConfig};

pub mod chat;
pub mod vision;

/// Build the image analyzer from configuration.
pub fn create_analyzer(config: &VisionConfig) -> anyhow::Result<Arc<dyn ImageAnalyzer>> {
    Ok(Arc::new(vision::AzureVisionClient::from_config(config)?))
}

/// Build the chat completer from configuration.
pub fn create_completer(config: &ChatConfig) -> anyhow::Result<Arc<dyn ChatCompleter>> {
    Ok(Arc::new(chat::ChatCompletionsClient::from_config(config)?))
}

/// One piece of evidence the vision service reported for an image.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisFinding {
    /// Description of one region of the image
    RegionCaption { text: String, confidence: f64 },
    /// Single word or short phrase label
    Tag { name: String, confidence: f64 },
    /// One line of text read from the image
    TextLine { text: String },
}

/// Everything the vision service found in one image, in the order the service reported it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAnalysis {
    pub findings: Vec<AnalysisFinding>,
}

/// Features that can be requested from the vision service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualFeature {
    DenseCaptions,
    Tags,
    Read,
}

impl VisualFeature {
    /// Name of the feature on the Image Analysis REST API
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualFeature::DenseCaptions => "denseCaptions",
            VisualFeature::Tags => "tags",
            VisualFeature::Read => "read",
        }
    }
}

/// What to ask the vision service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub features: Vec<VisualFeature>,
    pub gender_neutral_caption: bool,
}

impl AnalysisRequest {
    /// Dense captions, tags and OCR, with gender-neutral wording.
    pub fn for_captioning() -> Self {
        Self {
            features: vec![VisualFeature::DenseCaptions, VisualFeature::Tags, VisualFeature::Read],
            gender_neutral_caption: true,
        }
    }
}

/// Errors from the vision service.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Vision request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vision service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode vision response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Analyze an image and report what it contains.
///
/// The image arrives as the shared upload buffer so implementations can send it without copying.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &Bytes, request: &AnalysisRequest) -> Result<ImageAnalysis, VisionError>;
}

/// A two-message chat prompt plus its sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Errors from the chat completion service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Chat completion service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode chat completion response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Complete a chat prompt.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Returns the text of every returned choice, best ranked first. May be empty.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<Vec<String>, ChatError>;
}

//! Caption synthesis: one image in, one sentence out.
//!
//! [`CaptionSynthesizer`] asks the vision service what is in an image, condenses the findings with
//! [`summary::summarize`], and asks the chat model for a single descriptive sentence. Every failure
//! is returned as a [`CaptionError`] so the caller can decide what a missing caption means;
//! nothing here aborts a batch.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::ChatConfig;
use crate::providers::{AnalysisRequest, ChatCompleter, ChatError, ChatPrompt, ImageAnalysis, ImageAnalyzer, VisionError};
use crate::types::UploadedImage;

pub mod filename;
pub mod summary;

/// Hard cap on a caption's length, in characters.
pub const MAX_CAPTION_CHARS: usize = 255;

const SYSTEM_INSTRUCTION: &str = "You are an AI assistant specialized in generating accurate, concise, and descriptive captions for images based on provided visual descriptions, tags, and detected text. Your goal is to create a single sentence that best represents the main content of the image.";

const USER_INSTRUCTION: &str = "Based on the following information, generate a concise and descriptive caption for the image in one sentence. Focus on the main content, include any brands or text detected, and avoid adding any information not present in the data. Keep it under 200 characters.";

/// Longest prefix of `s` holding at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Generated caption text: trimmed, non-empty, at most [`MAX_CAPTION_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption(String);

impl Caption {
    /// Returns `None` when nothing is left after trimming.
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(truncate_chars(trimmed, MAX_CAPTION_CHARS).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why one image ended up without a caption.
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("Image analysis failed: {0}")]
    Analysis(#[from] VisionError),

    #[error("Caption generation failed: {0}")]
    Completion(#[from] ChatError),

    #[error("Chat completion returned no choices")]
    NoChoices,

    #[error("Chat completion returned an empty caption")]
    EmptyCaption,

    /// The per-image task panicked or was lost before reporting
    #[error("Caption task failed: {0}")]
    Task(String),
}

/// Sampling settings for the caption request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.5,
        }
    }
}

impl From<&ChatConfig> for GenerationSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

pub struct CaptionSynthesizer {
    analyzer: Arc<dyn ImageAnalyzer>,
    completer: Arc<dyn ChatCompleter>,
    settings: GenerationSettings,
}

impl CaptionSynthesizer {
    pub fn new(analyzer: Arc<dyn ImageAnalyzer>, completer: Arc<dyn ChatCompleter>, settings: GenerationSettings) -> Self {
        Self {
            analyzer,
            completer,
            settings,
        }
    }

    /// The system + user prompt for an analysis.
    pub fn prompt_for(&self, analysis: &ImageAnalysis) -> ChatPrompt {
        ChatPrompt {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: format!("{USER_INSTRUCTION}\n\n{}", summary::summarize(analysis)),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Caption one image. Uses the first returned choice only.
    #[instrument(skip(self, image), fields(file_name = %image.name, size = image.bytes.len()))]
    pub async fn synthesize(&self, image: &UploadedImage) -> Result<Caption, CaptionError> {
        let analysis = self.analyzer.analyze(&image.bytes, &AnalysisRequest::for_captioning()).await?;
        debug!(findings = analysis.findings.len(), "Image analyzed");

        let prompt = self.prompt_for(&analysis);
        let choices = self.completer.complete(&prompt).await?;
        let first = choices.into_iter().next().ok_or(CaptionError::NoChoices)?;
        let caption = Caption::new(&first).ok_or(CaptionError::EmptyCaption)?;

        debug!(caption = %caption, "Caption generated");
        Ok(caption)
    }
}

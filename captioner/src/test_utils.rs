//! Test doubles for the provider traits and fixture images.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{ChatConfig, Config, VisionConfig};
use crate::providers::{AnalysisFinding, AnalysisRequest, ChatCompleter, ChatError, ChatPrompt, ImageAnalysis, ImageAnalyzer, VisionError};

enum Scripted {
    Analysis(ImageAnalysis),
    Fail(u16),
    Panic,
}

/// Vision fake keyed by image bytes. Unknown images fail with HTTP 404.
#[derive(Default)]
pub struct FakeAnalyzer {
    scripts: HashMap<Vec<u8>, Scripted>,
    delays: HashMap<Vec<u8>, Duration>,
    requests: Mutex<Vec<AnalysisRequest>>,
    images: Mutex<Vec<Bytes>>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a single high-confidence region caption for `image`.
    pub fn with_caption(self, image: &[u8], caption: &str) -> Self {
        self.with_analysis(
            image,
            ImageAnalysis {
                findings: vec![AnalysisFinding::RegionCaption {
                    text: caption.to_string(),
                    confidence: 0.9,
                }],
            },
        )
    }

    pub fn with_analysis(mut self, image: &[u8], analysis: ImageAnalysis) -> Self {
        self.scripts.insert(image.to_vec(), Scripted::Analysis(analysis));
        self
    }

    pub fn failing_for(mut self, image: &[u8], status: u16) -> Self {
        self.scripts.insert(image.to_vec(), Scripted::Fail(status));
        self
    }

    pub fn panicking_for(mut self, image: &[u8]) -> Self {
        self.scripts.insert(image.to_vec(), Scripted::Panic);
        self
    }

    pub fn delayed(mut self, image: &[u8], delay: Duration) -> Self {
        self.delays.insert(image.to_vec(), delay);
        self
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Every image buffer handed to `analyze`, in call order.
    pub fn received_images(&self) -> Vec<Bytes> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageAnalyzer for FakeAnalyzer {
    async fn analyze(&self, image: &Bytes, request: &AnalysisRequest) -> Result<ImageAnalysis, VisionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.images.lock().unwrap().push(image.clone());
        let image: &[u8] = image.as_ref();

        if let Some(delay) = self.delays.get(image) {
            tokio::time::sleep(*delay).await;
        }

        match self.scripts.get(image) {
            Some(Scripted::Analysis(analysis)) => Ok(analysis.clone()),
            Some(Scripted::Fail(status)) => Err(VisionError::Api {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            Some(Scripted::Panic) => panic!("scripted analyzer panic"),
            None => Err(VisionError::Api {
                status: 404,
                body: "no scripted analysis for image".to_string(),
            }),
        }
    }
}

pub enum CompleterBehavior {
    /// Answer with the first numbered region caption found in the prompt, or no choices
    EchoFirstCaption,
    Choices(Vec<String>),
    Fail(u16),
}

/// Chat fake that records every prompt it receives.
pub struct FakeCompleter {
    behavior: CompleterBehavior,
    prompts: Mutex<Vec<ChatPrompt>>,
}

impl FakeCompleter {
    pub fn new(behavior: CompleterBehavior) -> Self {
        Self {
            behavior,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<ChatPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompleter for FakeCompleter {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<Vec<String>, ChatError> {
        self.prompts.lock().unwrap().push(prompt.clone());

        match &self.behavior {
            CompleterBehavior::EchoFirstCaption => Ok(prompt
                .user
                .lines()
                .find_map(|line| line.strip_prefix("1. "))
                .map(|caption| vec![caption.to_string()])
                .unwrap_or_default()),
            CompleterBehavior::Choices(choices) => Ok(choices.clone()),
            CompleterBehavior::Fail(status) => Err(ChatError::Api {
                status: *status,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

fn encode_solid(color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb(color)));
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// A small solid-color JPEG. Different colors give different bytes.
pub fn jpeg_bytes(color: [u8; 3]) -> Vec<u8> {
    encode_solid(color, ImageFormat::Jpeg)
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    encode_solid(color, ImageFormat::Png)
}

/// Valid configuration pointing at placeholder endpoints.
pub fn create_test_config() -> Config {
    Config {
        vision: VisionConfig {
            endpoint: Some("http://vision.invalid".parse().unwrap()),
            api_key: Some("vision-key".to_string()),
            ..Default::default()
        },
        chat: ChatConfig {
            endpoint: Some("http://chat.invalid".parse().unwrap()),
            api_key: Some("chat-key".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

//! Azure AI Vision client (Image Analysis 4.0 REST API).
//!
//! The image is posted as raw bytes to `{endpoint}/computervision/imageanalysis:analyze` and the
//! dense caption, tag and read results are flattened into [`AnalysisFinding`]s.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header::CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{AnalysisFinding, AnalysisRequest, ImageAnalysis, ImageAnalyzer, VisionError};
use crate::config::VisionConfig;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct AzureVisionClient {
    client: Client,
    analyze_url: Url,
    api_key: String,
    api_version: String,
}

impl AzureVisionClient {
    pub fn new(endpoint: &Url, api_key: impl Into<String>, api_version: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let analyze_url = Url::parse(&format!(
            "{}/computervision/imageanalysis:analyze",
            endpoint.as_str().trim_end_matches('/')
        ))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            analyze_url,
            api_key: api_key.into(),
            api_version: api_version.into(),
        })
    }

    pub fn from_config(config: &VisionConfig) -> anyhow::Result<Self> {
        let (Some(endpoint), Some(api_key)) = (config.endpoint.as_ref(), config.api_key.as_deref()) else {
            anyhow::bail!("Missing vision endpoint or subscription key");
        };
        Self::new(endpoint, api_key, config.api_version.clone(), config.timeout)
    }

    fn request_url(&self, request: &AnalysisRequest) -> Url {
        let features = request.features.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(",");

        let mut url = self.analyze_url.clone();
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair("features", &features)
            .append_pair("gender-neutral-caption", if request.gender_neutral_caption { "true" } else { "false" });
        url
    }
}

#[async_trait]
impl ImageAnalyzer for AzureVisionClient {
    async fn analyze(&self, image: &Bytes, request: &AnalysisRequest) -> Result<ImageAnalysis, VisionError> {
        let url = self.request_url(request);
        debug!(url = %url, size = image.len(), "Sending image for analysis");

        let response = self
            .client
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnalyzeResponse = serde_json::from_str(&body).map_err(VisionError::Decode)?;
        Ok(parsed.into())
    }
}

// --- Wire types ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnalyzeResponse {
    dense_captions_result: Option<DenseCaptionsResult>,
    tags_result: Option<TagsResult>,
    read_result: Option<ReadResult>,
}

#[derive(Debug, Deserialize)]
struct DenseCaptionsResult {
    #[serde(default)]
    values: Vec<DenseCaption>,
}

#[derive(Debug, Deserialize)]
struct DenseCaption {
    text: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct TagsResult {
    #[serde(default)]
    values: Vec<DetectedTag>,
}

#[derive(Debug, Deserialize)]
struct DetectedTag {
    name: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ReadResult {
    #[serde(default)]
    blocks: Vec<TextBlock>,
}

#[derive(Debug, Deserialize)]
struct TextBlock {
    #[serde(default)]
    lines: Vec<TextLine>,
}

#[derive(Debug, Deserialize)]
struct TextLine {
    text: String,
}

impl From<AnalyzeResponse> for ImageAnalysis {
    fn from(response: AnalyzeResponse) -> Self {
        let captions = response
            .dense_captions_result
            .into_iter()
            .flat_map(|r| r.values)
            .map(|c| AnalysisFinding::RegionCaption {
                text: c.text,
                confidence: c.confidence,
            });
        let tags = response
            .tags_result
            .into_iter()
            .flat_map(|r| r.values)
            .map(|t| AnalysisFinding::Tag {
                name: t.name,
                confidence: t.confidence,
            });
        let lines = response
            .read_result
            .into_iter()
            .flat_map(|r| r.blocks)
            .flat_map(|b| b.lines)
            .map(|l| AnalysisFinding::TextLine { text: l.text });

        ImageAnalysis {
            findings: captions.chain(tags).chain(lines).collect(),
        }
    }
}

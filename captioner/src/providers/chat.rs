//! Chat completions client for Azure OpenAI deployments and OpenAI-compatible endpoints.
//!
//! Request and response bodies use the `async-openai` chat types so both dialects share one
//! serialization path; only the URL and the auth header differ.

use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    CreateChatCompletionResponse,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ChatCompleter, ChatError, ChatPrompt};
use crate::config::{ChatConfig, ChatProvider};

enum Auth {
    /// Azure `api-key` header
    ApiKey(String),
    Bearer(String),
}

pub struct ChatCompletionsClient {
    client: Client,
    url: Url,
    auth: Auth,
    model: String,
}

impl ChatCompletionsClient {
    /// Client for an Azure OpenAI deployment.
    pub fn azure(endpoint: &Url, api_key: &str, deployment: &str, api_version: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut url = Url::parse(&format!(
            "{}/openai/deployments/{}/chat/completions",
            endpoint.as_str().trim_end_matches('/'),
            deployment
        ))?;
        url.query_pairs_mut().append_pair("api-version", api_version);

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url,
            auth: Auth::ApiKey(api_key.to_string()),
            model: deployment.to_string(),
        })
    }

    /// Client for an OpenAI-compatible `/chat/completions` endpoint.
    pub fn openai(endpoint: &Url, api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url = Url::parse(&format!("{}/chat/completions", endpoint.as_str().trim_end_matches('/')))?;

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url,
            auth: Auth::Bearer(api_key.to_string()),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let (Some(endpoint), Some(api_key)) = (config.endpoint.as_ref(), config.api_key.as_deref()) else {
            anyhow::bail!("Missing chat endpoint or key");
        };
        match config.provider {
            ChatProvider::Azure => Self::azure(endpoint, api_key, &config.deployment, &config.api_version, config.timeout),
            ChatProvider::OpenAi => Self::openai(endpoint, api_key, &config.deployment, config.timeout),
        }
    }

    #[allow(deprecated)] // `max_tokens` is what Azure deployments of older models accept
    fn build_request(&self, prompt: &ChatPrompt) -> CreateChatCompletionRequest {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessage {
                content: prompt.system.clone().into(),
                name: None,
            }
            .into(),
            ChatCompletionRequestUserMessage {
                content: prompt.user.clone().into(),
                name: None,
            }
            .into(),
        ];

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(prompt.max_tokens),
            temperature: Some(prompt.temperature),
            ..Default::default()
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::ApiKey(key) => request.header("api-key", key),
            Auth::Bearer(key) => request.bearer_auth(key),
        }
    }
}

#[async_trait]
impl ChatCompleter for ChatCompletionsClient {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<Vec<String>, ChatError> {
        let body = self.build_request(prompt);
        debug!(url = %self.url, model = %self.model, "Requesting chat completion");

        let response = self.authorize(self.client.post(self.url.clone())).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let completion: CreateChatCompletionResponse = serde_json::from_str(&text).map_err(ChatError::Decode)?;
        Ok(completion
            .choices
            .into_iter()
            .map(|choice| choice.message.content.unwrap_or_default())
            .collect())
    }
}

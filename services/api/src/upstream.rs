//! Calls to the OpenAI platform made on behalf of browser and terminal clients.
//!
//! The long-lived API key never leaves this service: clients receive either
//! an ephemeral realtime credential or the result of an analysis.

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

pub const VISION_PROMPT: &str = "What's in this image?";
pub const VISION_MAX_TOKENS: u32 = 300;

/// Mints ephemeral credentials for realtime sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionMinter: Send + Sync {
    /// Returns the upstream session object, including `client_secret.value`.
    async fn mint(&self) -> Result<Value>;
}

/// Describes the contents of an image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// `image_base64` is a base64-encoded JPEG.
    async fn analyze(&self, image_base64: &str) -> Result<Value>;
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

/// `POST {base}/realtime/sessions` with the long-lived key.
pub struct OpenAiSessions {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
    model: String,
    voice: String,
}

impl OpenAiSessions {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: SecretString,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: format!("{}/realtime/sessions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl SessionMinter for OpenAiSessions {
    #[instrument(name = "mint_session", skip_all, fields(model = %self.model, voice = %self.voice))]
    async fn mint(&self) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&SessionRequest {
                model: &self.model,
                voice: &self.voice,
            })
            .send()
            .await
            .context("realtime sessions endpoint unreachable")?
            .error_for_status()
            .context("realtime sessions endpoint rejected the request")?;

        let session = response
            .json::<Value>()
            .await
            .context("realtime session response is not JSON")?;
        debug!("Ephemeral session minted");
        Ok(session)
    }
}

/// Single-turn vision chat completion.
pub struct OpenAiVision {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVision {
    pub fn new(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageAnalyzer for OpenAiVision {
    #[instrument(name = "analyze_image", skip_all, fields(model = %self.model, image_len = image_base64.len()))]
    async fn analyze(&self, image_base64: &str) -> Result<Value> {
        let image_url = ImageUrlArgs::default()
            .url(format!("data:image/jpeg;base64,{image_base64}"))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(VISION_MAX_TOKENS)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(VISION_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(image_url)
                        .build()?
                        .into(),
                ])
                .build()?
                .into()])
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("chat completion failed")?;
        debug!(choices = response.choices.len(), "Image analyzed");
        Ok(serde_json::to_value(response)?)
    }
}

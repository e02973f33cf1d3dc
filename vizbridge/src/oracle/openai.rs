//! OpenAI-compatible chat completions client for both oracle roles.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ranking_user_prompt, strip_code_fence, CommentaryOracle, RankingOracle, RankingResponse,
    RANKING_SYSTEM_PROMPT,
};
use crate::candidate::VisualizationCandidate;
use crate::config::{secret_from_env, BridgeConfig, LlmConfig};
use crate::error::{BridgeError, BridgeResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiOracle {
    config: LlmConfig,
    api_key: String,
    client: Client,
}

impl OpenAiOracle {
    pub fn new(config: LlmConfig, api_key: String) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BridgeError::Config(format!("building LLM client: {}", e)))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let api_key = secret_from_env(&config.llm.api_key_env)?;
        Self::new(config.llm.clone(), api_key)
    }

    fn completions_url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base)
    }

    /// Build a chat request body, filling in the configured sampling options.
    pub fn request_body(&self, messages: Value, json_mode: bool) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    async fn complete(&self, body: &Value) -> BridgeResult<String> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::Oracle(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Oracle(format!(
                "chat completion failed with {}: {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Oracle(e.to_string()))?;
        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Oracle("invalid chat completion response format".into()))
    }
}

/// Parse the ranking answer. Anything that is not a JSON object yields an
/// empty response; the selection engine rejects it.
pub fn parse_ranking(content: &str) -> RankingResponse {
    match serde_json::from_str::<RankingResponse>(strip_code_fence(content)) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Ranking answer is not valid JSON");
            RankingResponse::default()
        }
    }
}

#[async_trait]
impl RankingOracle for OpenAiOracle {
    async fn rank(
        &self,
        question: &str,
        candidates: &[VisualizationCandidate],
    ) -> BridgeResult<RankingResponse> {
        let user_prompt = ranking_user_prompt(question, candidates)?;
        let body = self.request_body(
            json!([
                { "role": "system", "content": RANKING_SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt }
            ]),
            true,
        );

        info!(
            model = %self.config.model,
            candidates = candidates.len(),
            "Ranking candidates"
        );
        let content = self.complete(&body).await?;
        debug!(answer = %content, "Ranking answer");
        Ok(parse_ranking(&content))
    }
}

#[async_trait]
impl CommentaryOracle for OpenAiOracle {
    async fn comment(&self, image: &[u8], prompt: &str) -> BridgeResult<String> {
        let encoded = general_purpose::STANDARD.encode(image);
        let body = self.request_body(
            json!([{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", encoded) }
                    }
                ]
            }]),
            false,
        );

        info!(model = %self.config.model, image_bytes = image.len(), "Requesting commentary");
        self.complete(&body).await
    }
}

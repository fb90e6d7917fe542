use crate::config::RagConfig;
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Message envelope returned by chat backends. The composer's parser unwraps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<ChatMessage, RagError>;
}

pub fn build_language_model(config: &RagConfig) -> Result<Arc<dyn LanguageModel>, RagError> {
    Ok(Arc::new(OllamaChatModel::new(
        &config.ollama_url,
        &config.chat_model,
        config.temperature,
        config.request_timeout,
    )?))
}

pub struct OllamaChatModel {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
}

impl OllamaChatModel {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("pdf-rag/chat")
            .build()
            .map_err(|error| {
                RagError::InvalidConfig(format!("failed to build chat http client: {error}"))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<ChatMessage, RagError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "options": {
                "temperature": self.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    RagError::Inference(format!(
                        "model call timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    RagError::Inference(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Inference(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Inference(format!("Ollama returned {status}: {body}")));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            RagError::Inference(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(RagError::Inference(
                "Ollama response incomplete (streaming not supported)".to_string(),
            ));
        }

        body.message
            .ok_or_else(|| RagError::Inference("Ollama response had no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn model(server: &MockServer) -> OllamaChatModel {
        OllamaChatModel::new(&server.base_url(), "llama3.2:1b", 0.7, Duration::from_secs(5))
            .expect("client")
    }

    #[tokio::test]
    async fn chat_model_sends_prompt_and_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").json_body(json!({
                    "model": "llama3.2:1b",
                    "messages": [{ "role": "user", "content": "Hello?" }],
                    "stream": false,
                    "options": { "temperature": 0.7f32 }
                }));
                then.status(200).json_body(json!({
                    "model": "llama3.2:1b",
                    "message": { "role": "assistant", "content": "Hi there." },
                    "done": true
                }));
            })
            .await;

        let reply = model(&server).complete("Hello?").await.expect("reply");

        mock.assert_async().await;
        assert_eq!(reply, ChatMessage::assistant("Hi there."));
    }

    #[tokio::test]
    async fn chat_model_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("out of memory");
            })
            .await;

        let error = model(&server).complete("Hello?").await.expect_err("should fail");
        assert!(matches!(error, RagError::Inference(_)));
        assert!(error.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn incomplete_response_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "partial" },
                    "done": false
                }));
            })
            .await;

        let result = model(&server).complete("Hello?").await;
        assert!(matches!(result, Err(RagError::Inference(_))));
    }
}

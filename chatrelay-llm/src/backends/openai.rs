// ABOUTME: OpenAI-compatible HTTP backend for chat completions and image generation.
// ABOUTME: Talks to any server exposing /chat/completions and /images/generations.

use crate::config::BackendConfig;
use crate::message::{Choice, Completion, ImageSize, Message};
use crate::traits::CompletionBackend;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u32,
    size: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Completion backend speaking the OpenAI REST dialect
pub struct OpenAiBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: config.base_url().to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|config| {
            let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(config)?);
            Ok(backend)
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);

        // No Authorization header when no key is configured
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("Completion API returned error {}: {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    async fn chat(&self, messages: &[Message], model: &str, temperature: f32) -> Result<Completion> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature,
        };
        let response: ChatCompletionResponse = self.post_json("/chat/completions", &request).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }

        Ok(into_completion(response))
    }

    async fn image(&self, prompt: &str, size: ImageSize) -> Result<String> {
        let request = ImageRequest {
            prompt,
            n: 1,
            size: size.as_str(),
        };
        let response: ImageResponse = self.post_json("/images/generations", &request).await?;
        response
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| anyhow::anyhow!("Image API returned no image URL"))
    }
}

fn into_completion(response: ChatCompletionResponse) -> Completion {
    Completion {
        choices: response
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .map(|content| Choice { content })
            .collect(),
    }
}

impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, Result<Completion>> {
        Box::pin(self.chat(messages, model, temperature))
    }

    fn generate_image<'a>(
        &'a self,
        prompt: &'a str,
        size: ImageSize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.image(prompt, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::system("be nice"), Message::user("hello")];
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_response_with_choices() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let completion = into_completion(response);
        assert_eq!(completion.first_text(), Some("Hi!"));
    }

    #[test]
    fn test_response_without_choices_is_empty_not_error() {
        let response: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(into_completion(response).choices.is_empty());

        let response: ChatCompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(into_completion(response).choices.is_empty());
    }

    #[test]
    fn test_null_content_is_dropped() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(into_completion(response).choices.is_empty());
    }

    #[test]
    fn test_new_uses_trimmed_base_url() {
        let config = BackendConfig {
            api_url: "http://localhost:1234/v1/".to_string(),
            ..Default::default()
        };
        let backend = OpenAiBackend::new(&config).unwrap();
        assert_eq!(backend.base_url, "http://localhost:1234/v1");
        assert_eq!(backend.name(), "openai");
    }
}

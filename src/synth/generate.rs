//! Generation model clients

use super::Prompt;
use crate::config::{GenerationBackend, GenerationConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Trait for text generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt`, optionally with a model other than the default
    async fn generate(&self, prompt: &Prompt, model: Option<&str>) -> Result<String>;

    /// Default model name
    fn model_name(&self) -> &str;
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.backend {
        GenerationBackend::Ollama => Ok(Arc::new(OllamaGenerator::new(config)?)),
        GenerationBackend::OpenAi => Ok(Arc::new(OpenAiGenerator::new(config)?)),
    }
}

/// Sampling and retry settings shared by HTTP generators
#[derive(Debug, Clone)]
struct RequestPolicy {
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    attempts: u32,
    retry_delay: Duration,
}

impl RequestPolicy {
    fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            attempts: config.attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

fn build_client(config: &GenerationConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create generation HTTP client: {}", e)))
}

/// Send a request, retrying timeouts, connection failures and 5xx responses
async fn send_with_retry<T: DeserializeOwned>(
    request: RequestBuilder,
    policy: &RequestPolicy,
) -> Result<T> {
    let mut last_err = String::from("no attempt made");

    for attempt in 1..=policy.attempts {
        let req = request
            .try_clone()
            .ok_or_else(|| Error::GenerationUnavailable("request cannot be retried".to_string()))?;

        let retryable = match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| {
                        Error::GenerationUnavailable(format!("malformed response: {}", e))
                    });
                }
                let body = response.text().await.unwrap_or_default();
                last_err = format!("HTTP {}: {}", status, body.trim());
                status.is_server_error()
            }
            Err(e) => {
                last_err = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                e.is_timeout() || e.is_connect()
            }
        };

        if !retryable {
            break;
        }
        if attempt < policy.attempts {
            warn!(
                "Generation attempt {}/{} failed: {}",
                attempt, policy.attempts, last_err
            );
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    Err(Error::GenerationUnavailable(last_err))
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` client
pub struct OllamaGenerator {
    client: Client,
    url: Url,
    model: String,
    policy: RequestPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base = Url::parse(&format!("{}/", config.endpoint.trim_end_matches('/')))?;
        Ok(Self {
            client: build_client(config)?,
            url: base.join("api/generate")?,
            model: config.model.clone(),
            policy: RequestPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &Prompt, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.model);
        debug!("Generating with Ollama model {}", model);

        let body = OllamaRequest {
            model,
            system: &prompt.system,
            prompt: &prompt.user,
            stream: false,
            options: OllamaOptions {
                temperature: self.policy.temperature,
                top_p: self.policy.top_p,
                num_predict: self.policy.max_tokens,
            },
        };

        let request = self.client.post(self.url.clone()).json(&body);
        let response: OllamaResponse = send_with_retry(request, &self.policy).await?;
        Ok(response.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for servers exposing `/v1/chat/completions`
pub struct OpenAiGenerator {
    client: Client,
    url: Url,
    model: String,
    api_key: Option<String>,
    policy: RequestPolicy,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let trimmed = config.endpoint.trim_end_matches('/');
        let full = if trimmed.ends_with("/chat/completions") {
            trimmed.to_string()
        } else if trimmed.ends_with("/v1") {
            format!("{}/chat/completions", trimmed)
        } else {
            format!("{}/v1/chat/completions", trimmed)
        };

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            debug!(
                "{} is not set; sending chat requests without authorization",
                config.api_key_env
            );
        }

        Ok(Self {
            client: build_client(config)?,
            url: Url::parse(&full)?,
            model: config.model.clone(),
            api_key,
            policy: RequestPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &Prompt, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.model);
        debug!("Generating with chat model {}", model);

        let body = ChatRequest {
            model,
            temperature: self.policy.temperature,
            top_p: self.policy.top_p,
            max_tokens: self.policy.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.trim());
        }

        let response: ChatResponse = send_with_retry(request, &self.policy).await?;
        Ok(response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> Prompt {
        Prompt {
            system: "system text".to_string(),
            user: "Question: capital of France?".to_string(),
        }
    }

    fn config_for(backend: GenerationBackend, endpoint: &str) -> GenerationConfig {
        GenerationConfig {
            backend,
            endpoint: endpoint.to_string(),
            api_key_env: "WEBRAG_TEST_UNSET_KEY".to_string(),
            attempts: 2,
            retry_delay_ms: 10,
            ..GenerationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.2:1b",
                "stream": false,
                "options": {"num_predict": 512}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.2:1b",
                "response": "Paris [1]",
                "done": true
            })))
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&config_for(GenerationBackend::Ollama, &server.uri())).unwrap();
        let text = generator.generate(&prompt(), None).await.unwrap();
        assert_eq!(text, "Paris [1]");
    }

    #[tokio::test]
    async fn test_model_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "qwen2.5:7b"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&config_for(GenerationBackend::Ollama, &server.uri())).unwrap();
        let text = generator.generate(&prompt(), Some("qwen2.5:7b")).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&config_for(GenerationBackend::Ollama, &server.uri())).unwrap();
        let err = generator.generate(&prompt(), None).await.unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&config_for(GenerationBackend::Ollama, &server.uri())).unwrap();
        let err = generator.generate(&prompt(), None).await.unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let mut config = config_for(GenerationBackend::Ollama, &server.uri());
        config.timeout_secs = 1;
        let generator = OllamaGenerator::new(&config).unwrap();
        let err = generator.generate(&prompt(), None).await.unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_openai_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris [1]"}}]
            })))
            .mount(&server)
            .await;

        let mut config = config_for(GenerationBackend::OpenAi, &server.uri());
        config.model = "gpt-4o-mini".to_string();
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.model_name(), "gpt-4o-mini");
        let text = generator.generate(&prompt(), None).await.unwrap();
        assert_eq!(text, "Paris [1]");
    }
}

//! A single illustrative provider adapter: an OpenAI-compatible chat
//! completions endpoint implementing [`tokenhub_router::providers::Provider`].
//!
//! Bearer auth, a configurable base URL, JSON request/response bodies, and
//! HTTP status mapped onto a typed [`ProviderError`]. This is the engine's
//! only in-scope adapter — a worked example other adapters would follow,
//! not a vendor SDK.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokenhub_router::error::ProviderError;
use tokenhub_router::models::{ClassifiedError, ErrorClass, Request, Role};
use tokenhub_router::providers::{Provider, ResponseBytes};

pub struct OpenAiCompatibleProvider {
    id: String,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn request_body(model_id: &str, request: &Request) -> serde_json::Value {
    let messages: Vec<_> = request
        .messages
        .iter()
        .map(|m| json!({ "role": role_str(m.role), "content": m.content }))
        .collect();
    let mut body = json!({ "model": model_id, "messages": messages });
    let map = body.as_object_mut().expect("object literal");
    for (key, value) in &request.params {
        map.insert(key.clone(), value.clone());
    }
    if let Some(schema) = &request.output_schema {
        map.insert(
            "response_format".to_string(),
            json!({ "type": "json_schema", "json_schema": schema }),
        );
    }
    body
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(
        &self,
        deadline: Duration,
        model_id: &str,
        request: &Request,
    ) -> Result<ResponseBytes, ProviderError> {
        let response = self
            .http
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .timeout(deadline)
            .json(&request_body(model_id, request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_response(status, body));
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn classify_error(&self, error: &ProviderError) -> ClassifiedError {
        let class = match error {
            ProviderError::ContextOverflow => ErrorClass::ContextOverflow,
            ProviderError::RateLimit | ProviderError::QuotaExceeded => ErrorClass::RateLimited,
            ProviderError::Timeout
            | ProviderError::ServiceUnavailable
            | ProviderError::NetworkError { .. }
            | ProviderError::Http(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        };
        ClassifiedError {
            class,
            retry_after: None,
            message: error.to_string(),
        }
    }

    fn health_endpoint(&self) -> Option<String> {
        Some(format!("{}/models", self.base_url.trim_end_matches('/')))
    }
}

fn map_error_response(status: u16, body: String) -> ProviderError {
    match status {
        401 => ProviderError::InvalidApiKey,
        404 => ProviderError::ModelNotFound { model: body },
        429 => ProviderError::RateLimit,
        400 if body.contains("context_length_exceeded") || body.contains("maximum context length") => {
            ProviderError::ContextOverflow
        }
        503 => ProviderError::ServiceUnavailable,
        code => ProviderError::Api { code, message: body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenhub_router::models::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> Request {
        Request {
            messages: vec![Message::user("hello")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn send_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"choices\":[]}"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("p1", server.uri(), "sk-test");
        let body = provider
            .send(Duration::from_secs(5), "gpt-test", &request())
            .await
            .unwrap();
        assert_eq!(body, b"{\"choices\":[]}".to_vec());
    }

    #[tokio::test]
    async fn send_maps_401_to_invalid_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("p1", server.uri(), "sk-bad");
        let error = provider
            .send(Duration::from_secs(5), "gpt-test", &request())
            .await
            .unwrap_err();
        assert!(matches!(error, ProviderError::InvalidApiKey));
    }

    #[tokio::test]
    async fn send_maps_429_to_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("p1", server.uri(), "sk-test");
        let error = provider
            .send(Duration::from_secs(5), "gpt-test", &request())
            .await
            .unwrap_err();
        assert!(matches!(error, ProviderError::RateLimit));
    }

    #[test]
    fn classify_error_maps_rate_limit_to_rate_limited_class() {
        let provider = OpenAiCompatibleProvider::new("p1", "http://localhost", "sk-test");
        let classified = provider.classify_error(&ProviderError::RateLimit);
        assert_eq!(classified.class, ErrorClass::RateLimited);
    }

    #[test]
    fn health_endpoint_appends_models_path() {
        let provider = OpenAiCompatibleProvider::new("p1", "https://api.openai.com/v1/", "sk-test");
        assert_eq!(
            provider.health_endpoint().unwrap(),
            "https://api.openai.com/v1/models"
        );
    }
}

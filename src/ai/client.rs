//! HTTP transport for the OpenRouter chat-completion API.
//!
//! Three operations are exposed: model listing, a non-streaming chat call and
//! a streaming chat call whose body is handed to the SSE decoder in
//! [`super::sse`]. All of them go through the [`ChatTransport`] trait so the
//! session can be driven by a scripted transport in tests.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sse;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazy sequence of text deltas produced by a streaming chat call.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A model offered by the service. Fetched fresh for every listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

impl ModelDescriptor {
    /// Display label: the human name when the provider sends one.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("OpenRouter {operation} failed: {status} {status_text}")]
    Status {
        operation: &'static str,
        status: u16,
        status_text: String,
    },

    #[error("OpenRouter request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no data received from OpenRouter for {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),
}

/// The operations the chat session needs from a chat-completion service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError>;

    /// Non-streaming completion; returns the raw decoded response body.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, TransportError>;

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, TransportError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Providers disagree on the listing envelope; accept either field.
#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Option<Vec<ModelDescriptor>>,
    #[serde(default)]
    models: Option<Vec<ModelDescriptor>>,
}

impl ModelList {
    fn into_models(self) -> Vec<ModelDescriptor> {
        self.data.or(self.models).unwrap_or_default()
    }
}

/// OpenRouter client. The API key is fixed for the lifetime of the client.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    idle_timeout: Option<Duration>,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, TransportError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            idle_timeout: None,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound the wait for each chunk of a streaming body.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<Response, TransportError> {
        debug!(model, messages = messages.len(), stream, "Sending chat request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&ChatRequest { model, messages, stream })
            .send()
            .await?;
        Ok(response)
    }
}

/// Map a non-2xx response to [`TransportError::Status`].
async fn ensure_success(
    response: Response,
    operation: &'static str,
) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(operation, status = status.as_u16(), body = %body, "OpenRouter returned an error");
    Err(TransportError::Status {
        operation,
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl ChatTransport for OpenRouterClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let response = ensure_success(response, "listModels").await?;
        let bytes = response.bytes().await?;
        let list: ModelList = serde_json::from_slice(&bytes)?;
        Ok(list.into_models())
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, TransportError> {
        let response = self.post_chat(model, messages, false).await?;
        let response = ensure_success(response, "chat").await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, TransportError> {
        let response = self.post_chat(model, messages, true).await?;
        let response = ensure_success(response, "chat (stream)").await?;
        Ok(Box::pin(sse::delta_stream(response.bytes_stream(), self.idle_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{json_response, serve_once};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_list_models_accepts_data_field_and_sends_bearer() {
        let body = r#"{"data":[{"id":"openai/gpt-4o","name":"GPT-4o","context_length":128000},{"id":"meta/llama"}]}"#;
        let (base, server) = serve_once(json_response("200 OK", body)).await;
        let client = OpenRouterClient::new("sk-test").unwrap().with_base_url(base);

        let models = client.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].label(), "GPT-4o");
        assert_eq!(models[0].context_length, Some(128000));
        assert_eq!(models[1].label(), "meta/llama");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /models"));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn test_list_models_accepts_models_field() {
        let body = r#"{"models":[{"id":"a"}]}"#;
        let (base, _server) = serve_once(json_response("200 OK", body)).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);
        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec![ModelDescriptor { id: "a".into(), name: None, context_length: None }]);
    }

    #[tokio::test]
    async fn test_list_models_without_known_field_is_empty() {
        let (base, _server) = serve_once(json_response("200 OK", "{}")).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);
        assert!(client.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_transport_error() {
        let (base, _server) =
            serve_once(json_response("401 Unauthorized", r#"{"error":"bad key"}"#)).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);

        match client.list_models().await {
            Err(TransportError::Status { status, status_text, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(status_text, "Unauthorized");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_returns_raw_json_and_sends_stream_false() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let (base, server) = serve_once(json_response("200 OK", body)).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);

        let json = client.chat("m", &[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(json["choices"][0]["message"]["content"], "hello");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.contains(r#""stream":false"#));
        assert!(request.contains(r#""role":"user""#));
    }

    #[tokio::test]
    async fn test_chat_stream_decodes_chunked_sse_body() {
        let events = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let mut response = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        );
        // Split the body into two HTTP chunks in the middle of an event.
        let (first, second) = events.split_at(30);
        for part in [first, second] {
            response.push_str(&format!("{:x}\r\n{part}\r\n", part.len()));
        }
        response.push_str("0\r\n\r\n");

        let (base, server) = serve_once(response).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);
        let stream = client.chat_stream("m", &[ChatMessage::user("hi")]).await.unwrap();
        let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;

        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
        assert!(server.await.unwrap().contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn test_chat_non_success_status_fails_before_decoding() {
        let (base, _server) =
            serve_once(json_response("429 Too Many Requests", r#"{"error":"slow down"}"#)).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);

        match client.chat("m", &[ChatMessage::user("hi")]).await {
            Err(TransportError::Status { status, status_text, .. }) => {
                assert_eq!(status, 429);
                assert_eq!(status_text, "Too Many Requests");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_stream_non_success_status_fails_before_decoding() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n";
        let response = format!(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (base, _server) = serve_once(response).await;
        let client = OpenRouterClient::new("k").unwrap().with_base_url(base);

        match client.chat_stream("m", &[ChatMessage::user("hi")]).await {
            Err(TransportError::Status { status, .. }) => assert_eq!(status, 500),
            Err(other) => panic!("expected status error, got {other:?}"),
            Ok(_) => panic!("expected status error, got a delta stream"),
        }
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }
}

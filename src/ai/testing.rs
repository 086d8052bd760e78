//! Test doubles: a scripted chat transport and a one-shot HTTP server.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::client::{ChatMessage, ChatTransport, DeltaStream, ModelDescriptor, TransportError};

enum Step {
    Reply(Vec<String>),
    ReplyThenFail(Vec<String>, u16),
    Fail(u16),
    /// A stream that never yields.
    Hang,
}

fn status(status: u16) -> TransportError {
    TransportError::Status {
        operation: "chat (stream)",
        status,
        status_text: "Scripted".into(),
    }
}

/// Replays one scripted step per chat call and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    models: Vec<ModelDescriptor>,
    models_status: Option<u16>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn reply<I, S>(self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Step::Reply(deltas.into_iter().map(Into::into).collect()))
    }

    pub(crate) fn reply_then_fail<I, S>(self, deltas: I, code: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Step::ReplyThenFail(deltas.into_iter().map(Into::into).collect(), code))
    }

    pub(crate) fn fail(self, code: u16) -> Self {
        self.push(Step::Fail(code))
    }

    pub(crate) fn hang(self) -> Self {
        self.push(Step::Hang)
    }

    pub(crate) fn with_models(mut self, ids: &[&str]) -> Self {
        self.models = ids
            .iter()
            .map(|id| ModelDescriptor { id: id.to_string(), name: None, context_length: None })
            .collect();
        self
    }

    pub(crate) fn with_models_failure(mut self, code: u16) -> Self {
        self.models_status = Some(code);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, messages: &[ChatMessage]) -> Step {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script.lock().unwrap().pop_front().unwrap_or(Step::Reply(Vec::new()))
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        match self.models_status {
            Some(code) => Err(TransportError::Status {
                operation: "listModels",
                status: code,
                status_text: "Scripted".into(),
            }),
            None => Ok(self.models.clone()),
        }
    }

    async fn chat(
        &self,
        _model: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, TransportError> {
        match self.next_step(messages) {
            Step::Reply(deltas) => Ok(json!({"choices": [{"message": {"content": deltas.concat()}}]})),
            Step::ReplyThenFail(_, code) | Step::Fail(code) => Err(status(code)),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn chat_stream(
        &self,
        _model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, TransportError> {
        match self.next_step(messages) {
            Step::Reply(deltas) => Ok(Box::pin(stream::iter(deltas.into_iter().map(Ok)))),
            Step::ReplyThenFail(deltas, code) => {
                let items = deltas.into_iter().map(Ok).chain(std::iter::once(Err(status(code))));
                Ok(Box::pin(stream::iter(items)))
            }
            Step::Fail(code) => Err(status(code)),
            Step::Hang => Ok(Box::pin(stream::pending())),
        }
    }
}

/// Serve exactly one canned HTTP response and return the request head.
pub(crate) async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });
    (format!("http://{addr}"), handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}

pub(crate) fn json_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

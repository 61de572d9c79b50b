//! `OpenAI` Assistants v2 client
//!
//! Threads, messages, streaming runs, tool-output submission, and vision
//! file uploads.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{
    AssistantBackend, ContentPart, RequestedCall, RequiredAction, RunEvent, RunStream, SseEvent,
    SseParser, ToolOutput, VisionUploader,
};
use crate::{Error, Result};

/// Default API base URL
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Client for the `OpenAI` Assistants API
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    role: &'a str,
    content: &'a [ContentPart],
}

#[derive(Serialize)]
struct RunRequest<'a> {
    assistant_id: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    tool_outputs: &'a [ToolOutput],
    stream: bool,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: DeltaBody,
}

#[derive(Deserialize)]
struct DeltaBody {
    #[serde(default)]
    content: Vec<DeltaContent>,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(default)]
    text: Option<DeltaText>,
}

#[derive(Deserialize)]
struct DeltaText {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    thread_id: String,
    #[serde(default)]
    required_action: Option<RunRequiredAction>,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunRequiredAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<RunToolCall>,
}

#[derive(Deserialize)]
struct RunToolCall {
    id: String,
    function: RunFunction,
}

#[derive(Deserialize)]
struct RunFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

impl OpenAiAssistant {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for the assistant".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    /// Point the client at a different API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// POST a JSON body to an assistants endpoint, failing on non-2xx
    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url, "assistant request failed");
                Error::BackendStream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "assistant API error");
            return Err(Error::BackendStream(format!(
                "assistant API error {status}: {body}"
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl AssistantBackend for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String> {
        let response = self
            .post_json("/threads", &serde_json::json!({}))
            .await
            .map_err(|e| Error::ThreadCreateFailed(e.to_string()))?;
        let thread: Created = response.json().await?;

        tracing::info!(thread_id = %thread.id, "thread created");
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, content: &[ContentPart]) -> Result<()> {
        let request = MessageRequest {
            role: "user",
            content,
        };
        let response = self
            .post_json(&format!("/threads/{thread_id}/messages"), &request)
            .await?;
        let message: Created = response.json().await?;

        tracing::debug!(thread_id, message_id = %message.id, parts = content.len(), "message added");
        Ok(())
    }

    async fn start_stream(&self, thread_id: &str, assistant_id: &str) -> Result<RunStream> {
        let request = RunRequest {
            assistant_id,
            stream: true,
        };
        let response = self
            .post_json(&format!("/threads/{thread_id}/runs"), &request)
            .await?;

        tracing::debug!(thread_id, assistant_id, "run stream opened");
        Ok(run_stream(response))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunStream> {
        let request = SubmitRequest {
            tool_outputs: outputs,
            stream: true,
        };
        let response = self
            .post_json(
                &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &request,
            )
            .await?;

        tracing::debug!(thread_id, run_id, outputs = outputs.len(), "tool outputs submitted");
        Ok(run_stream(response))
    }
}

#[async_trait]
impl VisionUploader for OpenAiAssistant {
    async fn upload(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("snapshot.png")
            .to_string();

        tracing::debug!(path = %path.display(), bytes = data.len(), "uploading snapshot");

        let form = reqwest::multipart::Form::new().text("purpose", "vision").part(
            "file",
            reqwest::multipart::Part::bytes(data)
                .file_name(file_name)
                .mime_str("image/png")
                .map_err(|e| Error::Upload(e.to_string()))?,
        );

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!("files API error {status}: {body}")));
        }

        let file: Created = response.json().await?;
        tracing::info!(file_id = %file.id, "snapshot uploaded");
        Ok(file.id)
    }
}

/// Turn a streaming HTTP response into run events
fn run_stream(response: reqwest::Response) -> RunStream {
    let stream = async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::new();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Error::BackendStream(e.to_string()))?;
            for sse in parser.push(&chunk)? {
                match parse_run_event(&sse)? {
                    Some(event) => yield event,
                    None => break 'read,
                }
            }
        }

        if let Some(sse) = parser.finish()? {
            if let Some(event) = parse_run_event(&sse)? {
                yield event;
            }
        }
    };

    Box::pin(stream)
}

/// Map one server-sent event to a run event
///
/// Returns `None` for the terminal `done` marker.
fn parse_run_event(sse: &SseEvent) -> Result<Option<RunEvent>> {
    let name = sse.event.as_deref().unwrap_or("message");

    let event = match name {
        "done" => return Ok(None),
        "thread.message.delta" => {
            let delta: MessageDelta = serde_json::from_str(&sse.data)?;
            let text: String = delta
                .delta
                .content
                .into_iter()
                .filter_map(|c| c.text.and_then(|t| t.value))
                .collect();
            RunEvent::TextDelta(text)
        }
        "thread.run.requires_action" => {
            let run: RunObject = serde_json::from_str(&sse.data)?;
            match run.required_action {
                Some(RunRequiredAction {
                    action_type,
                    submit_tool_outputs: Some(submit),
                }) if action_type == "submit_tool_outputs" => {
                    RunEvent::RequiresAction(RequiredAction {
                        run_id: run.id,
                        thread_id: run.thread_id,
                        calls: submit
                            .tool_calls
                            .into_iter()
                            .map(|c| RequestedCall {
                                id: c.id,
                                name: c.function.name,
                                arguments: c.function.arguments,
                            })
                            .collect(),
                    })
                }
                _ => RunEvent::Other(name.to_string()),
            }
        }
        "thread.run.completed" => RunEvent::Completed,
        "thread.run.failed" => {
            let run: RunObject = serde_json::from_str(&sse.data)?;
            RunEvent::Failed(
                run.last_error
                    .map_or_else(|| "run failed".to_string(), |e| e.message),
            )
        }
        "thread.run.cancelled" => RunEvent::Failed("run cancelled".to_string()),
        "thread.run.expired" => RunEvent::Failed("run expired".to_string()),
        "error" => return Err(Error::BackendStream(sse.data.clone())),
        other => RunEvent::Other(other.to_string()),
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(event: &str, data: &str) -> SseEvent {
        SseEvent {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn message_delta_becomes_text() {
        let event = parse_run_event(&sse(
            "thread.message.delta",
            r#"{"id":"msg_1","delta":{"content":[{"index":0,"type":"text","text":{"value":"Hel"}}]}}"#,
        ))
        .unwrap();

        assert_eq!(event, Some(RunEvent::TextDelta("Hel".to_string())));
    }

    #[test]
    fn requires_action_extracts_calls() {
        let data = r#"{
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "send_text_message", "arguments": "{\"message\":\"hi\"}"}
                    }]
                }
            }
        }"#;

        let Some(RunEvent::RequiresAction(action)) =
            parse_run_event(&sse("thread.run.requires_action", data)).unwrap()
        else {
            panic!("expected requires_action");
        };

        assert_eq!(action.run_id, "run_1");
        assert_eq!(action.thread_id, "thread_1");
        assert_eq!(action.calls.len(), 1);
        assert_eq!(action.calls[0].name, "send_text_message");
        assert_eq!(action.calls[0].arguments, r#"{"message":"hi"}"#);
    }

    #[test]
    fn failed_run_carries_last_error() {
        let event = parse_run_event(&sse(
            "thread.run.failed",
            r#"{"id":"run_1","thread_id":"t","last_error":{"code":"server_error","message":"boom"}}"#,
        ))
        .unwrap();

        assert_eq!(event, Some(RunEvent::Failed("boom".to_string())));
    }

    #[test]
    fn done_ends_and_unknown_is_other() {
        assert_eq!(parse_run_event(&sse("done", "[DONE]")).unwrap(), None);
        assert_eq!(
            parse_run_event(&sse("thread.run.step.created", "{}")).unwrap(),
            Some(RunEvent::Other("thread.run.step.created".to_string()))
        );
    }

    #[test]
    fn new_requires_api_key() {
        assert!(matches!(
            OpenAiAssistant::new(String::new()),
            Err(Error::Config(_))
        ));
    }
}

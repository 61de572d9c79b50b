//! External action dispatch
//!
//! Resolves the function calls an assistant run asks for. Each call maps to
//! an [`EventKind`]; today the only action is the Zapier webhook.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::backend::WebhookClient;
use crate::engine::PendingAction;
use crate::event::EventKind;
use crate::{Error, Result};

/// Output reported to the assistant when an action succeeds
pub const SUCCESS_OUTPUT: &str = "Success!";

/// Executes tool calls against their external services
pub struct ToolDispatcher {
    webhook: Arc<dyn WebhookClient>,
    zapier_url: Option<String>,
}

impl ToolDispatcher {
    /// Create a dispatcher posting Zapier actions to `zapier_url`
    #[must_use]
    pub const fn new(webhook: Arc<dyn WebhookClient>, zapier_url: Option<String>) -> Self {
        Self {
            webhook,
            zapier_url,
        }
    }

    /// Run one action and return its output
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedToolFunction`] if `kind` is not an action,
    /// [`Error::InvalidToolArguments`] if the arguments lack a message,
    /// [`Error::Config`] if no webhook URL is configured, or
    /// [`Error::ExternalActionFailed`] on a non-2xx response.
    pub async fn resolve(&self, kind: EventKind, arguments: &Value) -> Result<String> {
        match kind {
            EventKind::Zapier => self.send_zapier(arguments).await,
            other => Err(Error::UnsupportedToolFunction(other.to_string())),
        }
    }

    /// Resolve every call of a batch in order
    ///
    /// The returned action has every output filled in. The first failure
    /// aborts the batch: later calls are never attempted and no partial
    /// result is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the first call that fails
    pub async fn dispatch_batch(&self, action: &PendingAction) -> Result<PendingAction> {
        let mut resolved = action.clone();

        for call in &mut resolved.calls {
            tracing::info!(
                call_id = %call.call_id,
                kind = %call.kind,
                "resolving tool call"
            );

            let output = self
                .resolve(call.kind, &call.arguments)
                .await
                .inspect_err(|e| {
                    tracing::warn!(call_id = %call.call_id, error = %e, "tool call failed");
                })?;
            call.output = Some(output);
        }

        Ok(resolved)
    }

    async fn send_zapier(&self, arguments: &Value) -> Result<String> {
        let Some(url) = &self.zapier_url else {
            return Err(Error::Config("no Zapier webhook URL configured".to_string()));
        };
        let payload = zapier_payload(arguments)?;
        let status_code = self.webhook.post(url, &payload).await?;

        if (200..300).contains(&status_code) {
            tracing::info!(status_code, "zapier action succeeded");
            Ok(SUCCESS_OUTPUT.to_string())
        } else {
            Err(Error::ExternalActionFailed { status_code })
        }
    }
}

/// Build the webhook body; arguments may arrive as a JSON object or as a
/// string holding one
fn zapier_payload(arguments: &Value) -> Result<Value> {
    let parsed;
    let arguments = match arguments {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)?;
            &parsed
        }
        other => other,
    };

    let message = arguments
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidToolArguments("missing \"message\"".to_string()))?;

    Ok(json!({ "text": message }))
}

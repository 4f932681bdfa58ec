use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::permission::Registration;
use crate::protocol::canonical::{AgentEvent, ResponsePayload};
use crate::provider::{Provider, ProviderRequest, SessionContext};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// One step of a scripted generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    Text(String),
    Reasoning(String),
    ToolStart {
        id: String,
        name: String,
    },
    ToolArgs {
        id: String,
        fragment: String,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    StopReason(String),
    /// Suspend until a human grants or denies the tool call.
    Permission {
        tool: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        rememberable: bool,
    },
    /// Pause for the given number of milliseconds.
    Delay(u64),
    Fail(String),
    /// Produce nothing until cancelled.
    Hang,
}

/// Replays a fixed script; drives tests and demos without a vendor backend.
pub struct ScriptedProvider {
    id: String,
    models: Vec<String>,
    script: Vec<ScriptStep>,
    list_models_error: Option<String>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(id: String, models: Vec<String>, script: Vec<ScriptStep>) -> Self {
        Self {
            id,
            models,
            script,
            list_models_error: None,
        }
    }

    #[must_use]
    pub fn with_list_models_error(mut self, error: Option<String>) -> Self {
        self.list_models_error = error;
        self
    }
}

/// Run the script, sending events until it ends, fails, or the session is
/// cancelled. A closed channel means the consumer is gone.
async fn run_script(script: Vec<ScriptStep>, ctx: SessionContext, tx: mpsc::Sender<AgentEvent>) {
    for step in script {
        if ctx.cancel.is_cancelled() {
            return;
        }
        let event = match step {
            ScriptStep::Text(text) => AgentEvent::text(text),
            ScriptStep::Reasoning(text) => AgentEvent::reasoning(text),
            ScriptStep::ToolStart { id, name } => AgentEvent::tool_start(id, name),
            ScriptStep::ToolArgs { id, fragment } => AgentEvent::tool_args(id, fragment),
            ScriptStep::Usage {
                input_tokens,
                output_tokens,
            } => AgentEvent::usage(input_tokens, output_tokens),
            ScriptStep::StopReason(reason) => AgentEvent::stop_reason(reason),
            ScriptStep::Delay(ms) => {
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => return,
                    () = tokio::time::sleep(Duration::from_millis(ms)) => continue,
                }
            }
            ScriptStep::Fail(message) => {
                let _ = tx.send(AgentEvent::error(message)).await;
                return;
            }
            ScriptStep::Hang => {
                ctx.cancel.cancelled().await;
                return;
            }
            ScriptStep::Permission {
                tool,
                description,
                options,
                rememberable,
            } => {
                let granted = match ctx
                    .permissions
                    .request(&tool, &description, options, rememberable)
                {
                    Registration::Decided(granted) => granted,
                    Registration::Pending(permission, ticket) => {
                        let notice = AgentEvent::Response(ResponsePayload {
                            permission: Some(permission),
                            ..ResponsePayload::default()
                        });
                        if tx.send(notice).await.is_err() {
                            return;
                        }
                        ticket.wait().await
                    }
                };
                if granted {
                    continue;
                }
                if ctx.cancel.is_cancelled() {
                    return;
                }
                tracing::debug!(event_id = %ctx.event_id, tool = %tool, "tool call denied");
                let _ = tx
                    .send(AgentEvent::text(format!(
                        "Permission denied for tool '{tool}'."
                    )))
                    .await;
                let _ = tx.send(AgentEvent::end()).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
    let _ = tx.send(AgentEvent::end()).await;
}

impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn stream(
        &self,
        request: ProviderRequest,
        ctx: SessionContext,
    ) -> BoxStream<'static, AgentEvent> {
        tracing::debug!(
            event_id = %request.event_id,
            model = %request.model_id,
            steps = self.script.len(),
            "scripted generation started"
        );
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_script(self.script.clone(), ctx, tx));

        stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        })
        .boxed()
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>, GatewayError>> {
        let result = match &self.list_models_error {
            Some(message) => Err(GatewayError::Provider(message.clone())),
            None => Ok(self.models.clone()),
        };
        async move { result }.boxed()
    }
}

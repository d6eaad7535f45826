//! Tool-call handling.
//!
//! Each request runs on its own task so a slow handler never holds up the
//! inbound event stream. Every request id is answered at most once.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::base::{ToolCallRequest, ToolCallResponse, TransportSession};

/// Host-side implementation of the functions the agent may call.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    /// Handle one request.
    ///
    /// Returns the result payload to send back, or `None` to leave the call
    /// unanswered (unknown function, malformed arguments).
    async fn handle_tool_call(&self, request: &ToolCallRequest) -> Option<Value>;
}

/// What happened to one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallOutcome {
    /// Response was accepted by the transport
    Responded,
    /// Handler declined to answer
    Declined,
    /// Id was already dispatched
    Duplicate,
    /// Session ended before the handler finished
    Cancelled,
    /// Transport rejected the response
    SendFailed,
    /// No handler configured
    Unhandled,
}

/// Fans tool-call requests out to the handler and sends back responses.
#[derive(Clone)]
pub struct ToolCallDispatcher {
    handler: Option<Arc<dyn ToolCallHandler>>,
    session: Arc<dyn TransportSession>,
    seen: Arc<DashMap<String, ()>>,
    cancel: CancellationToken,
}

impl ToolCallDispatcher {
    pub fn new(
        handler: Option<Arc<dyn ToolCallHandler>>,
        session: Arc<dyn TransportSession>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            handler,
            session,
            seen: Arc::new(DashMap::new()),
            cancel,
        }
    }

    /// Start handling `request` without waiting for it.
    pub fn dispatch(&self, request: ToolCallRequest) -> JoinHandle<ToolCallOutcome> {
        let Some(handler) = self.handler.clone() else {
            debug!("No tool handler configured, ignoring call to {}", request.name);
            return tokio::spawn(async { ToolCallOutcome::Unhandled });
        };

        if self.seen.insert(request.id.clone(), ()).is_some() {
            warn!("Ignoring duplicate tool call id {}", request.id);
            return tokio::spawn(async { ToolCallOutcome::Duplicate });
        }

        let session = self.session.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            info!("Tool call: {} (id {})", request.name, request.id);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ToolCallOutcome::Cancelled,
                result = handler.handle_tool_call(&request) => result,
            };

            let Some(result) = result else {
                debug!("Tool call {} produced no response", request.id);
                return ToolCallOutcome::Declined;
            };

            if cancel.is_cancelled() {
                return ToolCallOutcome::Cancelled;
            }

            let response = ToolCallResponse {
                id: request.id,
                name: request.name,
                result,
            };
            match session.send_tool_response(response).await {
                Ok(()) => ToolCallOutcome::Responded,
                Err(e) => {
                    warn!("Failed to send tool response: {}", e);
                    ToolCallOutcome::SendFailed
                }
            }
        })
    }
}

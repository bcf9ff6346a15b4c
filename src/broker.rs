//! Caller-facing entry points: start a chat, poll a streaming session, cancel it.

use crate::error::Result;
use crate::provider::{
    openai, ApiClient, ChatCompletionRequest, ChatParams, ClientOptions, PolicySet,
};
use crate::session::{PollResponse, SessionStore};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of [`ChatBroker::start_chat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StartChatResponse {
    /// A streaming session was opened; poll it for content.
    #[serde(rename_all = "camelCase")]
    Stream {
        session_id: String,
        is_stream: bool,
        has_more: bool,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Immediate { response: String, is_stream: bool },
    Failed { error: String, stack: String },
}

#[derive(Debug, Clone, Default)]
pub struct ChatBroker {
    store: SessionStore,
    policies: PolicySet,
    client_opts: ClientOptions,
}

impl ChatBroker {
    pub fn new(client_opts: ClientOptions) -> Self {
        Self {
            client_opts,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Issue a chat completion. Streaming requests return as soon as the
    /// upstream accepts them; content then arrives through [`Self::poll_stream`].
    ///
    /// Never fails: errors come back as [`StartChatResponse::Failed`].
    pub async fn start_chat(&self, params: ChatParams) -> StartChatResponse {
        match self.dispatch(&params).await {
            Ok(res) => res,
            Err(e) => {
                tracing::error!(error = %e, base_url = %params.base_url, "chat request failed");
                StartChatResponse::Failed {
                    error: e.to_string(),
                    stack: e.chain(),
                }
            }
        }
    }

    async fn dispatch(&self, params: &ChatParams) -> Result<StartChatResponse> {
        let client = ApiClient::build(
            &self.client_opts,
            &params.base_url,
            &params.api_key,
            params.proxy.as_deref(),
        )?;
        tracing::debug!(
            base_url = %params.base_url,
            path = %params.path,
            model = %params.model,
            stream = params.stream,
            "dispatching chat"
        );

        let body = ChatCompletionRequest {
            model: &params.model,
            messages: &params.messages,
            stream: params.stream,
        };
        let req = client.post(&params.path)?.json(&body);
        let provider = params.provider.as_deref();

        if !params.stream {
            let response = openai::complete(req, &self.policies, provider).await?;
            return Ok(StartChatResponse::Immediate {
                response,
                is_stream: false,
            });
        }

        let resp = openai::open_stream(req, &self.policies, provider).await?;
        let (session_id, cancel) = self.store.create();
        tokio::spawn(openai::consume_stream(
            resp.bytes_stream(),
            self.store.clone(),
            session_id.clone(),
            cancel,
        ));

        Ok(StartChatResponse::Stream {
            session_id,
            is_stream: true,
            has_more: true,
            content: String::new(),
        })
    }

    /// Snapshot of a streaming session. Terminal sessions are removed by this call.
    pub fn poll_stream(&self, session_id: &str) -> PollResponse {
        self.store.poll(session_id)
    }

    /// Abort a streaming session. Returns false if it was unknown or already consumed.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.store.cancel(session_id)
    }

    /// Periodically evict sessions that have been idle longer than `max_idle`.
    pub fn spawn_reaper(&self, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        // tokio::time::interval panics on a zero period.
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = store.len(), "reaped idle sessions");
                }
            }
        })
    }
}

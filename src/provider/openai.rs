//! OpenAI-compatible chat completions: request dispatch and stream consumption.

use super::decoder::{StreamDecoder, StreamEvent};
use super::policy::PolicySet;
use super::types::{ApiErrorEnvelope, ChatCompletion};
use crate::error::{BrokerError, Result};
use crate::session::SessionStore;
use futures_core::Stream;
use reqwest::{RequestBuilder, Response};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Send a non-streaming request and extract the first choice's message text.
pub async fn complete(
    req: RequestBuilder,
    policies: &PolicySet,
    provider: Option<&str>,
) -> Result<String> {
    let resp = req.send().await?;
    let resp = check_status(resp, policies, provider).await?;
    let body = resp.bytes().await?;
    let completion: ChatCompletion = serde_json::from_slice(&body)?;
    completion.into_text().ok_or(BrokerError::MissingContent)
}

/// Send a streaming request. Returns the response once its status is known to be good;
/// the body has not been read yet.
pub async fn open_stream(
    req: RequestBuilder,
    policies: &PolicySet,
    provider: Option<&str>,
) -> Result<Response> {
    let resp = req.send().await?;
    check_status(resp, policies, provider).await
}

async fn check_status(
    resp: Response,
    policies: &PolicySet,
    provider: Option<&str>,
) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ApiErrorEnvelope>(&body) {
        Ok(ApiErrorEnvelope { error }) => {
            tracing::debug!(
                %status,
                code = ?error.code,
                message = %error.message,
                "upstream API error"
            );
            Err(BrokerError::Api {
                status: status.as_u16(),
                message: policies.message_for(provider, &error),
            })
        }
        Err(_) => {
            tracing::debug!(
                %status,
                body = %String::from_utf8_lossy(&body),
                "unstructured upstream error"
            );
            Err(BrokerError::Status(status.as_u16()))
        }
    }
}

/// Drive one session from its response body until the stream ends, fails,
/// hits the sentinel, or the session is cancelled.
pub async fn consume_stream<S, B, E>(
    body: S,
    store: SessionStore,
    session_id: String,
    cancel: CancellationToken,
) where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    tokio::pin!(body);
    let mut decoder = StreamDecoder::new();

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(session = %session_id, "stream cancelled");
                return;
            }
            item = body.next() => item,
        };

        match item {
            Some(Ok(chunk)) => {
                for ev in decoder.push(chunk.as_ref()) {
                    match ev {
                        StreamEvent::Delta(text) => {
                            if !store.append(&session_id, &text) {
                                tracing::debug!(
                                    session = %session_id,
                                    "session gone, dropping stream"
                                );
                                return;
                            }
                        }
                        StreamEvent::Done => {
                            store.complete(&session_id);
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(session = %session_id, error = %e, "network stream error");
                store.fail(&session_id, e.to_string());
                return;
            }
            None => {
                decoder.finish();
                store.complete(&session_id);
                return;
            }
        }
    }
}

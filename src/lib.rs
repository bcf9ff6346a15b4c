//! Streaming chat session broker for OpenAI-compatible chat completion APIs.
//!
//! [`ChatBroker::start_chat`] sends a request; streamed answers are decoded in the
//! background and read back with [`ChatBroker::poll_stream`] until `has_more` is false.

pub mod broker;
pub mod config;
pub mod error;
pub mod paths;
pub mod provider;
pub mod session;

pub use broker::{ChatBroker, StartChatResponse};
pub use error::{BrokerError, Result};
pub use provider::{ChatMessage, ChatParams};
pub use session::{PollResponse, SessionStore};

pub mod client;
pub mod decoder;
pub mod openai;
pub mod policy;
mod types;

pub use client::{ApiClient, ClientOptions};
pub use policy::{OpenAiCompatOverflow, OverflowPolicy, PolicySet, CONTEXT_LENGTH_EXCEEDED};
pub use types::{ApiError, ChatCompletionRequest, ChatMessage, ChatParams};

use super::types::ApiError;
use std::collections::HashMap;
use std::sync::Arc;

pub const CONTEXT_LENGTH_EXCEEDED: &str =
    "Context length exceeded. Please start a new chat or reduce the number of context messages.";

/// Rewrites provider-specific API errors into caller-facing messages.
pub trait OverflowPolicy: Send + Sync {
    /// Returns the replacement message, or `None` to pass the upstream message through.
    fn rewrite(&self, err: &ApiError) -> Option<String>;
}

/// Matches the context-overflow errors of OpenAI-compatible backends.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCompatOverflow;

impl OverflowPolicy for OpenAiCompatOverflow {
    fn rewrite(&self, err: &ApiError) -> Option<String> {
        let overflow = err.code_str() == Some("context_length_exceeded")
            || err.message.contains("context length")
            || err.message.contains("prompt too long");
        overflow.then(|| CONTEXT_LENGTH_EXCEEDED.to_string())
    }
}

/// Overflow policies keyed by provider label, with a fallback for unknown providers.
#[derive(Clone)]
pub struct PolicySet {
    by_provider: HashMap<String, Arc<dyn OverflowPolicy>>,
    fallback: Arc<dyn OverflowPolicy>,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            by_provider: HashMap::new(),
            fallback: Arc::new(OpenAiCompatOverflow),
        }
    }
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySet")
            .field("providers", &self.by_provider.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicySet {
    pub fn with_provider(mut self, label: &str, policy: impl OverflowPolicy + 'static) -> Self {
        self.by_provider
            .insert(label.to_ascii_lowercase(), Arc::new(policy));
        self
    }

    pub fn for_provider(&self, label: Option<&str>) -> &dyn OverflowPolicy {
        label
            .and_then(|l| self.by_provider.get(&l.to_ascii_lowercase()))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Final message for an upstream API error.
    pub fn message_for(&self, provider: Option<&str>, err: &ApiError) -> String {
        self.for_provider(provider)
            .rewrite(err)
            .unwrap_or_else(|| err.message.clone())
    }
}

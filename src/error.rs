use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid proxy specification '{spec}': {reason}")]
    InvalidProxy { spec: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Structured error returned by the upstream API, already passed through
    /// the provider's overflow policy.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Request failed with status code {0}")]
    Status(u16),

    #[error("response contained no message content")]
    MissingContent,
}

impl BrokerError {
    /// Render the error followed by every error in its source chain, one per line.
    pub fn chain(&self) -> String {
        let mut out = format!("BrokerError: {self}");
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str("\n    caused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_starts_with_display() {
        let err = BrokerError::Status(502);
        assert_eq!(err.chain(), "BrokerError: Request failed with status code 502");
    }

    #[test]
    fn json_error_chain_includes_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BrokerError::from(json_err);
        let chain = err.chain();
        assert!(chain.starts_with("BrokerError: invalid JSON"));
        assert!(chain.contains("caused by"));
    }
}

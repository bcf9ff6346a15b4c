use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_PATH: &str = "/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default model (optional)
    pub model: Option<String>,

    /// Provider preset label (e.g., "OpenAI"); supplies base_url when set.
    pub provider: Option<String>,

    pub base_url: Option<String>,
    pub api_path: Option<String>,
    pub api_key: Option<String>,

    /// Proxy URL: http://, https://, socks5:// or socks5h://
    pub proxy: Option<String>,

    pub connect_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub session_idle_timeout_secs: Option<u64>,

    /// Extra provider presets, merged over the built-in ones by label.
    #[serde(default)]
    pub providers: Vec<ProviderPreset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreset {
    pub label: String,
    pub base_url: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderPreset {
    fn new(label: &str, base_url: &str, homepage: &str, models: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            base_url: base_url.to_string(),
            homepage: Some(homepage.to_string()),
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }
}

pub fn builtin_providers() -> Vec<ProviderPreset> {
    vec![
        ProviderPreset::new(
            "OpenAI",
            "https://api.openai.com/v1",
            "https://openai.com",
            &["gpt-4o-mini", "gpt-4o", "gpt-4", "gpt-3.5-turbo"],
        ),
        ProviderPreset::new(
            "DeepSeek",
            "https://api.deepseek.com/v1",
            "https://deepseek.com",
            &["deepseek-chat", "deepseek-coder", "deepseek-reasoner"],
        ),
    ]
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Built-in presets with configured ones replacing or extending them.
    pub fn providers(&self) -> Vec<ProviderPreset> {
        let mut out = builtin_providers();
        for p in &self.providers {
            match out.iter_mut().find(|b| b.label.eq_ignore_ascii_case(&p.label)) {
                Some(existing) => *existing = p.clone(),
                None => out.push(p.clone()),
            }
        }
        out
    }

    pub fn find_provider(&self, label: &str) -> Option<ProviderPreset> {
        self.providers()
            .into_iter()
            .find(|p| p.label.eq_ignore_ascii_case(label))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(200).max(1))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs.unwrap_or(300).max(1))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

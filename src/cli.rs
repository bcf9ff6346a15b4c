use clap::{Parser, Subcommand};

/// Streaming chat client for OpenAI-compatible APIs
#[derive(Debug, Parser)]
#[command(name = "aichat")]
#[command(version)]
#[command(about = "Streaming chat client for OpenAI-compatible APIs", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider preset label (default: config/provider)
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// API base URL; overrides the provider preset
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Request path appended to the base URL
    #[arg(long = "path")]
    pub path: Option<String>,

    /// Proxy URL (http, https, socks5, socks5h)
    #[arg(long = "proxy")]
    pub proxy: Option<String>,

    /// System prompt sent before the user message
    #[arg(long = "system")]
    pub system: Option<String>,

    /// Wait for the whole answer instead of streaming it
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List provider presets and their models
    Providers,
}

use crate::cli::Args;
use aichat::config::{self, Config};
use aichat::{ChatBroker, ChatMessage, ChatParams, PollResponse, StartChatResponse};
use anyhow::anyhow;
use std::io::Write;

/// Resolve request parameters from flags, environment and config, in that order.
pub fn build_params(args: &Args, cfg: &Config, prompt: String) -> anyhow::Result<ChatParams> {
    let preset = |label: &str| {
        cfg.find_provider(label)
            .ok_or_else(|| anyhow!("unknown provider: {label}"))
    };

    let flag_preset = args.provider.as_deref().map(preset).transpose()?;
    let cfg_preset = cfg.provider.as_deref().map(preset).transpose()?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| flag_preset.as_ref().map(|p| p.base_url.clone()))
        .or_else(|| cfg.base_url.clone())
        .or_else(|| cfg_preset.as_ref().map(|p| p.base_url.clone()))
        .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());

    let model = args
        .model
        .clone()
        .or_else(|| cfg.model.clone())
        .or_else(|| {
            flag_preset
                .as_ref()
                .or(cfg_preset.as_ref())
                .and_then(|p| p.models.first().cloned())
        })
        .unwrap_or_else(|| config::DEFAULT_MODEL.to_string());

    let api_key = std::env::var("AICHAT_API_KEY")
        .ok()
        .or_else(|| cfg.api_key.clone())
        .unwrap_or_default();

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.as_str()));
    }
    messages.push(ChatMessage::user(prompt));

    Ok(ChatParams {
        messages,
        model,
        base_url,
        path: args
            .path
            .clone()
            .or_else(|| cfg.api_path.clone())
            .unwrap_or_else(|| config::DEFAULT_API_PATH.to_string()),
        api_key,
        proxy: args.proxy.clone().or_else(|| cfg.proxy.clone()),
        stream: !args.no_stream,
        provider: flag_preset.or(cfg_preset).map(|p| p.label),
    })
}

pub async fn cmd_chat(broker: &ChatBroker, cfg: &Config, params: ChatParams) -> anyhow::Result<()> {
    let mut out = std::io::stdout();

    match broker.start_chat(params).await {
        StartChatResponse::Immediate { response, .. } => {
            writeln!(out, "{response}").ok();
            Ok(())
        }
        StartChatResponse::Failed { error, stack } => {
            tracing::debug!(%stack, "start chat failed");
            Err(anyhow!(error))
        }
        StartChatResponse::Stream { session_id, .. } => {
            let mut printed = 0;
            let mut ticker = tokio::time::interval(cfg.poll_interval());
            loop {
                ticker.tick().await;
                let res = broker.poll_stream(&session_id);
                if let PollResponse::NotFound { error } = &res {
                    return Err(anyhow!("{error}: {session_id}"));
                }

                let content = res.content();
                if content.len() > printed {
                    write!(out, "{}", &content[printed..]).ok();
                    out.flush().ok();
                    printed = content.len();
                }

                if let Some(error) = res.error() {
                    writeln!(out).ok();
                    return Err(anyhow!("stream failed: {error}"));
                }
                if !res.has_more() {
                    writeln!(out).ok();
                    return Ok(());
                }
            }
        }
    }
}

pub fn cmd_providers(cfg: &Config) {
    let selected = cfg.provider.as_deref().unwrap_or("");
    for p in cfg.providers() {
        let marker = if p.label.eq_ignore_ascii_case(selected) { "*" } else { " " };
        println!("{marker} {}\t{}", p.label, p.base_url);
        for m in &p.models {
            println!("      {m}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["aichat"];
        argv.extend_from_slice(extra);
        argv.push("hi");
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_config() {
        let p = build_params(&args(&[]), &Config::default(), "hi".into()).unwrap();
        assert_eq!(p.base_url, config::DEFAULT_BASE_URL);
        assert_eq!(p.path, config::DEFAULT_API_PATH);
        assert_eq!(p.model, config::DEFAULT_MODEL);
        assert!(p.stream);
        assert_eq!(p.messages, vec![ChatMessage::user("hi")]);
        assert_eq!(p.provider, None);
    }

    #[test]
    fn provider_flag_selects_preset() {
        let p = build_params(
            &args(&["--provider", "deepseek", "--system", "terse", "--no-stream"]),
            &Config::default(),
            "hi".into(),
        )
        .unwrap();
        assert_eq!(p.base_url, "https://api.deepseek.com/v1");
        assert_eq!(p.model, "deepseek-chat");
        assert_eq!(p.provider.as_deref(), Some("DeepSeek"));
        assert!(!p.stream);
        assert_eq!(p.messages[0], ChatMessage::system("terse"));
    }

    #[test]
    fn flags_override_config() {
        let cfg = Config {
            base_url: Some("https://cfg.example.com/v1".into()),
            proxy: Some("http://cfg-proxy:3128".into()),
            model: Some("cfg-model".into()),
            ..Config::default()
        };
        let p = build_params(
            &args(&[
                "--base-url",
                "https://flag.example.com",
                "--proxy",
                "socks5://127.0.0.1:1080",
            ]),
            &cfg,
            "hi".into(),
        )
        .unwrap();
        assert_eq!(p.base_url, "https://flag.example.com");
        assert_eq!(p.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(p.model, "cfg-model");
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = build_params(&args(&["--provider", "nope"]), &Config::default(), "hi".into())
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown provider: nope");
    }
}

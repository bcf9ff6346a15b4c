mod app;
mod cli;

use aichat::config::Config;
use aichat::paths;
use aichat::provider::ClientOptions;
use aichat::ChatBroker;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the chat; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = Config::load_optional(&config_path)?.unwrap_or_default();
    tracing::debug!(?config_path, provider = ?cfg.provider, model = ?cfg.model, "resolved config");

    if let Some(cli::Command::Providers) = args.cmd {
        app::cmd_providers(&cfg);
        return Ok(());
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: aichat \"Hello\"");
    }

    let params = app::build_params(&args, &cfg, prompt)?;

    let broker = ChatBroker::new(ClientOptions {
        connect_timeout: cfg.connect_timeout(),
        ..ClientOptions::default()
    });
    let idle = cfg.session_idle_timeout();
    let reaper = broker.spawn_reaper(idle / 2, idle);

    let res = app::cmd_chat(&broker, &cfg, params).await;
    reaper.abort();
    res
}

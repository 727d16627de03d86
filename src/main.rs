//! MedAssist TUI 入口
//!
//! 初始化文件日志、装配 Agent 并启动编排任务，然后运行 TUI 主循环。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use medassist::config::load_config;
use medassist::{core::create_agent, observability, ui::run_app};

/// Conversational medical assistant (terminal UI)
#[derive(Debug, Parser)]
#[command(name = "medassist", version)]
struct Cli {
    /// Extra TOML config file layered over config/default.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = load_config(cli.config.clone())
        .ok()
        .and_then(|c| c.app.log_dir)
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _log_guard = observability::init_file(&log_dir).context("Failed to init logging")?;

    let (cmd_tx, state_rx) = create_agent(cli.config)
        .await
        .context("Failed to create agent")?;

    run_app(state_rx, cmd_tx).await.context("App run failed")?;
    Ok(())
}

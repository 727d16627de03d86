//! Agent 编排器：主控循环
//!
//! 后台任务独占 MedicalAgent，消费 UI 命令（Submit/Upload/Export/Clear/Cancel/Quit），
//! 查询进行中同时转发 ReactEvent 并响应取消，状态快照经 watch 通道推给 UI。
//! UI 展示的 transcript 包含被拒绝与取消的问题；对话记忆只由 Agent 维护。

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{build_agent, MedicalAgent, QueryOptions};
use crate::config::{load_config, AppConfig, Secrets};
use crate::core::{AgentPhase, QueryResult, UiState};
use crate::memory::Message;
use crate::react::ReactEvent;
use crate::services::ImageSource;

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 提交问题
    Submit(String),
    /// 上传影像（本地路径或 http(s) URL）
    Upload(String),
    /// 导出对话历史为 JSON
    Export(PathBuf),
    /// 清空对话
    Clear,
    /// 取消当前查询
    Cancel,
    Quit,
}

const BUSY_NOTICE: &str = "Busy: wait for the current answer or press Ctrl+C to cancel";

/// 加载配置与密钥、装配 Agent 并启动编排任务；返回命令发送端与状态接收端
pub async fn create_agent(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(mpsc::UnboundedSender<Command>, watch::Receiver<UiState>)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let secrets = Secrets::from_env();
    let agent = build_agent(&cfg, &secrets).context("Failed to build medical agent")?;
    let (cmd_tx, state_rx, _handle) = spawn_orchestrator(agent);
    Ok((cmd_tx, state_rx))
}

/// 在后台任务中运行编排循环
pub fn spawn_orchestrator(
    agent: MedicalAgent,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::default());
    let handle = tokio::spawn(run(agent, cmd_rx, state_tx));
    (cmd_tx, state_rx, handle)
}

async fn run(
    mut agent: MedicalAgent,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<UiState>,
) {
    let mut state = UiState {
        stats: agent.statistics().await,
        ..Default::default()
    };
    let _ = state_tx.send(state.clone());

    while let Some(cmd) = cmd_rx.recv().await {
        state.notice = None;
        state.error_message = None;
        match cmd {
            Command::Submit(input) => {
                let input = input.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                let quit = submit(&mut agent, &input, &mut cmd_rx, &state_tx, &mut state).await;
                if quit {
                    break;
                }
            }
            Command::Upload(src) => match agent.upload_image(ImageSource::parse(&src), None).await {
                Ok(meta) => {
                    state.notice = Some(format!(
                        "Image uploaded: {} {} {}",
                        meta.filename,
                        meta.size_label(),
                        meta.format
                    ));
                }
                Err(e) => {
                    tracing::error!(error = %e, "image upload failed");
                    state.error_message = Some(e.to_string());
                }
            },
            Command::Export(path) => match export_history(&agent, &path).await {
                Ok(()) => state.notice = Some(format!("History exported to {}", path.display())),
                Err(e) => state.error_message = Some(format!("Export failed: {:#}", e)),
            },
            Command::Clear => {
                agent.clear_conversation();
                agent.clear_images().await;
                state.history.clear();
                state.last_tool_counts.clear();
                state.notice = Some("Conversation cleared".to_string());
            }
            Command::Cancel => {}
            Command::Quit => break,
        }
        state.stats = agent.statistics().await;
        let _ = state_tx.send(state.clone());
    }
    tracing::info!("orchestrator stopped");
}

/// 执行一次查询；返回 true 表示查询期间收到 Quit（或命令通道关闭）
async fn submit(
    agent: &mut MedicalAgent,
    input: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    state_tx: &watch::Sender<UiState>,
    state: &mut UiState,
) -> bool {
    state.history.push(Message::user(input));
    state.phase = AgentPhase::Guarding;
    state.input_locked = true;
    state.step = 0;
    state.active_tool = None;
    let _ = state_tx.send(state.clone());

    let token = CancellationToken::new();
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<ReactEvent>();
    let opts = QueryOptions {
        skip_guard: false,
        event_tx: Some(ev_tx),
        cancel_token: Some(token.clone()),
    };

    let mut quit = false;
    let result = {
        let fut = agent.query_with(input, opts);
        tokio::pin!(fut);
        loop {
            tokio::select! {
                r = &mut fut => break r,
                Some(ev) = ev_rx.recv() => {
                    apply_event(state, ev);
                    let _ = state_tx.send(state.clone());
                }
                // 通道关闭后 recv 立即返回 None，quit 之后不再轮询
                cmd = cmd_rx.recv(), if !quit => match cmd {
                    Some(Command::Cancel) => token.cancel(),
                    Some(Command::Quit) | None => {
                        token.cancel();
                        quit = true;
                    }
                    Some(_) => {
                        state.notice = Some(BUSY_NOTICE.to_string());
                        let _ = state_tx.send(state.clone());
                    }
                },
            }
        }
    };

    record_result(state, result);
    state.stats = agent.statistics().await;
    let _ = state_tx.send(state.clone());
    quit
}

fn apply_event(state: &mut UiState, ev: ReactEvent) {
    match ev {
        ReactEvent::StepUpdate { step, .. } => {
            state.step = step;
            state.phase = AgentPhase::Thinking;
        }
        ReactEvent::Thinking => {
            state.phase = AgentPhase::Thinking;
            state.active_tool = None;
        }
        ReactEvent::ToolCall { tool, .. } => {
            state.phase = AgentPhase::ToolExecuting;
            state.active_tool = Some(tool);
        }
        ReactEvent::Observation { .. } => {
            state.phase = AgentPhase::Thinking;
            state.active_tool = None;
        }
        ReactEvent::ToolFailure { tool, reason } => {
            state.notice = Some(format!("{} failed: {}", tool, reason));
        }
        ReactEvent::Recovery { action, detail } => {
            state.notice = Some(format!("{}: {}", action, detail));
        }
        ReactEvent::Error { text } => {
            state.error_message = Some(text);
        }
    }
}

/// 查询结束后把回答写入 transcript 并复位阶段
fn record_result(state: &mut UiState, result: QueryResult) {
    state.input_locked = false;
    state.active_tool = None;
    state.last_tool_counts = result.tool_call_counts.clone();

    let cancelled = result.metadata.get("cancelled") == Some(&Value::Bool(true));
    if cancelled {
        state.phase = AgentPhase::Idle;
        state.history.push(Message::system("Query cancelled."));
        return;
    }

    let mut reply = Message::assistant(result.response).with_tools(result.tools_used);
    if result.rejected {
        reply
            .metadata
            .insert("rejected".to_string(), Value::Bool(true));
    }
    if let Some(err) = result.metadata.get("error") {
        reply.metadata.insert("error".to_string(), err.clone());
    }
    state.history.push(reply);

    if result.success || result.rejected {
        state.phase = AgentPhase::Idle;
    } else {
        state.phase = AgentPhase::Error;
        state.error_message = result
            .metadata
            .get("error")
            .and_then(Value::as_str)
            .map(String::from);
    }
}

async fn export_history(agent: &MedicalAgent, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&agent.export_history())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

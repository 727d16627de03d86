//! 事件处理
//!
//! 轮询 crossterm 键盘事件：Ctrl+C 取消、Ctrl+L 清空、Ctrl+Q 退出直接转为 Command 发送；
//! 其余按键交给 run_app 编辑输入缓冲。Enter 时由 parse_input 把斜杠命令转为 Command。

use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：来自快捷键的 Command 或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(Command),
    Key(KeyEvent),
}

/// 输入框一行内容的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Send(Command),
    /// 本地提示（命令用法错误等），不发给编排器
    Hint(String),
    Nothing,
}

/// 斜杠命令：/upload <path|url>、/export <file>、/clear、/quit；其余作为问题提交
pub fn parse_input(line: &str) -> InputAction {
    let line = line.trim();
    if line.is_empty() {
        return InputAction::Nothing;
    }
    if !line.starts_with('/') {
        return InputAction::Send(Command::Submit(line.to_string()));
    }
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };
    match cmd.to_lowercase().as_str() {
        "/upload" if !arg.is_empty() => InputAction::Send(Command::Upload(arg.to_string())),
        "/upload" => InputAction::Hint("Usage: /upload <path|url>".to_string()),
        "/export" if !arg.is_empty() => InputAction::Send(Command::Export(PathBuf::from(arg))),
        "/export" => InputAction::Hint("Usage: /export <file.json>".to_string()),
        "/clear" => InputAction::Send(Command::Clear),
        "/quit" | "/exit" => InputAction::Send(Command::Quit),
        other => InputAction::Hint(format!(
            "Unknown command {other}. Commands: /upload, /export, /clear, /quit"
        )),
    }
}

/// 事件处理器：持有 cmd_tx，poll 时读键盘并返回 AppEvent
pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self, timeout: Duration) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(self.handle_key(key)));
                }
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> AppEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let cmd = match key.code {
            KeyCode::Char('c') if ctrl => Command::Cancel,
            KeyCode::Char('l') if ctrl => Command::Clear,
            KeyCode::Char('q') if ctrl => Command::Quit,
            KeyCode::Esc => Command::Cancel,
            _ => return AppEvent::Key(key),
        };
        self.send(cmd.clone());
        AppEvent::Command(cmd)
    }

    pub fn send(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }
}

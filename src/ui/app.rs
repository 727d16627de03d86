//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询 state_rx 与键盘事件，把输入行解析为 Command 发送给编排器，
//! 每帧用 draw 渲染 UiState、输入缓冲与本地提示。

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::event::KeyCode;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{mpsc, watch};

use crate::core::{Command, UiState};
use crate::ui::event::{parse_input, AppEvent, EventHandler, InputAction};
use crate::ui::render::draw;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 运行 TUI：循环 poll 事件 + 渲染，退出时恢复终端并通知编排器
pub async fn run_app(
    state_rx: watch::Receiver<UiState>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, state_rx, EventHandler::new(cmd_tx)).await;

    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state_rx: watch::Receiver<UiState>,
    events: EventHandler,
) -> anyhow::Result<()> {
    let mut input_buffer = String::new();
    let mut local_hint: Option<String> = None;
    let mut conversation_scroll = 0usize;
    let mut last_history_len = 0usize;

    loop {
        let state = state_rx.borrow().clone();

        if state.history.len() != last_history_len {
            last_history_len = state.history.len();
            conversation_scroll = usize::MAX;
        }

        // crossterm 的 poll 是阻塞调用
        if let Some(ev) = tokio::task::block_in_place(|| events.poll(POLL_INTERVAL))? {
            match ev {
                AppEvent::Command(Command::Quit) => break,
                AppEvent::Command(_) => local_hint = None,
                AppEvent::Key(key) => match key.code {
                    KeyCode::Enter if !state.input_locked => {
                        local_hint = None;
                        match parse_input(&std::mem::take(&mut input_buffer)) {
                            InputAction::Send(Command::Quit) => {
                                events.send(Command::Quit);
                                break;
                            }
                            InputAction::Send(cmd) => events.send(cmd),
                            InputAction::Hint(h) => local_hint = Some(h),
                            InputAction::Nothing => {}
                        }
                    }
                    KeyCode::Backspace if !state.input_locked => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) if !state.input_locked => input_buffer.push(c),
                    KeyCode::Up => conversation_scroll = conversation_scroll.saturating_sub(1),
                    KeyCode::Down => conversation_scroll = conversation_scroll.saturating_add(1),
                    KeyCode::PageUp => conversation_scroll = conversation_scroll.saturating_sub(10),
                    KeyCode::PageDown => {
                        conversation_scroll = conversation_scroll.saturating_add(10)
                    }
                    KeyCode::Home => conversation_scroll = 0,
                    KeyCode::End => conversation_scroll = usize::MAX,
                    _ => {}
                },
            }
        }

        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| {
            draw(
                f,
                &state,
                &input_buffer,
                local_hint.as_deref(),
                conversation_scroll,
                &mut scroll_info,
            );
        })?;
        let (total_lines, viewport_height) = scroll_info;
        conversation_scroll = conversation_scroll.min(total_lines.saturating_sub(viewport_height));

        tokio::task::yield_now().await;
    }
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

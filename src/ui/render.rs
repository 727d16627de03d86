//! 界面渲染
//!
//! 左侧：标题栏显示 phase，主体为对话 transcript（按角色着色、按宽度换行），底部为输入框；
//! 右侧边栏：会话统计、待分析影像、最近一次查询的工具调用次数与命令帮助。

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{AgentPhase, UiState};
use crate::memory::{Message, Role};

const SIDEBAR_WIDTH: u16 = 34;
/// 单条消息显示的最大字符数（影像报告较长，超出后折叠）
const MAX_DISPLAY_CHARS: usize = 4000;

fn truncate_for_display(content: &str) -> String {
    let total = content.chars().count();
    if total <= MAX_DISPLAY_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(MAX_DISPLAY_CHARS).collect();
    format!("{}\n... [{} more characters, use /export for the full text]", head, total - MAX_DISPLAY_CHARS)
}

/// 按字符数换行（避免在 UTF-8 中间截断）
pub fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        let mut count = 0;
        for ch in para.chars() {
            if count >= width {
                lines.push(std::mem::take(&mut line));
                count = 0;
            }
            line.push(ch);
            count += 1;
        }
        lines.push(line);
    }
    lines
}

pub fn phase_label(state: &UiState) -> String {
    match &state.phase {
        AgentPhase::Idle => "Ready".to_string(),
        AgentPhase::Guarding => "Checking question…".to_string(),
        AgentPhase::Thinking => format!("Thinking (step {})…", state.step),
        AgentPhase::ToolExecuting => state
            .active_tool
            .as_deref()
            .map(|t| format!("Running {}…", t))
            .unwrap_or_else(|| "Running tool…".to_string()),
        AgentPhase::Error => "Error".to_string(),
    }
}

fn message_lines(m: &Message, width: usize) -> Vec<Line<'static>> {
    let rejected = m.metadata.contains_key("rejected");
    let (prefix, color) = match m.role {
        Role::User => ("You ", Color::Cyan),
        Role::Assistant if rejected => ("AI  ", Color::Yellow),
        Role::Assistant => ("AI  ", Color::Green),
        Role::System => ("Sys ", Color::Gray),
    };
    let mut lines: Vec<Line<'static>> = wrap_text(&truncate_for_display(&m.content), width)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let pref = if i == 0 { prefix } else { "    " };
            Line::from(vec![
                Span::styled(pref, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(line),
            ])
        })
        .collect();
    if m.role == Role::Assistant && !m.tools_used.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("    tools: {}", m.tools_used.join(", ")),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines
}

/// 绘制一帧；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    local_hint: Option<&str>,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(SIDEBAR_WIDTH)])
        .split(f.area());
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(5)])
        .split(columns[0]);

    let (total_lines, content_height) = draw_conversation(f, state, conversation_scroll, rows[0]);
    draw_input(f, state, input_buffer, rows[1]);
    draw_sidebar(f, state, local_hint, columns[1]);

    out.0 = total_lines;
    out.1 = content_height;
}

fn draw_conversation(f: &mut Frame, state: &UiState, scroll: usize, area: Rect) -> (usize, usize) {
    let block = Block::default()
        .title(format!(" MedAssist │ {} ", phase_label(state)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let content_width = area.width.saturating_sub(3).saturating_sub(4) as usize; // 边框 + 滚动条 + 前缀

    let mut text_lines: Vec<Line> = Vec::new();
    if state.history.is_empty() {
        text_lines.push(Line::from(Span::styled(
            "Ask a medical question, or /upload an image to analyze.",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for (idx, m) in state.history.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(""));
        }
        text_lines.extend(message_lines(m, content_width.max(20)));
    }

    let content_height = area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let scroll_offset = scroll.min(total_lines.saturating_sub(content_height));

    let inner = block.inner(area);
    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }
    (total_lines, content_height)
}

fn draw_input(f: &mut Frame, state: &UiState, input_buffer: &str, area: Rect) {
    let title = if let Some(err) = &state.error_message {
        format!(" Error: {} ", err.chars().take(60).collect::<String>())
    } else if state.input_locked {
        " Waiting for answer… (Ctrl+C to cancel) ".to_string()
    } else {
        " Question ".to_string()
    };
    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };
    let hint = " Enter send │ ↑↓ PgUp/PgDn scroll │ Ctrl+L clear │ Ctrl+Q quit ";
    let block = Block::default()
        .title(title)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));
    let input = Paragraph::new(input_buffer)
        .block(block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, area);
}

fn draw_sidebar(f: &mut Frame, state: &UiState, local_hint: Option<&str>, area: Rect) {
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(Span::styled("Session", label)),
        Line::from(format!(" {}", state.stats.memory_summary)),
        Line::from(format!(" Messages: {}", state.stats.total_messages)),
        Line::from(format!(
            " Pending image: {}",
            if state.stats.has_pending_image { "yes" } else { "no" }
        )),
        Line::from(format!(" Tokens: {}", state.stats.total_tokens)),
        Line::from(""),
        Line::from(Span::styled("Last query tools", label)),
    ];
    if state.last_tool_counts.is_empty() {
        lines.push(Line::from(Span::styled(" none", dim)));
    }
    for (tool, n) in &state.last_tool_counts {
        lines.push(Line::from(format!(" {} ×{}", tool, n)));
    }

    if let Some(notice) = local_hint.or(state.notice.as_deref()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Notice", label)));
        lines.push(Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Yellow),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Commands", label)));
    for help in [
        " /upload <path|url>",
        " /export <file.json>",
        " /clear",
        " /quit",
    ] {
        lines.push(Line::from(Span::styled(help, dim)));
    }

    let sidebar = Paragraph::new(Text::from(lines))
        .block(Block::default().title(" Status ").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(sidebar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_keeps_blank_lines_and_splits_on_chars() {
        assert_eq!(wrap_text("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap_text("肺炎肺炎肺", 2), vec!["肺炎", "肺炎", "肺"]);
    }

    #[test]
    fn test_phase_label() {
        let mut state = UiState {
            phase: AgentPhase::ToolExecuting,
            active_tool: Some("search_web_medical".into()),
            ..Default::default()
        };
        assert_eq!(phase_label(&state), "Running search_web_medical…");
        state.phase = AgentPhase::Thinking;
        state.step = 3;
        assert_eq!(phase_label(&state), "Thinking (step 3)…");
    }

    #[test]
    fn test_draw_on_test_backend() {
        use ratatui::{backend::TestBackend, Terminal};
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let mut state = UiState::default();
        state.history.push(Message::user("What is BMI?"));
        state.history.push(
            Message::assistant("Body mass index.").with_tools(vec!["calculate_medical_metric".into()]),
        );
        state.last_tool_counts.insert("calculate_medical_metric".into(), 1);
        let mut out = (0, 0);
        terminal
            .draw(|f| draw(f, &state, "next", None, 0, &mut out))
            .unwrap();
        assert_eq!(out.0, 4);
        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("What is BMI?"));
        assert!(text.contains("calculate_medical_metric ×1"));
    }
}

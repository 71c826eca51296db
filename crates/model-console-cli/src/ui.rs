//! UI rendering with ratatui.
//!
//! Two columns under a header bar: the resource panel on the left and the
//! assistant chat on the right. Dialogs are drawn on top.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Tabs, Wrap,
};
use ratatui::Frame;

use crate::app::{App, DeleteTarget, Focus, Form, InputMode, PickKind, Picker, ResourceTab, TextInput};
use crate::report::{format_size, Report};

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Main content (two columns)
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(main_layout[1]);

    render_resource_panel(frame, app, content_layout[0]);
    render_chat_column(frame, app, content_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    match &app.input_mode {
        InputMode::Normal => {}
        InputMode::Form(form) => render_form_dialog(frame, form, area),
        InputMode::ConfirmingDelete(target) => render_confirm_delete_dialog(frame, target, area),
        InputMode::Picking(picker) => render_picker_dialog(frame, picker, area),
        InputMode::Report { report, scroll } => render_report_dialog(frame, report, *scroll, area),
    }
}

/// Truncate a string in the middle with ellipsis if it exceeds `max_len` chars.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

/// Render the header bar with the title and backend status.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (status_text, status_style) = match app.backend_healthy {
        Some(true) => ("在线", Style::default().fg(Color::Green)),
        Some(false) => ("离线", Style::default().fg(Color::Red)),
        None => ("检查中", Style::default().fg(Color::Yellow)),
    };

    let title = Line::from(Span::styled(
        "联邦房价预测 控制台",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ));
    let max_url_width = (area.width as usize / 2).saturating_sub(10);
    let display_url = truncate_middle(app.api_url(), max_url_width);
    let right = Line::from(vec![
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(status_text, status_style),
        Span::raw("]"),
    ]);

    let padding = (area.width as usize).saturating_sub(title.width() + right.width());
    let mut spans = title.spans;
    spans.push(Span::raw(" ".repeat(padding)));
    spans.extend(right.spans);

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn focus_style(is_focused: bool) -> Style {
    if is_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Gray)
    }
}

/// Render the tabbed resource panel.
fn render_resource_panel(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Resources;

    let block = Block::default()
        .title(" 资源 ")
        .borders(Borders::ALL)
        .border_style(focus_style(is_focused));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let titles: Vec<String> = ResourceTab::ALL
        .iter()
        .map(|tab| {
            let count = match tab {
                ResourceTab::DataFiles => app.datafiles.len(),
                ResourceTab::Models => app.models.len(),
                ResourceTab::Clients => app.clients.len(),
            };
            format!("{} ({count})", tab.title())
        })
        .collect();
    let selected_tab = ResourceTab::ALL.iter().position(|t| *t == app.tab).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected_tab)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .divider("|");
    frame.render_widget(tabs, layout[0]);

    let (items, selected): (Vec<ListItem>, Option<usize>) = match app.tab {
        ResourceTab::DataFiles => (
            app.datafiles
                .iter()
                .map(|f| {
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("#{} ", f.id), Style::default().fg(Color::DarkGray)),
                        Span::raw(&f.filename),
                        Span::styled(
                            format!("  {}", format_size(f.file_size)),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]))
                })
                .collect(),
            app.selected_datafile,
        ),
        ResourceTab::Models => (
            app.models
                .iter()
                .map(|m| {
                    let detail = format!(
                        "  {} n={}",
                        m.model_type.as_deref().unwrap_or("-"),
                        m.data_count.map_or_else(|| "-".to_string(), |c| c.to_string())
                    );
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("#{} ", m.id), Style::default().fg(Color::DarkGray)),
                        Span::raw(&m.model_name),
                        Span::styled(detail, Style::default().fg(Color::DarkGray)),
                    ]))
                })
                .collect(),
            app.selected_model,
        ),
        ResourceTab::Clients => (
            app.clients
                .iter()
                .map(|c| {
                    let mark = if app.marked_clients.contains(&c.id) { "[x] " } else { "[ ] " };
                    let binding = |id: Option<u64>| id.map_or_else(|| "-".to_string(), |id| format!("#{id}"));
                    let bound_style = if c.datafile_id.is_some() && c.model_id.is_some() {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    ListItem::new(Line::from(vec![
                        Span::styled(mark, Style::default().fg(Color::Yellow)),
                        Span::styled(format!("#{} ", c.id), Style::default().fg(Color::DarkGray)),
                        Span::raw(&c.name),
                        Span::styled(
                            format!("  数据 {} 模型 {}", binding(c.datafile_id), binding(c.model_id)),
                            bound_style,
                        ),
                    ]))
                })
                .collect(),
            app.selected_client,
        ),
    };

    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(selected);
    frame.render_stateful_widget(list, layout[1], &mut state);
}

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 1;

/// Render the right column containing chat and input as one unit.
fn render_chat_column(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Chat;

    let mut title = format!(" 智能助手 [{}] ", app.chat_mode);
    if app.unread > 0 {
        title.push_str(&format!("({} 条新回复) ", app.unread));
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(focus_style(is_focused));

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Chat messages
            Constraint::Length(1), // Separator line
            Constraint::Length(1), // Input line
        ])
        .split(inner_area);

    let chat_area_full = inner_layout[0];
    let chat_area = Rect::new(
        chat_area_full.x + CHAT_PADDING,
        chat_area_full.y,
        chat_area_full.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        chat_area_full.height,
    );
    let content_width = chat_area.width as usize;

    if app.transcript.is_empty() {
        let help = Paragraph::new("按 i 进入对话，输入问题后回车发送")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(help, chat_area);
    } else {
        let text = Text::from(chat_lines(app));
        let visible_lines = chat_area.height as usize;
        let total_wrapped_lines = calculate_wrapped_line_count(&text, content_width);

        // chat_scroll counts lines up from the bottom.
        let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
        let effective_scroll = app.chat_scroll.min(max_scroll);
        let scroll_offset = max_scroll.saturating_sub(effective_scroll);

        let paragraph = Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0));
        frame.render_widget(paragraph, chat_area);

        if total_wrapped_lines > visible_lines {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));
            let mut scrollbar_state = ScrollbarState::new(total_wrapped_lines)
                .position(scroll_offset)
                .viewport_content_length(visible_lines);
            frame.render_stateful_widget(scrollbar, chat_area_full, &mut scrollbar_state);
        }
    }

    render_input_line(frame, app, inner_layout[1], inner_layout[2], is_focused);
}

/// Transcript as styled lines.
fn chat_lines(app: &App) -> Vec<Line<'_>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in app.transcript.messages() {
        let time = msg.timestamp.format("%H:%M:%S").to_string();
        let (label, color) = if msg.is_user() {
            ("[你]", Color::Cyan)
        } else {
            ("[助手]", Color::Green)
        };
        lines.push(Line::from(vec![
            Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {time}"), Style::default().fg(Color::DarkGray)),
        ]));

        if msg.is_streaming && msg.content.is_empty() {
            lines.push(Line::from(vec![
                Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
                Span::styled(" 思考中...", Style::default().fg(Color::DarkGray)),
            ]));
        } else {
            lines.extend(msg.content.lines().map(|l| Line::from(Span::raw(l))));
            if msg.is_streaming {
                lines.push(Line::from(Span::styled(
                    app.spinner_char(),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        lines.push(Line::from(""));
    }

    // Non-streaming exchanges have no placeholder message.
    if app.is_sending() && app.transcript.in_progress().is_none() {
        lines.push(Line::from(vec![
            Span::styled("[助手]", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        ]));
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" 等待回复...", Style::default().fg(Color::DarkGray)),
        ]));
    }

    lines
}

/// Display width of the text before the cursor.
fn cursor_offset(input: &TextInput) -> u16 {
    let before: String = input.value().chars().take(input.cursor()).collect();
    u16::try_from(Span::raw(before).width()).unwrap_or(u16::MAX)
}

/// Render the input line at the bottom of the chat column.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect, is_focused: bool) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    let prompt = if is_focused { "> " } else { "│ " };
    let input_line = Line::from(vec![
        Span::styled(prompt, Style::default().fg(if is_focused { Color::Cyan } else { Color::DarkGray })),
        Span::styled(app.input.value(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    if is_focused && app.input_mode == InputMode::Normal {
        frame.set_cursor_position((input_area.x + 2 + cursor_offset(&app.input), input_area.y));
    }
}

fn key_hint<'a>(key: &'a str, action: &'a str) -> [Span<'a>; 2] {
    [
        Span::styled(key, Style::default().fg(Color::Yellow)),
        Span::raw(action),
    ]
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = if app.focus == Focus::Chat {
        Span::styled(" 对话 ", Style::default().fg(Color::Black).bg(Color::Green))
    } else {
        Span::styled(" 资源 ", Style::default().fg(Color::Black).bg(Color::Magenta))
    };

    let mut spans = vec![mode_indicator];
    if app.is_sending() {
        spans.push(Span::styled(
            format!(" {} 发送中", app.spinner_char()),
            Style::default().fg(Color::Yellow),
        ));
    }

    if let Some(ref error) = app.error_message {
        spans.push(Span::styled(" 错误: ", Style::default().fg(Color::Red).bold()));
        spans.push(Span::styled(error, Style::default().fg(Color::Red)));
    } else if let Some(ref refresh_error) = app.refresh_error {
        spans.push(Span::styled(" ⚠ ", Style::default().fg(Color::Yellow).bold()));
        spans.push(Span::styled(refresh_error, Style::default().fg(Color::Yellow)));
    } else if let Some(ref status) = app.status_message {
        spans.push(Span::styled(format!(" {status}"), Style::default().fg(Color::Green)));
    } else if app.focus == Focus::Chat {
        spans.push(Span::raw(" "));
        spans.extend(key_hint("Enter", ":发送 "));
        spans.extend(key_hint("PgUp/PgDn", ":滚动 "));
        spans.extend(key_hint("Esc", ":返回"));
    } else {
        spans.push(Span::raw(" "));
        spans.extend(key_hint("Tab", ":切换 "));
        spans.extend(key_hint("u", ":上传 "));
        spans.extend(key_hint("n", ":新建 "));
        spans.extend(key_hint("d", ":删除 "));
        spans.extend(key_hint("Enter", ":详情 "));
        spans.extend(key_hint("h", ":助手 "));
        spans.extend(key_hint("o", ":模式 "));
        spans.extend(key_hint("i", ":对话 "));
        spans.extend(key_hint("q", ":退出"));
    }

    let status_bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Render a form dialog.
fn render_form_dialog(frame: &mut Frame, form: &Form, area: Rect) {
    let labels = form.kind.labels();
    let rows = u16::try_from(labels.len()).unwrap_or(u16::MAX);
    let dialog_width = 64.min(area.width.saturating_sub(4));
    let dialog_height = (rows * 3 + 3).min(area.height.saturating_sub(2));

    let dialog_area = Rect::new(
        area.x + (area.width.saturating_sub(dialog_width)) / 2,
        area.y + (area.height.saturating_sub(dialog_height)) / 2,
        dialog_width,
        dialog_height,
    );
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(format!(" {} ", form.kind.title()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let mut constraints = vec![Constraint::Length(3); labels.len()];
    constraints.push(Constraint::Length(1));
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (i, (label, input)) in labels.iter().zip(&form.fields).enumerate() {
        let active = i == form.active;
        let field_block = Block::default()
            .title(format!(" {label} "))
            .borders(Borders::ALL)
            .border_style(if active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::DarkGray)
            });
        let field = Paragraph::new(input.value())
            .style(Style::default().fg(Color::White))
            .block(field_block);
        frame.render_widget(field, layout[i]);

        if active {
            frame.set_cursor_position((layout[i].x + 1 + cursor_offset(input), layout[i].y + 1));
        }
    }

    let help = Paragraph::new("Tab/↑↓ 切换字段, Enter 提交, Esc 取消")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, layout[labels.len()]);
}

/// Render the confirm delete dialog.
fn render_confirm_delete_dialog(frame: &mut Frame, target: &DeleteTarget, area: Rect) {
    let dialog_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" 确认删除 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let text = Text::from(vec![
        Line::from(format!("删除{}?", target.describe())),
        Line::from(""),
        Line::from("此操作无法撤销。"),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Red).bold()),
            Span::raw(" 是  "),
            Span::styled("[n]", Style::default().fg(Color::Green).bold()),
            Span::raw(" 否"),
        ]),
    ]);

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);
}

/// Render the bind picker.
fn render_picker_dialog(frame: &mut Frame, picker: &Picker, area: Rect) {
    let dialog_area = centered_rect(50, 50, area);
    frame.render_widget(Clear, dialog_area);

    let title = match picker.kind {
        PickKind::DataFile => " 绑定数据文件 ",
        PickKind::Model => " 绑定模型 ",
    };
    let block = Block::default()
        .title(title)
        .title_bottom(" Enter 绑定, Esc 取消 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let items: Vec<ListItem> = picker
        .options
        .iter()
        .map(|(_, label)| ListItem::new(label.as_str()))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(picker.selected));
    frame.render_stateful_widget(list, dialog_area, &mut state);
}

/// Render a report popup.
fn render_report_dialog(frame: &mut Frame, report: &Report, scroll: usize, area: Rect) {
    let dialog_area = centered_rect(80, 80, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(format!(" {} ", report.title))
        .title_bottom(" ↑↓ 滚动, Esc 关闭 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let lines: Vec<Line> = report.lines.iter().map(|l| Line::from(l.as_str())).collect();
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, dialog_area);
}

/// Calculate the number of visual lines after text wrapping.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum()
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_middle_counts_chars() {
        assert_eq!(truncate_middle("short", 10), "short");
        assert_eq!(truncate_middle("http://example.com:5000", 11), "http...5000");
        assert_eq!(truncate_middle("联邦学习房价预测", 4), "联邦学习");
    }

    #[test]
    fn wrapped_line_count() {
        let text = Text::from(vec![Line::from("abcdef"), Line::from(""), Line::from("ab")]);
        assert_eq!(calculate_wrapped_line_count(&text, 4), 4);
        assert_eq!(calculate_wrapped_line_count(&text, 0), 3);
    }

    #[test]
    fn cursor_offset_uses_display_width() {
        let mut input = TextInput::new("房价ab");
        input.move_cursor_left();
        assert_eq!(cursor_offset(&input), 5);
    }
}

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::session::{Message, Role, Session};

/// Turn `**bold**` runs into bold spans; everything else is literal
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if end == 0 {
            // "****" is not a bold run
            spans.push(Span::raw(rest[..start + 4].to_string()));
            rest = &after[2..];
            continue;
        }
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..end].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);
    render_launcher(app, frame, body_area);
    render_footer(app, frame, footer_area);

    if app.is_panel_open() {
        let panel_area = if app.fullscreen {
            body_area
        } else {
            popup_area(body_area)
        };
        render_chat_panel(app, frame, panel_area);
    }
}

/// Bottom-right corner, where the launcher orb sits
fn popup_area(area: Rect) -> Rect {
    let width = (area.width * 3 / 5).max(40).min(area.width);
    let height = (area.height * 4 / 5).max(12).min(area.height);
    Rect {
        x: area.x + area.width - width,
        y: area.y + area.height - height,
        width,
        height,
    }
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" SinhgadConnect ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_launcher(app: &App, frame: &mut Frame, area: Rect) {
    let orb_color = if app.is_panel_open() { Color::Magenta } else { Color::Cyan };
    let lines = vec![
        Line::default(),
        Line::from(Span::styled("◉", Style::default().fg(orb_color).bold())),
        Line::default(),
        Line::from("Campus assistant"),
        Line::from(Span::styled(
            "Press 'a' to ask about placements, events, and community posts",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let launcher = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(launcher, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match (app.is_panel_open(), app.input_mode) {
        (_, InputMode::Editing) => (" TYPE ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        (true, InputMode::Normal) => (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
        (false, InputMode::Normal) => (" HOME ", Style::default().bg(Color::Blue).fg(Color::White)),
    };

    let hints = match (app.is_panel_open(), app.input_mode) {
        (_, InputMode::Editing) => " Enter send  Esc stop typing  Ctrl-C quit",
        (true, InputMode::Normal) => " i type  f fullscreen  j/k scroll  Esc close",
        (false, InputMode::Normal) => " a open assistant  q quit",
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn render_chat_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let Some(session) = app.session.as_ref() else {
        return;
    };

    frame.render_widget(Clear, area);

    let bottom_hint = if app.fullscreen { " f: window " } else { " f: fullscreen " };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" SinhgadConnect Assistant ")
        .title_bottom(Line::from(bottom_hint).right_aligned());

    let chat = transcript_paragraph(session, &app.web_base_url, app.animation_frame)
        .block(chat_block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, session, frame, input_area);
}

/// Wrapped transcript without borders. Scroll limits are measured on this
/// same paragraph so they match what gets drawn.
pub fn transcript_paragraph(
    session: &Session,
    web_base_url: &str,
    animation_frame: u8,
) -> Paragraph<'static> {
    Paragraph::new(transcript_lines(session, web_base_url, animation_frame))
        .wrap(Wrap { trim: false })
}

fn transcript_lines(session: &Session, web_base_url: &str, animation_frame: u8) -> Text<'static> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in session.transcript() {
        lines.push(role_line(msg));
        if msg.content.is_empty() {
            lines.push(Line::default());
        }
        for line in msg.content.lines() {
            lines.push(parse_markdown_line(line));
        }

        if msg.role == Role::Assistant && !msg.sources.is_empty() {
            lines.push(Line::from(Span::styled(
                "Sources:",
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            )));
            for source in &msg.sources {
                let mut spans = vec![Span::raw(format!("  • {}", source.display_title()))];
                if let Some(url) = source.post_url(web_base_url) {
                    spans.push(Span::styled(
                        format!(" ({})", url),
                        Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                    ));
                }
                lines.push(Line::from(spans));
            }
        }
        lines.push(Line::default());
    }

    if session.is_awaiting_response() {
        lines.push(Line::from(Span::styled(
            "Assistant:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize % 3) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    Text::from(lines)
}

fn role_line(msg: &Message) -> Line<'static> {
    match msg.role {
        Role::User => Line::from(Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Role::Assistant => {
            let mut spans = vec![Span::styled(
                "Assistant:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )];
            if let Some(mode) = msg.mode {
                spans.push(Span::styled(
                    format!(" [{}]", mode.label()),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Line::from(spans)
        }
    }
}

fn render_input(app: &App, session: &Session, frame: &mut Frame, area: Rect) {
    let busy = session.is_awaiting_response();
    let editing = app.input_mode == InputMode::Editing;

    let (title, border_color) = if busy {
        (" Waiting for reply... ", Color::DarkGray)
    } else if editing {
        (" Ask (Enter to send) ", Color::Yellow)
    } else {
        (" Ask (i to type) ", Color::DarkGray)
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = session.cursor();
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = session
        .pending_input()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_style = if busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let input = Paragraph::new(visible_text).style(text_style).block(input_block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantClient;
    use ratatui::{backend::TestBackend, Terminal};

    fn screen_text(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();

        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        let mut text = String::new();
        for (i, cell) in buffer.content.iter().enumerate() {
            text.push_str(cell.symbol());
            if (i + 1) % width == 0 {
                text.push('\n');
            }
        }
        text
    }

    fn test_app() -> App {
        App::new(AssistantClient::new("http://127.0.0.1:1/api/chat"), "http://localhost:5173")
    }

    #[test]
    fn test_parse_markdown_line_bold() {
        let line = parse_markdown_line("see **this** now");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "this");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_line_unclosed() {
        let line = parse_markdown_line("a **b");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "a **b");
    }

    #[test]
    fn test_launcher_without_panel() {
        let mut app = test_app();
        let screen = screen_text(&mut app, 100, 30);
        assert!(screen.contains("Press 'a'"));
        assert!(!screen.contains("SinhgadConnect Assistant"));
    }

    #[test]
    fn test_panel_shows_greeting_sources_and_busy_state() {
        let mut app = test_app();
        app.open_panel();
        app.fullscreen = true;

        let session = app.session.as_mut().unwrap();
        session.begin("placement tips").unwrap();
        session.resolve(Ok(serde_json::from_value(serde_json::json!({
            "success": true,
            "answer": "Here are tips",
            "sources": [{ "id": "42", "title": "Placement mega-thread" }],
            "mode": "community"
        }))
        .unwrap()));
        session.begin("more").unwrap();

        let screen = screen_text(&mut app, 120, 40);
        assert!(screen.contains("SinhgadConnect Assistant"));
        assert!(screen.contains("Hi! I'm the SinhgadConnect assistant"));
        assert!(screen.contains("[Community]"));
        assert!(screen.contains("Placement mega-thread"));
        assert!(screen.contains("http://localhost:5173/post/42"));
        assert!(screen.contains("Thinking."));
        assert!(screen.contains("Waiting for reply..."));
    }

    #[test]
    fn test_scroll_to_bottom_shows_end_of_word_wrapped_reply() {
        let mut app = test_app();
        app.open_panel();
        app.fullscreen = true;
        // First draw records the panel size used for scrolling
        screen_text(&mut app, 22, 14);

        let answer = format!("{} ZZZEND", vec!["lecture"; 40].join(" "));
        let session = app.session.as_mut().unwrap();
        session.begin("notes?").unwrap();
        session.resolve(Ok(serde_json::from_value(serde_json::json!({
            "success": true,
            "answer": answer
        }))
        .unwrap()));

        app.scroll_chat_to_bottom();
        assert!(screen_text(&mut app, 22, 14).contains("ZZZEND"));

        app.chat_scroll = 0;
        for _ in 0..50 {
            app.scroll_down(3);
        }
        assert!(screen_text(&mut app, 22, 14).contains("ZZZEND"));
    }

    #[test]
    fn test_popup_fits_small_terminal() {
        let area = Rect::new(0, 1, 30, 8);
        let popup = popup_area(area);
        assert!(popup.width <= area.width && popup.height <= area.height);
        assert_eq!(popup.right(), area.right());
        assert_eq!(popup.bottom(), area.bottom());
    }
}

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use milo_core::{ChatRole, Mode, PlaybackState};

use crate::app::{App, InputMode, Screen};

/// Render `**bold**` runs; everything else is literal.
fn styled_reply_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // An unmatched ** leaves an even number of parts; keep it literal
    if parts.len() % 2 == 0 {
        return Line::from(text.to_string());
    }
    let spans: Vec<Span<'static>> = parts
        .into_iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            if i % 2 == 1 {
                Span::styled(part.to_string(), Style::default().add_modifier(Modifier::BOLD))
            } else {
                Span::raw(part.to_string())
            }
        })
        .collect();
    Line::from(spans)
}

fn mode_color(mode: Mode) -> Color {
    match mode {
        Mode::Sweet => Color::LightMagenta,
        Mode::Savage => Color::LightRed,
        Mode::Nerdy => Color::LightCyan,
    }
}

fn speech_indicator(state: PlaybackState, frame: u8) -> &'static str {
    match state {
        PlaybackState::Idle => "[s] listen",
        PlaybackState::Loading => match frame {
            0 => "loading.",
            1 => "loading..",
            _ => "loading...",
        },
        PlaybackState::Playing => "[s] stop",
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::ModeSelect => render_mode_select(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        " Ask Milo ",
        Style::default().fg(Color::Cyan).bold(),
    )];
    if let Some(mode) = app.mode() {
        spans.push(Span::styled(
            format!("{} {} ", mode.display_name(), mode.badge()),
            Style::default().fg(mode_color(mode)).bold(),
        ));
    }
    if let Some(session) = &app.session {
        spans.push(Span::styled(
            format!("[{}] ", session.model_name()),
            Style::default().fg(Color::Gray),
        ));
    }
    if app.has_voice_key() {
        spans.push(Span::styled("[voice] ", Style::default().fg(Color::Gray)));
    }
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    if let Some(status) = &app.status {
        let line = Line::from(Span::styled(format!(" {} ", status), Style::default().fg(Color::Yellow)));
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let hint = |k: &'static str, label: &'static str| {
        [Span::styled(format!(" {} ", k), key_style), Span::styled(format!(" {} ", label), label_style)]
    };

    let hints: Vec<Span> = if app.show_api_key_input {
        [hint("Enter", "save"), hint("Esc", "cancel")].concat()
    } else {
        match (app.screen, app.input_mode) {
            (Screen::ModeSelect, _) => [
                hint("j/k", "nav"),
                hint("Enter", "choose"),
                hint("1-3", "quick pick"),
                hint("K", "Gemini key"),
                hint("V", "voice key"),
                hint("q", "quit"),
            ]
            .concat(),
            (Screen::Chat, InputMode::Editing) => {
                [hint("Enter", "ask"), hint("Esc", "done typing")].concat()
            }
            (Screen::Chat, InputMode::Normal) => [
                hint("i", "type"),
                hint("s", "speak"),
                hint("Tab", "next reply"),
                hint("j/k", "scroll"),
                hint("c", "clear"),
                hint("m", "modes"),
                hint("K/V", "keys"),
                hint("q", "quit"),
            ]
            .concat(),
        }
    };

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_mode_select(app: &mut App, frame: &mut Frame, area: Rect) {
    let [intro_area, list_area] = Layout::vertical([Constraint::Length(4), Constraint::Min(0)])
        .areas(area);

    let key_note = if app.has_gemini_key() {
        "Answers come from Gemini."
    } else {
        "No Gemini key set: Milo will answer offline. Press K to add one."
    };
    let intro = Paragraph::new(vec![
        Line::from(Span::styled("Hi! I'm Milo, your AI tutor.", Style::default().bold())),
        Line::from("Pick how you'd like me to teach you."),
        Line::from(Span::styled(key_note, Style::default().fg(Color::DarkGray))),
    ]);
    frame.render_widget(intro, intro_area);

    let items: Vec<ListItem> = Mode::all()
        .into_iter()
        .enumerate()
        .map(|(i, mode)| {
            ListItem::new(vec![
                Line::from(vec![
                    Span::raw(format!(" {}. ", i + 1)),
                    Span::styled(
                        format!("{} {}", mode.display_name(), mode.badge()),
                        Style::default().fg(mode_color(mode)).add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(Span::styled(
                    format!("    {}", mode.description()),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Choose a mode "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.mode_state);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([Constraint::Min(0), Constraint::Length(3)])
        .areas(area);

    // Inner size minus borders, for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let Some(mode) = app.mode() else {
        return;
    };
    let history = app.history();
    let loading = app.is_loading();

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(mode_color(mode)))
        .title(format!(" {} mode ", mode.display_name()));

    let chat_text = if history.is_empty() && !loading {
        Text::from(Span::styled(
            "Ask me anything! What are you curious about today?",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let mut reply_idx = 0;

        for msg in &history {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.as_str()));
                }
                ChatRole::Assistant => {
                    let selected = app.selected_reply == Some(reply_idx);
                    let mut label_style = Style::default().fg(mode_color(mode)).add_modifier(Modifier::BOLD);
                    if selected {
                        label_style = label_style.add_modifier(Modifier::REVERSED);
                    }
                    let state = app.speech_state(reply_idx);
                    lines.push(Line::from(vec![
                        Span::styled(format!("Milo {}:", mode.badge()), label_style),
                        Span::raw(" "),
                        Span::styled(
                            speech_indicator(state, app.animation_frame),
                            Style::default().fg(if selected { Color::Yellow } else { Color::DarkGray }),
                        ),
                    ]));
                    for line in msg.content.lines() {
                        lines.push(styled_reply_line(line));
                    }
                    reply_idx += 1;
                }
            }
            lines.push(Line::default());
        }

        if loading && history.last().map(|m| m.role) != Some(ChatRole::Assistant) {
            lines.push(Line::from(Span::styled(
                format!("Milo {}:", mode.badge()),
                Style::default().fg(mode_color(mode)).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(if loading { " Milo is thinking... " } else { " Ask Milo " });

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };
    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    if editing && !app.show_api_key_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

/// Show only the last four characters of a secret.
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let last_four: String = key.chars().skip(len - 4).collect();
    format!("{}...{}", "*".repeat((len - 4).min(20)), last_four)
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let provider_name = app
        .api_key_target
        .map(|t| t.display_name())
        .unwrap_or("Provider");

    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} API key ", provider_name));
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your key. Enter saves it to your config, Esc cancels.")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 2));

    let input_area = Rect::new(inner.x, inner.y + 3, inner.width, 1);
    frame.render_widget(
        Paragraph::new(mask_key(&app.api_key_input)).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    // The mask can be shorter than the input, so the cursor sits at its end
    let cursor_x = mask_key(&app.api_key_input)
        .chars()
        .count()
        .min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

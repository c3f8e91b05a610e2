use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use milo_core::Mode;

use crate::app::{App, InputMode, KeyTarget, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text editing shared by the question box and the key dialog.
/// Returns false when the key isn't an editing key.
fn edit_line(input: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(input.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(input, *cursor);
            input.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.on_tick(),
        AppEvent::Answered(outcome) => app.on_answered(outcome),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match (app.screen, app.input_mode) {
        (Screen::ModeSelect, _) => handle_mode_select(app, key),
        (Screen::Chat, InputMode::Normal) => handle_chat_normal(app, key),
        (Screen::Chat, InputMode::Editing) => handle_chat_editing(app, key),
    }
}

fn handle_mode_select(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.mode_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.mode_nav_up(),
        KeyCode::Enter => app.start_chat(app.selected_mode()),
        KeyCode::Char(c @ '1'..='3') => {
            let idx = (c as usize) - ('1' as usize);
            if let Some(mode) = Mode::all().get(idx).copied() {
                app.start_chat(mode);
            }
        }
        KeyCode::Char('K') => app.open_key_input(KeyTarget::Gemini),
        KeyCode::Char('V') => app.open_key_input(KeyTarget::ElevenLabs),
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Esc | KeyCode::Char('m') => app.back_to_modes(),
        KeyCode::Char('c') => app.clear_chat(),

        // Speech
        KeyCode::Char('s') | KeyCode::Char(' ') => app.toggle_speech(),
        KeyCode::Tab | KeyCode::Char('n') => app.select_next_reply(),
        KeyCode::BackTab | KeyCode::Char('p') => app.select_prev_reply(),

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down()
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up()
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),

        KeyCode::Char('K') => app.open_key_input(KeyTarget::Gemini),
        KeyCode::Char('V') => app.open_key_input(KeyTarget::ElevenLabs),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_query(),
        _ => {
            edit_line(&mut app.query_input, &mut app.query_cursor, key);
        }
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_key_input(),
        KeyCode::Enter => app.save_key_input(),
        _ => {
            edit_line(&mut app.api_key_input, &mut app.api_key_input_cursor, key);
        }
    }
}

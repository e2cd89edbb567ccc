use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

const SCROLL_STEP: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal if app.is_panel_open() => handle_panel_normal(app, key),
        InputMode::Normal => handle_launcher(app, key),
        InputMode::Editing => handle_editing(app, key),
    }
}

fn handle_launcher(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('a') | KeyCode::Enter => {
            app.open_panel();
            app.input_mode = InputMode::Editing;
        }
        _ => {}
    }
}

fn handle_panel_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.close_panel(),
        KeyCode::Char('i') | KeyCode::Char('/') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('f') => app.toggle_fullscreen(),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(1)),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1)),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_editing(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }
    if key.code == KeyCode::Enter {
        // Ignored while a reply is pending; the text stays in the box
        app.submit_pending();
        return;
    }

    let Some(session) = app.session.as_mut() else {
        app.input_mode = InputMode::Normal;
        return;
    };
    match key.code {
        KeyCode::Backspace => session.backspace(),
        KeyCode::Delete => session.delete(),
        KeyCode::Left => session.move_left(),
        KeyCode::Right => session.move_right(),
        KeyCode::Home => session.move_home(),
        KeyCode::End => session.move_end(),
        // Other Ctrl/Alt chords are not text
        KeyCode::Char(c) if is_text_input(key.modifiers) => session.insert_char(c),
        _ => {}
    }
}

fn is_text_input(modifiers: KeyModifiers) -> bool {
    modifiers.difference(KeyModifiers::SHIFT).is_empty()
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if !app.is_panel_open() {
        return;
    }
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(SCROLL_STEP),
        MouseEventKind::ScrollUp => app.scroll_up(SCROLL_STEP),
        _ => {}
    }
}

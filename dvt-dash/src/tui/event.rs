//! Keyboard handling for the dashboard.
//!
//! Maps crossterm key events to dashboard actions. Text fields in the Config
//! panel switch to input mode, where printable keys are typed instead.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Keyboard action from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    NextPanel,
    PrevPanel,
    /// Launch on the Launch panel, expand on History, edit on Config.
    Select,
    /// Leave an overlay or input mode.
    Back,
    Refresh,
    /// Reopen the live channel.
    Reconnect,
    Help,
    TextInput(char),
    DeleteChar,
    /// Key with no binding, or a resize.
    Tick,
}

/// Convert key event to action (normal mode).
fn handle_key(key: KeyEvent) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Action::Quit;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Up | KeyCode::Char('k') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') => Action::Down,
        KeyCode::Tab => Action::NextPanel,
        KeyCode::BackTab => Action::PrevPanel,
        KeyCode::Enter => Action::Select,
        KeyCode::Backspace => Action::Back,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('c') => Action::Reconnect,
        KeyCode::Char('?') | KeyCode::F(1) => Action::Help,
        _ => Action::Tick,
    }
}

/// Convert key event to action while a text field is being edited.
fn handle_key_input_mode(key: KeyEvent) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Action::Quit;
    }

    match key.code {
        KeyCode::Esc => Action::Back,
        KeyCode::Enter => Action::Select,
        KeyCode::Backspace => Action::DeleteChar,
        KeyCode::Char(c) => Action::TextInput(c),
        _ => Action::Tick,
    }
}

/// Map a terminal event to an action. Key releases and mouse events are
/// ignored.
pub fn action_for_event(event: &Event, input_mode: bool) -> Option<Action> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(if input_mode {
            handle_key_input_mode(*key)
        } else {
            handle_key(*key)
        }),
        Event::Resize(_, _) => Some(Action::Tick),
        _ => None,
    }
}

//! TUI test harness utilities.
//!
//! Renders widgets into ratatui's `TestBackend` so panels can be checked
//! without a real terminal.
//!
//! ```ignore
//! let content = render_to_string(80, 24, |f| widgets::render(f, &app));
//! assert_rendered_contains(&content, "DVT Compatibility Dashboard");
//! ```

use ratatui::{Frame, Terminal, backend::TestBackend, buffer::Buffer};
use tracing::debug;

/// Convert a ratatui buffer to text, one line per row.
pub fn buffer_to_string(buffer: &Buffer) -> String {
    let area = buffer.area;
    let mut out = String::new();
    for y in area.top()..area.bottom() {
        for x in area.left()..area.right() {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    out
}

/// Render with `draw` into a `width` x `height` test terminal.
pub fn render_to_string<F>(width: u16, height: u16, draw: F) -> String
where
    F: FnOnce(&mut Frame),
{
    debug!("TEST HARNESS: render_to_string {}x{}", width, height);
    let mut terminal =
        Terminal::new(TestBackend::new(width, height)).expect("test terminal creation");
    terminal.draw(draw).expect("test draw");
    buffer_to_string(terminal.backend().buffer())
}

pub fn assert_rendered_contains(content: &str, needle: &str) {
    assert!(
        content.contains(needle),
        "expected rendered output to contain {needle:?}\n---\n{content}---"
    );
}

pub fn assert_rendered_not_contains(content: &str, needle: &str) {
    assert!(
        !content.contains(needle),
        "expected rendered output not to contain {needle:?}\n---\n{content}---"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::widgets::Paragraph;

    #[test]
    fn test_render_to_string_dimensions() {
        let content = render_to_string(10, 3, |f| {
            f.render_widget(Paragraph::new("hello"), f.area());
        });
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "hello     ");
        assert_eq!(lines[1].len(), 10);
    }
}

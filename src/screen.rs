//! The screen sink (spec §6 "Screen contract (external)"): a
//! column-tracking cursor `PRINT`/`TAB`/`SPC`/`,` write through, plus a
//! `ratatui` widget so the CLI binary can render it.
//!
//! Grounded on the teacher's `screen.rs`: same `Arc<Mutex<..>>` buffer
//! shape (so a render thread and the interpreter thread can share a
//! handle via `Clone`) and the same `draw()` entry point, with the
//! football-specific `[BALL]`/`[FIELD]`/`[SIDE]` placeholder parsing and
//! PETSCII box-drawing remap dropped: nothing in spec §6 calls for
//! them. Border/background color and reverse-video stay, since §3/§9's
//! supplemented features keep `POKE 53280`/`53281` and `CHR$(18/146)`
//! wired to real screen state.

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::sync::{Arc, Mutex};

/// Nominal C64 screen width (spec §6); configurable via `with_size`.
pub const DEFAULT_WIDTH: usize = 40;
pub const DEFAULT_HEIGHT: usize = 25;

/// PETSCII reverse-video on/off codes, recognized inside `PRINT` string
/// literals (spec §3's supplemented "Reverse-video mode" feature).
const REVERSE_ON: u8 = 18;
const REVERSE_OFF: u8 = 146;

#[derive(Clone)]
pub struct Screen {
    buffer: Arc<Mutex<Vec<Vec<char>>>>,
    cursor_x: Arc<Mutex<usize>>,
    cursor_y: Arc<Mutex<usize>>,
    width: usize,
    height: usize,
    border_color: Arc<Mutex<Color>>,
    background_color: Arc<Mutex<Color>>,
    reverse_mode: Arc<Mutex<bool>>,
}

impl Screen {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn with_size(width: usize, height: usize) -> Self {
        Screen {
            buffer: Arc::new(Mutex::new(vec![vec![' '; width]; height])),
            cursor_x: Arc::new(Mutex::new(0)),
            cursor_y: Arc::new(Mutex::new(0)),
            width,
            height,
            border_color: Arc::new(Mutex::new(Color::Blue)),
            background_color: Arc::new(Mutex::new(Color::Blue)),
            reverse_mode: Arc::new(Mutex::new(false)),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The cursor's current column, for `TAB`/`,` arithmetic and `POS(x)`.
    pub fn column(&self) -> usize {
        *self.cursor_x.lock().unwrap()
    }

    pub fn clear(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        *buffer = vec![vec![' '; self.width]; self.height];
        *self.cursor_x.lock().unwrap() = 0;
        *self.cursor_y.lock().unwrap() = 0;
    }

    /// Write text with no trailing newline, wrapping at `width` and
    /// scrolling at `height`. Bytes 18/146 toggle reverse mode instead
    /// of printing a glyph (PETSCII reverse on/off); every other
    /// character is written to the buffer as-is.
    pub fn print(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap();
        let mut x = *self.cursor_x.lock().unwrap();
        let mut y = *self.cursor_y.lock().unwrap();

        for ch in text.chars() {
            if ch == '\n' {
                y += 1;
                x = 0;
                if y >= self.height {
                    buffer.remove(0);
                    buffer.push(vec![' '; self.width]);
                    y = self.height - 1;
                }
                continue;
            }
            if (ch as u32) == REVERSE_ON as u32 {
                drop(buffer);
                self.set_reverse_mode(true);
                buffer = self.buffer.lock().unwrap();
                continue;
            }
            if (ch as u32) == REVERSE_OFF as u32 {
                drop(buffer);
                self.set_reverse_mode(false);
                buffer = self.buffer.lock().unwrap();
                continue;
            }

            if x < self.width {
                buffer[y][x] = ch;
                x += 1;
            }
            if x >= self.width {
                y += 1;
                x = 0;
                if y >= self.height {
                    buffer.remove(0);
                    buffer.push(vec![' '; self.width]);
                    y = self.height - 1;
                }
            }
        }

        *self.cursor_x.lock().unwrap() = x;
        *self.cursor_y.lock().unwrap() = y;
    }

    pub fn println(&self, text: &str) {
        self.print(text);
        self.print("\n");
    }

    /// `TAB(n)` (spec §4.6): move the cursor to column `n`. If the
    /// cursor is already past `n`, advance to that column on the next
    /// line instead of moving backward.
    pub fn tab_to(&self, column: usize) {
        let column = column.min(self.width.saturating_sub(1));
        if self.column() > column {
            self.print("\n");
        }
        let pad = column.saturating_sub(self.column());
        if pad > 0 {
            self.print(&" ".repeat(pad));
        }
    }

    pub fn set_border_color(&self, color_code: u8) {
        *self.border_color.lock().unwrap() = c64_color(color_code);
    }

    pub fn set_background_color(&self, color_code: u8) {
        *self.background_color.lock().unwrap() = c64_color(color_code);
    }

    pub fn set_reverse_mode(&self, enabled: bool) {
        *self.reverse_mode.lock().unwrap() = enabled;
    }

    pub fn is_reverse_mode(&self) -> bool {
        *self.reverse_mode.lock().unwrap()
    }

    pub fn get_content(&self) -> String {
        let buffer = self.buffer.lock().unwrap();
        buffer
            .iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn draw(&self, f: &mut Frame) {
        let size = f.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([Constraint::Length(self.height as u16 + 2), Constraint::Min(0)].as_ref())
            .split(size);
        let inner_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .margin(0)
            .constraints([Constraint::Length(self.width as u16 + 2), Constraint::Min(0)].as_ref())
            .split(chunks[0]);

        let buffer = self.buffer.lock().unwrap();
        let border_color = *self.border_color.lock().unwrap();
        let background_color = *self.background_color.lock().unwrap();

        let lines: Vec<Line> = buffer
            .iter()
            .map(|row| Line::from(row.iter().collect::<String>()))
            .collect();

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(border_color))
                    .style(Style::default().bg(background_color)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(paragraph, inner_chunks[0]);
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

fn c64_color(code: u8) -> Color {
    match code {
        0 => Color::Black,
        1 => Color::White,
        2 => Color::Red,
        3 => Color::Cyan,
        4 => Color::Magenta,
        5 => Color::Green,
        6 => Color::Blue,
        7 => Color::Yellow,
        8 => Color::LightRed,
        9 => Color::Rgb(101, 67, 33),
        10 => Color::LightRed,
        11 => Color::DarkGray,
        12 => Color::Gray,
        13 => Color::LightGreen,
        14 => Color::LightBlue,
        15 => Color::LightCyan,
        _ => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_advances_the_column() {
        let screen = Screen::new();
        screen.print("HELLO");
        assert_eq!(screen.column(), 5);
    }

    #[test]
    fn newline_resets_column_to_zero() {
        let screen = Screen::new();
        screen.print("HI\n");
        assert_eq!(screen.column(), 0);
    }

    #[test]
    fn tab_to_pads_forward_with_spaces() {
        let screen = Screen::new();
        screen.print("AB");
        screen.tab_to(10);
        assert_eq!(screen.column(), 10);
    }

    #[test]
    fn tab_to_a_column_already_passed_wraps_to_next_line() {
        let screen = Screen::new();
        screen.print("0123456789012");
        screen.tab_to(5);
        assert_eq!(screen.column(), 5);
    }

    #[test]
    fn reverse_video_bytes_toggle_without_printing_a_glyph() {
        let screen = Screen::new();
        screen.print("A\u{12}B\u{92}C");
        assert!(screen.get_content().starts_with("ABC"));
    }

    #[test]
    fn long_line_wraps_at_width() {
        let screen = Screen::new();
        screen.print(&"X".repeat(45));
        assert_eq!(screen.column(), 5);
    }
}

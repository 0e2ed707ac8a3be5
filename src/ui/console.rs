//! Local console
//!
//! Wraps the local terminal for the input loop. In raw mode the terminal
//! delivers single characters, Enter arrives as a lone `\r` and the OS no
//! longer translates `\n` on output, so every write goes through
//! [`normalize_newlines`]. The previous terminal attributes are restored when
//! the console is torn down or dropped.

use std::io::{self, BufRead, StdinLock, Write};
use std::sync::{Arc, Mutex};

use crossterm::terminal;
use thiserror::Error;
use tracing::{debug, warn};

/// Shown instead of the escape character when echoing
pub const ESCAPE_MARKER: &str = "\u{241b}";

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Failed to switch terminal mode: {0}")]
    Mode(#[source] io::Error),

    #[error("Input closed")]
    Closed,

    #[error("Console I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

/// How user input is collected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Character at a time, terminal in raw mode
    #[default]
    Raw,
    /// Whole lines, OS line editing and echo
    Line,
}

impl InputMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "raw" | "unbuffered" | "char" => Some(InputMode::Raw),
            "line" | "buffered" | "cooked" => Some(InputMode::Line),
            _ => None,
        }
    }
}

/// Rewrite every line break (`\r\n`, `\r` or `\n`) as `\r\n`.
///
/// Applying it to its own output changes nothing.
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            other => out.push(other),
        }
    }
    out
}

struct DisplayState {
    out: Box<dyn Write + Send>,
    /// Last chunk ended in `\r`; a leading `\n` of the next one completes it
    ended_with_cr: bool,
}

/// Shared output side of the console. Cloned into the receive loop.
#[derive(Clone)]
pub struct Display {
    state: Arc<Mutex<DisplayState>>,
}

impl Display {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState {
                out,
                ended_with_cr: false,
            })),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Write `text` with raw-terminal line endings and flush
    pub fn write(&self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let text = match text.strip_prefix('\n') {
            Some(rest) if state.ended_with_cr => rest,
            _ => text,
        };
        state.ended_with_cr = text.ends_with('\r');

        state.out.write_all(normalize_newlines(text).as_bytes())?;
        state.out.flush()
    }
}

/// Raw mode held for the lifetime of the guard
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Capture the current terminal attributes and switch to raw mode
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        debug!("Terminal switched to raw mode");
        Ok(Self { active: true })
    }

    /// Put the captured attributes back. Only the first call has an effect.
    pub fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        terminal::disable_raw_mode()?;
        debug!("Terminal attributes restored");
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Local terminal seen by the input loop
pub struct Console<R> {
    input: R,
    display: Display,
    mode: InputMode,
    echo: bool,
    escape: char,
    raw_mode: Option<RawModeGuard>,
}

impl Console<StdinLock<'static>> {
    /// Attach to the process terminal, entering raw mode for [`InputMode::Raw`]
    pub fn open(mode: InputMode, echo: bool, escape: char) -> Result<Self> {
        let raw_mode = match mode {
            InputMode::Raw => Some(RawModeGuard::enable().map_err(ConsoleError::Mode)?),
            InputMode::Line => None,
        };

        let mut console = Self::with_io(io::stdin().lock(), Display::stdout(), mode, echo, escape);
        console.raw_mode = raw_mode;
        Ok(console)
    }
}

impl<R: BufRead> Console<R> {
    /// Console over arbitrary input and output; the terminal mode is left alone
    pub fn with_io(input: R, display: Display, mode: InputMode, echo: bool, escape: char) -> Self {
        Self {
            input,
            display,
            mode,
            echo,
            escape,
            raw_mode: None,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn escape(&self) -> char {
        self.escape
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Read exactly one character. In raw mode with echo on it is written
    /// back right away, the escape character as [`ESCAPE_MARKER`].
    pub fn read_char(&mut self) -> Result<char> {
        let ch = self.read_utf8_char()?;

        if self.echo && self.mode == InputMode::Raw {
            if ch == self.escape {
                self.write(ESCAPE_MARKER)?;
            } else {
                self.write(ch.encode_utf8(&mut [0; 4]))?;
            }
        }
        Ok(ch)
    }

    /// Read one line without its terminator.
    ///
    /// In raw mode `\r` ends the line and a stray `\n` is skipped.
    pub fn read_line(&mut self) -> Result<String> {
        match self.mode {
            InputMode::Raw => {
                let mut line = String::new();
                loop {
                    match self.read_char()? {
                        '\n' => continue,
                        '\r' => break,
                        ch => line.push(ch),
                    }
                }
                Ok(line)
            }
            InputMode::Line => {
                let mut line = String::new();
                if self.input.read_line(&mut line)? == 0 {
                    return Err(ConsoleError::Closed);
                }
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Ok(line)
            }
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        self.display.write(text)?;
        Ok(())
    }

    /// Restore the terminal. Dropping the console does the same.
    pub fn teardown(mut self) -> Result<()> {
        if let Some(mut guard) = self.raw_mode.take() {
            guard.restore().map_err(ConsoleError::Mode)?;
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.input.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ConsoleError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Consume the next byte only if it continues a UTF-8 sequence
    fn next_continuation(&mut self) -> Result<Option<u8>> {
        let byte = match self.input.fill_buf()?.first() {
            Some(&byte) if (0x80..=0xbf).contains(&byte) => byte,
            _ => return Ok(None),
        };
        self.input.consume(1);
        Ok(Some(byte))
    }

    fn read_utf8_char(&mut self) -> Result<char> {
        let first = self.read_byte()?;
        let width = match first {
            0x00..=0x7f => return Ok(char::from(first)),
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Ok(char::REPLACEMENT_CHARACTER),
        };

        let mut buf = [first, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            match self.next_continuation()? {
                Some(byte) => *slot = byte,
                None => return Ok(char::REPLACEMENT_CHARACTER),
            }
        }
        Ok(std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SharedBuffer;
    use super::*;
    use std::io::Cursor;

    const ESC: char = '\x1f';

    fn console(input: &[u8], mode: InputMode, echo: bool) -> (Console<Cursor<Vec<u8>>>, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let display = Display::new(Box::new(buffer.clone()));
        let console = Console::with_io(Cursor::new(input.to_vec()), display, mode, echo, ESC);
        (console, buffer)
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\nb"), "a\r\nb");
        assert_eq!(normalize_newlines("a\rb"), "a\r\nb");
        assert_eq!(normalize_newlines("a\r\nb"), "a\r\nb");
        assert_eq!(normalize_newlines("\n\n"), "\r\n\r\n");
        assert_eq!(normalize_newlines("\n\r"), "\r\n\r\n");
        assert_eq!(normalize_newlines("plain"), "plain");
    }

    #[test]
    fn test_normalize_newlines_idempotent() {
        for text in ["a\nb\r\nc\rd", "\r\r\n\n\r", "\n\n\n", "x\r", "", "✓\n✓"] {
            let once = normalize_newlines(text);
            assert_eq!(normalize_newlines(&once), once, "input {:?}", text);
        }
    }

    #[test]
    fn test_display_joins_split_crlf() {
        let buffer = SharedBuffer::default();
        let display = Display::new(Box::new(buffer.clone()));

        display.write("one\r").unwrap();
        display.write("\ntwo\n").unwrap();
        display.write("\nthree").unwrap();
        assert_eq!(buffer.contents(), "one\r\ntwo\r\n\r\nthree");
    }

    #[test]
    fn test_read_char_utf8() {
        let (mut console, _) = console("aé✓".as_bytes(), InputMode::Raw, false);
        assert_eq!(console.read_char().unwrap(), 'a');
        assert_eq!(console.read_char().unwrap(), 'é');
        assert_eq!(console.read_char().unwrap(), '✓');
        assert!(matches!(console.read_char(), Err(ConsoleError::Closed)));
    }

    #[test]
    fn test_read_char_invalid_byte() {
        let (mut console, _) = console(&[0xff, b'x'], InputMode::Raw, false);
        assert_eq!(console.read_char().unwrap(), char::REPLACEMENT_CHARACTER);
        assert_eq!(console.read_char().unwrap(), 'x');
    }

    #[test]
    fn test_read_char_truncated_sequence_keeps_next_key() {
        let (mut stray, _) = console(&[0xe9, 0x1f, b'x'], InputMode::Raw, false);
        assert_eq!(stray.read_char().unwrap(), char::REPLACEMENT_CHARACTER);
        assert_eq!(stray.read_char().unwrap(), '\x1f');
        assert_eq!(stray.read_char().unwrap(), 'x');

        let (mut cut, _) = console(&[0xe2, 0x9c], InputMode::Raw, false);
        assert_eq!(cut.read_char().unwrap(), char::REPLACEMENT_CHARACTER);
        assert!(matches!(cut.read_char(), Err(ConsoleError::Closed)));
    }

    #[test]
    fn test_read_char_echo() {
        let (mut console, out) = console(b"k\x1f\r", InputMode::Raw, true);
        console.read_char().unwrap();
        console.read_char().unwrap();
        console.read_char().unwrap();
        assert_eq!(out.contents(), format!("k{}\r\n", ESCAPE_MARKER));
    }

    #[test]
    fn test_read_char_no_echo() {
        let (mut console, out) = console(b"k", InputMode::Raw, false);
        assert_eq!(console.read_char().unwrap(), 'k');
        assert!(out.contents().is_empty());
    }

    #[test]
    fn test_read_line_raw() {
        let (mut console, _) = console(b"ls\n -l\rnext\r", InputMode::Raw, false);
        assert_eq!(console.read_line().unwrap(), "ls -l");
        assert_eq!(console.read_line().unwrap(), "next");
    }

    #[test]
    fn test_read_line_cooked() {
        let (mut console, out) = console(b"first\nsecond\r\n", InputMode::Line, true);
        assert_eq!(console.read_line().unwrap(), "first");
        assert_eq!(console.read_line().unwrap(), "second");
        assert!(matches!(console.read_line(), Err(ConsoleError::Closed)));
        // The OS echoes in line mode
        assert!(out.contents().is_empty());
    }

    #[test]
    fn test_teardown_without_raw_mode() {
        let (console, _) = console(b"", InputMode::Line, true);
        assert!(console.teardown().is_ok());
    }

    #[test]
    fn test_input_mode_names() {
        assert_eq!(InputMode::parse("RAW"), Some(InputMode::Raw));
        assert_eq!(InputMode::parse("line"), Some(InputMode::Line));
        assert_eq!(InputMode::parse("block"), None);
    }
}

//! Input loop
//!
//! Foreground control flow: reads the local console and forwards everything
//! to the device, except for escape commands which are handled locally.
//!
//! In raw mode the escape character starts capturing a command that ends at
//! Enter or at a second escape character:
//!
//! | Keys | Effect |
//! |------|--------|
//! | esc esc | one literal escape character is sent |
//! | esc Enter | same as above |
//! | esc `exit` Enter | leave the loop |
//! | esc `version` Enter | print the version locally |
//! | esc anything else Enter | ignored |
//!
//! In line mode a whole line equal to esc + `exit` or esc + `version` acts
//! the same way.

use std::io::BufRead;

use thiserror::Error;
use tracing::{debug, info};

use super::console::{Console, ConsoleError, InputMode};
use crate::core::channel::{ChannelError, DeviceChannel, Payload};

/// Version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum InputError {
    #[error(transparent)]
    Console(#[from] ConsoleError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, InputError>;

/// Line terminator sent to the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    Cr,
    CrLf,
}

impl LineEnding {
    /// Accepts names (`lf`, `cr`, `crlf`) and the literal or escaped sequences
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "lf" | "\n" | "\\n" => Some(LineEnding::Lf),
            "cr" | "\r" | "\\r" => Some(LineEnding::Cr),
            "crlf" | "\r\n" | "\\r\\n" => Some(LineEnding::CrLf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A completed escape command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscapeCommand {
    /// Send the escape character itself
    Literal,
    Exit,
    Version,
    Unknown(String),
}

impl EscapeCommand {
    pub fn parse(command: &str) -> Self {
        match command {
            "" => EscapeCommand::Literal,
            "exit" => EscapeCommand::Exit,
            "version" => EscapeCommand::Version,
            other => EscapeCommand::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Drives one console against one device channel
pub struct InputLoop<'a, R> {
    console: &'a mut Console<R>,
    channel: &'a DeviceChannel,
    /// Overrides the default terminator of the input mode
    newline: Option<LineEnding>,
}

impl<'a, R: BufRead> InputLoop<'a, R> {
    pub fn new(console: &'a mut Console<R>, channel: &'a DeviceChannel, newline: Option<LineEnding>) -> Self {
        Self {
            console,
            channel,
            newline,
        }
    }

    /// Run until the exit command (`Ok`) or an I/O failure (`Err`)
    pub fn run(&mut self) -> Result<()> {
        match self.console.mode() {
            InputMode::Raw => self.run_raw(),
            InputMode::Line => self.run_line(),
        }
    }

    fn run_raw(&mut self) -> Result<()> {
        let escape = self.console.escape();
        let enter = self.newline.unwrap_or(LineEnding::CrLf);

        loop {
            let ch = self.console.read_char()?;

            if ch == escape {
                let command = self.read_command()?;
                if self.dispatch(command)? == Flow::Exit {
                    return Ok(());
                }
            } else if ch == '\r' {
                // Raw mode only yields CR for Enter
                self.channel.transmit(&enter.as_str().into())?;
            } else {
                self.channel.transmit(&ch.into())?;
            }
        }
    }

    fn run_line(&mut self) -> Result<()> {
        let escape = self.console.escape();
        let terminator = self.newline.unwrap_or(LineEnding::Lf);

        loop {
            let mut line = self.console.read_line()?;

            let command = match line.strip_prefix(escape) {
                Some("exit") => Some(EscapeCommand::Exit),
                Some("version") => Some(EscapeCommand::Version),
                _ => None,
            };

            match command {
                Some(command) => {
                    if self.dispatch(command)? == Flow::Exit {
                        return Ok(());
                    }
                }
                None => {
                    line.push_str(terminator.as_str());
                    self.channel.transmit(&Payload::Text(line))?;
                }
            }
        }
    }

    /// Capture characters after an escape until Enter or another escape
    fn read_command(&mut self) -> Result<EscapeCommand> {
        let escape = self.console.escape();
        let echo = self.console.echo();
        let mut command = String::new();

        loop {
            let ch = self.console.read_char()?;

            if ch == '\r' {
                if !echo {
                    self.console.write("\n")?;
                }
                return Ok(EscapeCommand::parse(&command));
            }

            if ch == escape {
                if command.is_empty() {
                    return Ok(EscapeCommand::Literal);
                }
                self.console.write("\n")?;
                return Ok(EscapeCommand::parse(&command));
            }

            if !echo {
                self.console.write(ch.encode_utf8(&mut [0; 4]))?;
            }
            command.push(ch);
        }
    }

    fn dispatch(&mut self, command: EscapeCommand) -> Result<Flow> {
        match command {
            EscapeCommand::Literal => {
                debug!("Sending literal escape character");
                let mut encoded = [0; 4];
                let escape = self.console.escape().encode_utf8(&mut encoded);
                // Control character, sent as is
                self.channel.transmit(&Payload::Binary(escape.as_bytes().to_vec()))?;
            }
            EscapeCommand::Exit => {
                info!("Exit requested");
                return Ok(Flow::Exit);
            }
            EscapeCommand::Version => {
                self.console.write(&format!("Version: {}\n", VERSION))?;
            }
            EscapeCommand::Unknown(command) => {
                debug!("Ignoring unknown escape command {:?}", command);
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::framing::Framing;
    use crate::core::port::testing::MockPort;
    use crate::ui::console::testing::SharedBuffer;
    use crate::ui::console::ESCAPE_MARKER;
    use crate::ui::Display;
    use std::io::Cursor;

    const ESC: char = '\x1f';

    struct Harness {
        port: MockPort,
        screen: SharedBuffer,
        result: Result<()>,
    }

    fn run(keys: &str, mode: InputMode, echo: bool, newline: Option<LineEnding>) -> Harness {
        let port = MockPort::new();
        let channel = DeviceChannel::with_port(Box::new(port.clone()), Framing::Text, None).unwrap();
        let screen = SharedBuffer::default();
        let display = Display::new(Box::new(screen.clone()));
        let mut console = Console::with_io(Cursor::new(keys.as_bytes().to_vec()), display, mode, echo, ESC);

        let result = InputLoop::new(&mut console, &channel, newline).run();
        Harness { port, screen, result }
    }

    fn raw(keys: &str) -> Harness {
        run(keys, InputMode::Raw, false, None)
    }

    #[test]
    fn test_raw_characters_forwarded() {
        let h = raw("ls\r");
        assert!(matches!(h.result, Err(InputError::Console(ConsoleError::Closed))));
        assert_eq!(h.port.outgoing(), b"ls\r\n");
    }

    #[test]
    fn test_raw_double_escape_sends_one_byte() {
        let h = raw("\x1f\x1fa");
        // Still in normal state: 'a' is forwarded after the escape
        assert_eq!(h.port.outgoing(), b"\x1fa");
    }

    #[test]
    fn test_raw_escape_enter_sends_escape() {
        let h = raw("\x1f\r");
        assert_eq!(h.port.outgoing(), b"\x1f");
    }

    #[test]
    fn test_raw_exit_sends_nothing() {
        let h = raw("\x1fexit\rignored");
        assert!(h.result.is_ok());
        assert!(h.port.outgoing().is_empty());
    }

    #[test]
    fn test_raw_version_prints_locally() {
        let h = raw("\x1fversion\rx");
        assert_eq!(h.port.outgoing(), b"x");
        assert!(h.screen.contents().contains(&format!("Version: {}\r\n", VERSION)));
    }

    #[test]
    fn test_raw_unknown_command_ignored() {
        let h = raw("\x1freboot\rok\x1fexit\r");
        assert!(h.result.is_ok());
        assert_eq!(h.port.outgoing(), b"ok");
    }

    #[test]
    fn test_raw_command_ended_by_escape() {
        let h = raw("a\x1fexit\x1fb");
        assert!(h.result.is_ok());
        assert_eq!(h.port.outgoing(), b"a");
    }

    #[test]
    fn test_raw_command_echo_without_console_echo() {
        let h = raw("\x1fvers\r");
        assert_eq!(h.screen.contents(), "vers\r\n");
    }

    #[test]
    fn test_raw_command_echo_with_console_echo() {
        let h = run("\x1fexit\r", InputMode::Raw, true, None);
        assert!(h.result.is_ok());
        // Echoed once by the console, not again by the command capture
        assert_eq!(h.screen.contents(), format!("{}exit\r\n", ESCAPE_MARKER));
    }

    #[test]
    fn test_raw_custom_newline() {
        let h = run("a\rb\r", InputMode::Raw, false, Some(LineEnding::Cr));
        assert_eq!(h.port.outgoing(), b"a\rb\r");
    }

    #[test]
    fn test_line_mode_transmits_lines() {
        let h = run("help\nstatus\n", InputMode::Line, true, None);
        assert!(matches!(h.result, Err(InputError::Console(ConsoleError::Closed))));
        assert_eq!(h.port.outgoing(), b"help\nstatus\n");
    }

    #[test]
    fn test_line_mode_commands() {
        let h = run("\x1fversion\nuptime\n\x1fexit\nnever\n", InputMode::Line, true, None);
        assert!(h.result.is_ok());
        assert_eq!(h.port.outgoing(), b"uptime\n");
        assert_eq!(h.screen.contents(), format!("Version: {}\r\n", VERSION));
    }

    #[test]
    fn test_line_mode_other_escape_lines_are_sent() {
        let h = run("\x1fquit\n", InputMode::Line, true, Some(LineEnding::CrLf));
        assert_eq!(h.port.outgoing(), b"\x1fquit\r\n");
    }

    #[test]
    fn test_escape_command_parse() {
        assert_eq!(EscapeCommand::parse(""), EscapeCommand::Literal);
        assert_eq!(EscapeCommand::parse("exit"), EscapeCommand::Exit);
        assert_eq!(EscapeCommand::parse("version"), EscapeCommand::Version);
        assert_eq!(EscapeCommand::parse("EXIT"), EscapeCommand::Unknown("EXIT".to_string()));
    }

    #[test]
    fn test_line_ending_parse() {
        assert_eq!(LineEnding::parse("CRLF"), Some(LineEnding::CrLf));
        assert_eq!(LineEnding::parse("\\n"), Some(LineEnding::Lf));
        assert_eq!(LineEnding::parse("\r"), Some(LineEnding::Cr));
        assert_eq!(LineEnding::parse("nl"), None);
    }
}

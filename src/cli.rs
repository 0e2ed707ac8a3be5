//! Command line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::ConfigFile;

/// A minimal serial terminal.
///
/// Type the escape character (default Ctrl+_) followed by `exit` and Enter
/// to quit, or `version` and Enter to show the version. Typing the escape
/// character twice sends it to the device.
#[derive(Parser, Debug)]
#[command(name = "sterm", version)]
pub struct Cli {
    /// Path to the serial communication device
    pub device: Option<String>,

    /// The baudrate used for the communication [default: 115200]
    #[arg(short, long)]
    pub baudrate: Option<u32>,

    /// Configuration triple xyz: x = data bits {5,6,7,8}, y = parity {N,E,O},
    /// z = stop bits {1,2} [default: 8N1]
    #[arg(short, long)]
    pub format: Option<String>,

    /// Display received data as hex bytes instead of UTF-8 text (read only)
    #[arg(long)]
    pub binary: bool,

    /// Escape character, literal or caret notation like ^] [default: ^_]
    #[arg(long, value_name = "CHAR")]
    pub escape: Option<String>,

    /// Append received data to a file
    #[arg(short = 'w', long = "write", value_name = "LOGFILE")]
    pub logfile: Option<PathBuf>,

    /// Do not echo typed characters (raw input only)
    #[arg(short, long)]
    pub noecho: bool,

    /// Send every character as it is typed (default)
    #[arg(short, long, conflicts_with = "line")]
    pub unbuffered: bool,

    /// Buffer a whole line before sending it
    #[arg(short, long)]
    pub line: bool,

    /// Line terminator sent for Enter: lf, cr or crlf
    #[arg(long, value_name = "NEWLINE")]
    pub newline: Option<String>,

    /// Additional configuration file, read after the default locations
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line as the topmost configuration layer
    pub fn to_layer(&self) -> ConfigFile {
        let mut layer = ConfigFile::default();

        layer.connection.device = self.device.clone();
        layer.connection.baudrate = self.baudrate;
        layer.connection.format = self.format.clone();

        if self.binary {
            layer.terminal.mode = Some("binary".to_string());
        }
        if self.noecho {
            layer.terminal.echo = Some(false);
        }
        if self.unbuffered {
            layer.terminal.input = Some("raw".to_string());
        } else if self.line {
            layer.terminal.input = Some("line".to_string());
        }
        layer.terminal.escape = self.escape.clone();
        layer.terminal.logfile = self.logfile.clone();
        layer.remote.newline = self.newline.clone();

        layer
    }
}

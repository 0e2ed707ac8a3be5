//! sterm - A minimal serial terminal
//!
//! sterm opens a serial (UART) device, shows everything it receives and sends
//! what is typed. Local commands are given in-band after an escape character.
//!
//! # Quick Start
//!
//! ```text
//! sterm /dev/ttyUSB0                 # 115200 baud, 8N1
//! sterm -b 9600 -f 7E1 /dev/ttyS0
//! sterm --binary -w dump.bin /dev/ttyACM0
//! ```
//!
//! # Escape commands (default escape: Ctrl+_)
//!
//! | Keys | Action |
//! |------|--------|
//! | esc `exit` Enter | Quit |
//! | esc `version` Enter | Show version |
//! | esc esc | Send the escape character |

mod cli;
mod config;
mod core;
mod ui;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{describe_escape, home_dir, ConfigFile, Settings};
use crate::core::channel::DeviceChannel;
use crate::core::session::{Session, POLL_INTERVAL};
use crate::ui::console::ConsoleError;
use crate::ui::input::InputError;
use crate::ui::{Console, InputLoop, InputMode, VERSION};

fn main() {
    let cli = Cli::parse();

    init_logging();
    info!("sterm {} starting", VERSION);

    print_banner();

    if let Err(e) = run(cli) {
        report_error(&e);
        std::process::exit(1);
    }
}

/// Diagnostics go to `~/.sterm/sterm.log`; the terminal belongs to the session
fn init_logging() {
    let log_path = home_dir()
        .map(|h| h.join(".sterm").join("sterm.log"))
        .unwrap_or_else(|| PathBuf::from("sterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("STERM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn print_banner() {
    println!();
    println!(
        " {} {} {} {} {} ",
        "--[".red().bold(),
        "sterm".blue().bold(),
        "//".red().bold(),
        VERSION.blue().bold(),
        "]--".red().bold(),
    );
    println!();
}

fn report_error(error: &anyhow::Error) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{} {:#}", "Error:".red().bold(), error);
    let _ = writeln!(stderr, "{}", "Use --help for usage information".dark_grey());
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut config = ConfigFile::load_layers(&ConfigFile::default_paths())?;
    if let Some(path) = &cli.config {
        config.merge(ConfigFile::load_required(path)?);
    }
    config.merge(cli.to_layer());

    Ok(Settings::resolve(config)?)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli).context("Invalid configuration")?;

    info!("Device: {}", settings.device);
    info!("Baudrate: {}, format: {}", settings.baudrate, settings.format);
    info!("Framing: {}", settings.framing.name());
    info!("Input: {:?}, echo: {}", settings.input, settings.echo);

    let channel = DeviceChannel::open(
        &settings.device,
        settings.baudrate,
        settings.format,
        settings.framing,
        settings.logfile.as_deref(),
    )?;

    let escape = describe_escape(settings.escape);
    match settings.input {
        InputMode::Raw => println!(" Type {}exit and Enter to quit.\n", escape),
        InputMode::Line => println!(" Enter {}exit on a line of its own to quit.\n", escape),
    }

    let mut console = Console::open(settings.input, settings.echo, settings.escape)?;
    let session = Session::start(channel, console.display().clone(), POLL_INTERVAL)?;

    let result = InputLoop::new(&mut console, session.channel(), settings.newline).run();
    match &result {
        Ok(()) => info!("Exit command received"),
        Err(e) => warn!("Input loop ended: {}", e),
    }
    if !session.is_receiving() {
        info!("Receive loop had already stopped");
    }

    // Receive thread and device first, then the terminal
    let closed = session.shutdown();
    let restored = console.teardown();

    let receive_exit = closed?;
    info!("Receive loop exit: {:?}", receive_exit);
    restored?;

    match result {
        Ok(()) | Err(InputError::Console(ConsoleError::Closed)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

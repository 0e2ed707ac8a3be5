//! Device channel
//!
//! Owns the serial connection, the decoder for the configured framing and the
//! optional append-only log of received data. The receive loop and the input
//! loop share one channel behind an `Arc`; each side takes its own lock so a
//! transmit never waits for the log file and vice versa.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info};

use super::format::SerialFormat;
use super::framing::{Decoder, Framing};
use super::port::{Port, SerialDevice};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from device: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to device: {0}")]
    Write(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Data handed to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Sent UTF-8 encoded
    Text(String),
    /// Sent unchanged
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<char> for Payload {
    fn from(ch: char) -> Self {
        Payload::Text(ch.to_string())
    }
}

/// Receiving half: decoder plus log sink, touched only by the receive loop
struct Inbound {
    decoder: Decoder,
    log: Option<File>,
    buffer: Vec<u8>,
}

/// Connection to the remote device
pub struct DeviceChannel {
    port: Mutex<Box<dyn Port>>,
    inbound: Mutex<Inbound>,
}

impl DeviceChannel {
    /// Open the serial device and, if requested, the log file
    pub fn open(
        path: &str,
        baudrate: u32,
        format: SerialFormat,
        framing: Framing,
        log_path: Option<&Path>,
    ) -> Result<Self> {
        let device = SerialDevice::open(path, baudrate, format).map_err(|source| {
            ChannelError::Open {
                path: path.to_string(),
                source,
            }
        })?;
        info!("Opened {} at {} baud, {}", path, baudrate, format);

        Self::with_port(Box::new(device), framing, log_path)
    }

    /// Build a channel over an already open port
    pub fn with_port(port: Box<dyn Port>, framing: Framing, log_path: Option<&Path>) -> Result<Self> {
        let log = match log_path {
            Some(path) => Some(open_log(path)?),
            None => None,
        };

        Ok(Self {
            port: Mutex::new(port),
            inbound: Mutex::new(Inbound {
                decoder: Decoder::new(framing),
                log,
                buffer: Vec::new(),
            }),
        })
    }

    /// Drain whatever the driver has buffered and render it.
    ///
    /// `Ok(None)` means nothing arrived. An error means the connection is
    /// gone and polling should stop.
    pub fn receive(&self) -> Result<Option<String>> {
        let mut inbound = lock(&self.inbound);
        let Inbound { decoder, log, buffer } = &mut *inbound;

        {
            let mut port = lock(&self.port);
            let waiting = port.bytes_waiting().map_err(ChannelError::Read)?;
            buffer.resize(waiting, 0);
            if waiting > 0 {
                let n = port.read(buffer).map_err(ChannelError::Read)?;
                buffer.truncate(n);
            }
        }

        if buffer.is_empty() {
            // A held-back tail that did not complete within one poll is malformed
            let Some(text) = decoder.flush() else {
                return Ok(None);
            };
            append_log(log, text.as_bytes());
            return Ok(Some(text));
        }

        let text = decoder.decode(buffer);

        match decoder.framing() {
            Framing::Text => append_log(log, text.as_bytes()),
            Framing::Binary => append_log(log, buffer),
        }

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    /// Send `payload` to the device, blocking until written
    pub fn transmit(&self, payload: &Payload) -> Result<()> {
        lock(&self.port)
            .write_all(payload.as_bytes())
            .map_err(ChannelError::Write)
    }

    /// Close the connection and flush the log file
    pub fn close(self) -> Result<()> {
        let Inbound {
            mut decoder,
            mut log,
            ..
        } = self
            .inbound
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(tail) = decoder.flush() {
            append_log(&mut log, tail.as_bytes());
        }
        if let Some(mut file) = log {
            file.flush().map_err(ChannelError::Write)?;
        }
        drop(self.port);
        info!("Device channel closed");
        Ok(())
    }
}

/// Append-only; previous content is kept
fn open_log(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ChannelError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Logging received data to {}", path.display());
    Ok(file)
}

/// A failing log write does not end the session
fn append_log(log: &mut Option<File>, data: &[u8]) {
    let Some(file) = log else {
        return;
    };
    if let Err(e) = file.write_all(data) {
        debug!("Log write failed: {}", e);
    }
}

/// A panic in the other loop must not wedge shutdown
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Device side of the terminal.
//!
//! - **format**: the `8N1` style byte format triple
//! - **framing**: text / hex rendering of received bytes
//! - **port**: serial driver access behind the `Port` trait
//! - **channel**: the device channel (receive, transmit, log sink)
//! - **session**: receive loop thread and shutdown coordination
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── DeviceChannel
//! │   ├── Port (serialport)
//! │   ├── Decoder (text / binary)
//! │   └── log file (append)
//! └── receive thread ── Display
//! ```

pub mod format;
pub mod framing;
pub mod port;
pub mod channel;
pub mod session;

//! Session management
//!
//! Runs the receive loop on its own thread next to the foreground input loop.
//! The two are coordinated by a single shutdown flag: the session owns the
//! only handle that can raise it, the receive thread only observes it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::channel::{ChannelError, DeviceChannel};
use crate::ui::Display;

/// Default receive poll interval
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Writable side of the shutdown flag
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

/// Read-only view of a [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            flag: self.flag.clone(),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why the receive loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveExit {
    /// Shutdown flag observed
    Shutdown,
    /// Reading from the device failed
    Disconnected,
    /// The local display could not be written
    DisplayClosed,
}

/// Poll `channel` every `interval` and forward decoded text to `display`
/// until `shutdown` is raised or the connection fails.
///
/// A read failure ends the loop silently without raising the shutdown flag;
/// the input loop keeps running until the user exits.
pub fn receive_loop(
    channel: &DeviceChannel,
    display: &Display,
    shutdown: &ShutdownListener,
    interval: Duration,
) -> ReceiveExit {
    loop {
        if shutdown.is_triggered() {
            return ReceiveExit::Shutdown;
        }

        match channel.receive() {
            Ok(Some(text)) => {
                if let Err(e) = display.write(&text) {
                    warn!("Display write failed: {}", e);
                    return ReceiveExit::DisplayClosed;
                }
            }
            Ok(None) => {}
            Err(ChannelError::Read(e)) => {
                warn!("Connection lost: {}", e);
                return ReceiveExit::Disconnected;
            }
            Err(e) => {
                warn!("Receive failed: {}", e);
                return ReceiveExit::Disconnected;
            }
        }

        thread::sleep(interval);
    }
}

/// An open device with its receive thread
pub struct Session {
    channel: Arc<DeviceChannel>,
    shutdown: ShutdownSignal,
    receiver: Option<JoinHandle<ReceiveExit>>,
}

impl Session {
    /// Spawn the receive loop for `channel`
    pub fn start(channel: DeviceChannel, display: Display, interval: Duration) -> io::Result<Self> {
        let channel = Arc::new(channel);
        let shutdown = ShutdownSignal::new();

        let listener = shutdown.listener();
        let rx_channel = channel.clone();
        let receiver = thread::Builder::new()
            .name("receive".to_string())
            .spawn(move || {
                debug!("Receive loop started");
                let exit = receive_loop(&rx_channel, &display, &listener, interval);
                debug!("Receive loop stopped: {:?}", exit);
                exit
            })?;

        Ok(Self {
            channel,
            shutdown,
            receiver: Some(receiver),
        })
    }

    pub fn channel(&self) -> &DeviceChannel {
        &self.channel
    }

    /// Whether the receive thread is still polling
    pub fn is_receiving(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the receive loop, wait for it and close the device
    pub fn shutdown(mut self) -> Result<Option<ReceiveExit>, ChannelError> {
        let exit = self.stop_receiver();

        // With the receive thread joined this becomes the last reference
        let channel = self.channel.clone();
        drop(self);
        match Arc::try_unwrap(channel) {
            Ok(channel) => channel.close()?,
            Err(_) => warn!("Device channel still shared at shutdown"),
        }

        info!("Session closed");
        Ok(exit)
    }

    fn stop_receiver(&mut self) -> Option<ReceiveExit> {
        self.shutdown.trigger();
        let handle = self.receiver.take()?;
        match handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                warn!("Receive thread panicked");
                None
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_receiver();
    }
}

//! Serial port wrapper
//!
//! The device channel only needs three primitives from the driver: how many
//! bytes are waiting, read, and write. They are expressed as the [`Port`]
//! trait so the channel can run against the real `serialport` driver or an
//! in-memory double.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{FlowControl, SerialPort};

use super::format::SerialFormat;

/// Read timeout of the opened connection; bounds a single receive call
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Raw byte access to an open connection
pub trait Port: Send {
    /// Number of bytes buffered by the driver right now
    fn bytes_waiting(&mut self) -> io::Result<usize>;

    /// Read up to `buffer.len()` bytes. A timeout yields `Ok(0)`.
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` and flush
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Port backed by the platform serial driver
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
}

impl SerialDevice {
    /// Open `path` with the given baud rate and byte format
    pub fn open(path: &str, baudrate: u32, format: SerialFormat) -> serialport::Result<Self> {
        let port = serialport::new(path, baudrate)
            .data_bits(format.serialport_data_bits())
            .parity(format.serialport_parity())
            .stop_bits(format.serialport_stop_bits())
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;

        Ok(Self { port })
    }
}

impl Port for SerialDevice {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)?;
        self.port.flush()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory port double shared by the channel, session and input tests

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Inner {
        incoming: VecDeque<Vec<u8>>,
        outgoing: Vec<u8>,
        fail_reads: bool,
        reads: usize,
    }

    /// Port double. Each queued chunk becomes visible as one buffered burst.
    #[derive(Clone, Default)]
    pub struct MockPort {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockPort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_incoming(&self, bytes: &[u8]) {
            self.inner.lock().unwrap().incoming.push_back(bytes.to_vec());
        }

        pub fn fail_reads(&self) {
            self.inner.lock().unwrap().fail_reads = true;
        }

        pub fn outgoing(&self) -> Vec<u8> {
            self.inner.lock().unwrap().outgoing.clone()
        }

        /// Number of polls seen so far
        pub fn reads(&self) -> usize {
            self.inner.lock().unwrap().reads
        }
    }

    impl Port for MockPort {
        fn bytes_waiting(&mut self) -> io::Result<usize> {
            let mut inner = self.inner.lock().unwrap();
            inner.reads += 1;
            if inner.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            Ok(inner.incoming.front().map_or(0, Vec::len))
        }

        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            let mut inner = self.inner.lock().unwrap();
            let Some(chunk) = inner.incoming.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buffer.len());
            buffer[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                inner.incoming.push_front(chunk[n..].to_vec());
            }
            Ok(n)
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            self.inner.lock().unwrap().outgoing.extend_from_slice(data);
            Ok(())
        }
    }
}

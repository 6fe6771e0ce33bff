//! Byte transports the session runs over.
//!
//! A [`Transport`] knows how to open a [`Port`]: a full-duplex byte stream
//! that can additionally drive the DTR/RTS modem lines used to reset ESP32
//! boards. [`SerialTransport`] is the real implementation on top of
//! `tokio-serial`; tests provide in-memory ones.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

/// Levels of the two modem control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct Signals {
    /// Data Terminal Ready.
    pub dtr: bool,
    /// Request To Send.
    pub rts: bool,
}

impl Signals {
    /// Both lines deasserted.
    pub const RELEASED: Self = Self {
        dtr: false,
        rts: false,
    };

    /// RTS asserted with DTR low: holds an ESP32 in reset.
    pub const RESET: Self = Self {
        dtr: false,
        rts: true,
    };
}

/// An open, full-duplex byte stream to the device.
///
/// Dropping the port closes it.
pub trait Port: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drives the modem control lines.
    fn set_signals(&mut self, signals: Signals) -> io::Result<()>;
}

/// Something that can be opened into a [`Port`].
pub trait Transport {
    /// The stream produced by [`Transport::open`].
    type Port: Port;

    /// Opens the transport at `baud_rate`.
    fn open(&mut self, baud_rate: u32) -> io::Result<Self::Port>;
}

/// A serial device node such as `/dev/ttyUSB0` or `COM3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTransport {
    /// Device node.
    path: String,
}

impl SerialTransport {
    /// Creates a transport for the serial device at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Device path this transport opens.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for SerialTransport {
    type Port = tokio_serial::SerialStream;

    fn open(&mut self, baud_rate: u32) -> io::Result<Self::Port> {
        use tokio_serial::SerialPortBuilderExt;

        tracing::debug!(path = %self.path, baud_rate, "opening serial port");
        tokio_serial::new(&self.path, baud_rate)
            .open_native_async()
            .map_err(|e| {
                io::Error::new(io::ErrorKind::NotConnected, format!("{}: {e}", self.path))
            })
    }
}

impl Port for tokio_serial::SerialStream {
    fn set_signals(&mut self, signals: Signals) -> io::Result<()> {
        use tokio_serial::SerialPort;

        self.write_data_terminal_ready(signals.dtr)?;
        self.write_request_to_send(signals.rts)?;
        Ok(())
    }
}

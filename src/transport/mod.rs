//! Byte transports between the ECR and the PT.
//!
//! The serial transport frames APDUs with DLE/STX/ETX, a CRC and an
//! ACK/NAK handshake; TCP carries bare APDUs and relies on the APDU's own
//! length field. The transmission engine drives either through the
//! [`Transport`] trait.

pub mod serial;
pub mod socket;

use std::time::Duration;

pub use serial::SerialTransport;
pub use socket::SocketTransport;

use crate::errors::Result;

pub trait Transport {
    /// Sends one APDU. Unless `no_wait`, blocks until the first response
    /// APDU arrives and returns it.
    fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>>;

    /// Receives one APDU, allowing `timeout` for it to begin.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Discards any buffered bytes after a failed exchange.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether the caller should pause briefly between commands. Serial
    /// terminals want the breathing room; TCP ones do not.
    fn insert_delays(&self) -> bool {
        true
    }
}

impl Transport for Box<dyn Transport> {
    fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>> {
        (**self).send(apdu, no_wait)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        (**self).receive(timeout)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn insert_delays(&self) -> bool {
        (**self).insert_delays()
    }
}

/// Opens a transport from a device string: `socket://<host>:<port>` for
/// TCP, anything else is treated as a serial device path.
pub fn connect(device: &str) -> Result<Box<dyn Transport>> {
    if device.starts_with(socket::URI_SCHEME) {
        Ok(Box::new(SocketTransport::connect(device)?))
    } else {
        Ok(Box::new(SerialTransport::open(device)?))
    }
}

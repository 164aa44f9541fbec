//! The ZVT serial link layer (specification appendix "transport layer").
//!
//! A frame is `DLE STX || payload || DLE ETX || CRC-low || CRC-high`, where
//! every DLE inside the payload is doubled and the CRC-16/XMODEM covers the
//! unstuffed payload plus the ETX. Each frame is answered with a single
//! ACK or NAK byte. Line parameters are 9600 8N2, no flow control, with
//! RTS and DTR asserted on open.

use std::io::Read;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::crc::crc16_xmodem;
use crate::errors::{Error, Result};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const DLE: u8 = 0x10;
pub const NAK: u8 = 0x15;

/// Inter-byte timeout once a frame has begun.
pub const TIMEOUT_T1: Duration = Duration::from_millis(200);
/// Timeout for the frame header (and thus for a response to begin).
pub const TIMEOUT_T2: Duration = Duration::from_secs(5);
/// How long to poll for the ACK/NAK byte after sending a frame.
const ACK_WAIT: Duration = Duration::from_secs(1);
/// How often a CRC mismatch is answered with NAK before giving up.
const CRC_RETRIES: usize = 3;

/// The CRC a frame for `apdu` carries: CRC-16/XMODEM over `apdu || ETX`.
pub fn frame_crc(apdu: &[u8]) -> u16 {
    let mut data = Vec::with_capacity(apdu.len() + 1);
    data.extend_from_slice(apdu);
    data.push(ETX);
    crc16_xmodem(&data)
}

/// Frames an APDU for the serial line, DLE stuffing and CRC included.
pub fn frame(apdu: &[u8]) -> Vec<u8> {
    let crc = frame_crc(apdu);
    let mut out = Vec::with_capacity(apdu.len() + 6);
    out.push(DLE);
    out.push(STX);
    for &b in apdu {
        out.push(b);
        if b == DLE {
            out.push(DLE);
        }
    }
    out.push(DLE);
    out.push(ETX);
    out.push((crc & 0xFF) as u8);
    out.push((crc >> 8) as u8);
    out
}

fn read_byte(r: &mut impl Read, what: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(buf[0]),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            Err(Error::Timeout(format!("reading {}", what)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks the two header bytes of a frame.
pub fn check_header(header: [u8; 2]) -> Result<()> {
    if header == [DLE, STX] {
        Ok(())
    } else {
        Err(Error::Framing(format!(
            "header error: {:02x}{:02x}",
            header[0], header[1]
        )))
    }
}

/// Reads a frame body after the DLE STX header: unstuffs DLEs until the
/// DLE ETX trailer, then reads the two CRC bytes. Returns the payload and
/// the received CRC (low byte first, as on the wire).
pub fn read_frame_body(r: &mut impl Read) -> Result<(Vec<u8>, [u8; 2])> {
    let mut payload = Vec::new();
    let mut dle = false;
    loop {
        let b = read_byte(r, "frame byte (T1)")?;
        if b == ETX && dle {
            let crc = [read_byte(r, "CRC (T1)")?, read_byte(r, "CRC (T1)")?];
            return Ok((payload, crc));
        } else if b == DLE {
            if !dle {
                dle = true;
                continue;
            }
            // The second DLE of a stuffed pair; keep one.
            dle = false;
        } else if dle {
            return Err(Error::Framing("DLE without sense".into()));
        }
        payload.push(b);
    }
}

/// A payment terminal on a serial line.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `device` with the ZVT line parameters and asserts RTS/DTR.
    pub fn open(device: &str) -> Result<SerialTransport> {
        let mut port = serialport::new(device, 9600)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::Two)
            .flow_control(serialport::FlowControl::None)
            .timeout(TIMEOUT_T2)
            .open()
            .map_err(|e| Error::TransportConnect(format!("{}: {}", device, e)))?;
        port.write_request_to_send(true)
            .map_err(|e| Error::TransportConnect(e.to_string()))?;
        port.write_data_terminal_ready(true)
            .map_err(|e| Error::TransportConnect(e.to_string()))?;
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| Error::TransportConnect(e.to_string()))?;
        Ok(SerialTransport { port })
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| Error::Protocol(format!("cannot set timeout: {}", e)))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn write_ack(&mut self) -> Result<()> {
        self.write_all(&[ACK])
    }

    fn write_nak(&mut self) -> Result<()> {
        self.write_all(&[NAK])
    }

    /// Reads one frame (header, body, CRC), without acknowledging it.
    fn read_frame(&mut self, timeout: Duration) -> Result<(Vec<u8>, [u8; 2])> {
        self.set_timeout(timeout)?;
        let header = [
            read_byte(&mut self.port, "header (T2)")?,
            read_byte(&mut self.port, "header (T2)")?,
        ];
        check_header(header)?;
        self.set_timeout(TIMEOUT_T1)?;
        read_frame_body(&mut self.port)
    }

    /// Waits for the PT's ACK/NAK after a frame. Some terminals answer
    /// with nothing at first, so empty reads are retried for a while.
    fn read_acknowledgement(&mut self) -> Result<()> {
        let deadline = Instant::now() + ACK_WAIT;
        self.set_timeout(ACK_WAIT)?;
        loop {
            match read_byte(&mut self.port, "acknowledgement") {
                Ok(ACK) => return Ok(()),
                Ok(NAK) => return Err(Error::Protocol("transmit failed: PT answered NAK".into())),
                Ok(b) => {
                    return Err(Error::Protocol(format!(
                        "unknown acknowledgement byte 0x{:02x}",
                        b
                    )))
                }
                Err(Error::Timeout(_)) if Instant::now() < deadline => continue,
                Err(Error::Timeout(_)) => {
                    return Err(Error::Timeout("no acknowledgement from PT".into()))
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl super::Transport for SerialTransport {
    fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>> {
        let message = frame(apdu);
        debug!(">> {}", hex::encode(&message));
        self.write_all(&message)?;
        self.read_acknowledgement()?;
        if no_wait {
            return Ok(None);
        }
        self.receive(TIMEOUT_T2).map(Some)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        for attempt in 0..CRC_RETRIES {
            let (payload, crc) = match self.read_frame(timeout) {
                Ok(frame) => frame,
                Err(e) => {
                    // Whatever this was, it was not a well-formed frame.
                    let _ = self.write_nak();
                    return Err(e);
                }
            };
            let expected = frame_crc(&payload);
            if crc == [(expected & 0xFF) as u8, (expected >> 8) as u8] {
                self.write_ack()?;
                debug!("<< {}", hex::encode(&payload));
                return Ok(payload);
            }
            warn!(attempt, "CRC checksum error");
            self.write_nak()?;
        }
        Err(Error::Framing(format!(
            "CRC mismatch in {} attempts",
            CRC_RETRIES
        )))
    }

    fn reset(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| Error::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s.replace(' ', "")).unwrap()
    }

    #[test]
    fn test_frame_registration() {
        assert_eq!(
            frame(&unhex("06 00 06 12 34 56 BA 09 78")),
            unhex("10 02 06 00 06 12 34 56 BA 09 78 10 03 24 C3")
        );
    }

    #[test]
    fn test_frame_initialisation() {
        assert_eq!(
            frame(&unhex("06 93 03 12 34 56")),
            unhex("10 02 06 93 03 12 34 56 10 03 CA A4")
        );
    }

    #[test]
    fn test_frame_stuffs_dle() {
        // The authorisation amount contains a 0x10 byte, which gets
        // doubled on the wire but is not CRC'd twice.
        assert_eq!(
            frame(&unhex("06 01 0A 04 00 00 00 01 10 00 49 09 78")),
            unhex("10 02 06 01 0A 04 00 00 00 01 10 10 00 49 09 78 10 03 F2 FF")
        );
    }

    #[test]
    fn test_frame_more_captures() {
        for (apdu, framed) in [
            ("06 70 00", "10 02 06 70 00 10 03 D9 F9"),
            ("80 00 00", "10 02 80 00 00 10 03 F5 1F"),
            ("84 9C 00", "10 02 84 9C 00 10 03 C3 41"),
            ("06 18 00", "10 02 06 18 00 10 03 56 3A"),
            ("05 01 03 12 34 56", "10 02 05 01 03 12 34 56 10 03 E0 43"),
        ] {
            assert_eq!(frame(&unhex(apdu)), unhex(framed), "frame({})", apdu);
        }
    }

    #[test]
    fn test_frame_display_text() {
        assert_eq!(
            frame(&unhex(
                "06 E0 25 F1 F1 F6 46 41 48 52 45 52 4E 55 4D 4D 45 52 20 \
                 20 20 20 F2 F1 F5 45 49 4E 47 45 42 45 4E 20 55 4E 44 20 4F 4B"
            )),
            unhex(
                "10 02 06 E0 25 F1 F1 F6 46 41 48 52 45 52 4E 55 4D 4D 45 52 20 \
                 20 20 20 F2 F1 F5 45 49 4E 47 45 42 45 4E 20 55 4E 44 20 4F 4B \
                 10 03 DE CD"
            )
        );
    }

    fn deframe(framed: &[u8]) -> Result<(Vec<u8>, [u8; 2])> {
        let mut r = Cursor::new(framed.to_vec());
        let mut header = [0u8; 2];
        r.read_exact(&mut header).unwrap();
        check_header(header)?;
        read_frame_body(&mut r)
    }

    #[test]
    fn test_deframe_inverts_frame() {
        for apdu in [
            unhex("06 00 06 12 34 56 BA 09 78"),
            unhex("06 01 0A 04 00 00 00 01 10 00 49 09 78"),
            unhex("10 10 10"), // worst case: all DLEs
            vec![],
        ] {
            let framed = frame(&apdu);
            let (payload, crc) = deframe(&framed).unwrap();
            assert_eq!(payload, apdu);
            let expected = frame_crc(&payload);
            assert_eq!(crc, [(expected & 0xFF) as u8, (expected >> 8) as u8]);
        }
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(
            deframe(&unhex("06 02 00")),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn test_orphan_dle() {
        // DLE followed by something that is neither DLE nor ETX.
        assert!(matches!(
            deframe(&unhex("10 02 06 10 41 10 03 00 00")),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn test_truncated_frame_times_out() {
        assert!(matches!(
            deframe(&unhex("10 02 06 00")),
            Err(Error::Timeout(_))
        ));
    }
}

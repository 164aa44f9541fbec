//! TCP transport: bare APDUs over a socket, no framing, no CRC.
//!
//! Message boundaries come from the APDU's own length field. The device
//! URI looks like `socket://192.168.1.163:20007?connect_timeout=10`; IPv6
//! hosts may be bracketed, and for compatibility with existing
//! configurations an unbracketed address is split at its last colon.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::serial::{TIMEOUT_T1, TIMEOUT_T2};
use crate::errors::{Error, Result};

pub const URI_SCHEME: &str = "socket://";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUri {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl SocketUri {
    pub fn parse(uri: &str) -> Result<SocketUri> {
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| Error::TransportConnect(format!("not a socket:// URI: {}", uri)))?;

        let (addr, query) = match rest.split_once('?') {
            Some((addr, query)) => (addr, Some(query)),
            None => (rest, None),
        };

        let mut connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        if let Some(query) = query {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("connect_timeout", value)) => {
                        let seconds: u64 = value.parse().map_err(|_| {
                            Error::TransportConnect(format!(
                                "invalid connect_timeout: {:?}",
                                value
                            ))
                        })?;
                        connect_timeout = Duration::from_secs(seconds);
                    }
                    _ => {
                        return Err(Error::TransportConnect(format!(
                            "unknown URI parameter: {:?}",
                            pair
                        )))
                    }
                }
            }
        }

        let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
            // Bracketed IPv6 literal.
            let (host, port) = rest.split_once("]:").ok_or_else(|| {
                Error::TransportConnect(format!("malformed bracketed host: {}", addr))
            })?;
            (host, port)
        } else {
            // The last colon separates the port, so bare IPv6 literals keep
            // working.
            addr.rsplit_once(':').ok_or_else(|| {
                Error::TransportConnect(format!("missing port in URI: {}", uri))
            })?
        };
        let port: u16 = port
            .parse()
            .map_err(|_| Error::TransportConnect(format!("invalid port: {:?}", port)))?;

        Ok(SocketUri {
            host: host.to_owned(),
            port,
            connect_timeout,
        })
    }
}

/// A payment terminal behind a TCP socket.
pub struct SocketTransport {
    stream: TcpStream,
}

impl SocketTransport {
    pub fn connect(uri: &str) -> Result<SocketTransport> {
        let uri = SocketUri::parse(uri)?;
        let addr = (uri.host.as_str(), uri.port)
            .to_socket_addrs()
            .map_err(|e| Error::TransportConnect(format!("{}: {}", uri.host, e)))?
            .next()
            .ok_or_else(|| {
                Error::TransportConnect(format!("no address for {}", uri.host))
            })?;
        let stream = TcpStream::connect_timeout(&addr, uri.connect_timeout)
            .map_err(|e| Error::TransportConnect(format!("{}: {}", addr, e)))?;
        Ok(SocketTransport { stream })
    }

    pub fn from_stream(stream: TcpStream) -> SocketTransport {
        SocketTransport { stream }
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout: Duration, what: &str) -> Result<()> {
        self.stream
            .set_read_timeout(Some(timeout))
            .map_err(Error::Io)?;
        match self.stream.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Err(Error::Timeout(format!("reading {}", what)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads one APDU; the length comes from the APDU's own length field.
    fn read_apdu(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut head = [0u8; 3];
        self.read_exact_timeout(&mut head, timeout, "APDU header")?;
        let mut apdu = head.to_vec();

        let length = if head[2] == 0xFF {
            let mut ext = [0u8; 2];
            self.read_exact_timeout(&mut ext, TIMEOUT_T1, "extended length")?;
            apdu.extend_from_slice(&ext);
            ext[0] as usize | (ext[1] as usize) << 8
        } else {
            head[2] as usize
        };

        let mut body = vec![0u8; length];
        self.read_exact_timeout(&mut body, TIMEOUT_T1, "APDU body")?;
        apdu.extend_from_slice(&body);
        debug!("<< {}", hex::encode(&apdu));
        Ok(apdu)
    }
}

impl super::Transport for SocketTransport {
    fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>> {
        debug!(">> {}", hex::encode(apdu));
        self.stream.write_all(apdu)?;
        if no_wait {
            return Ok(None);
        }
        self.read_apdu(TIMEOUT_T2).map(Some)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.read_apdu(timeout)
    }

    fn insert_delays(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;

    #[test]
    fn test_uri_parsing() {
        for (uri, host, port) in [
            ("socket://hostname:123", "hostname", 123),
            ("socket://192.168.123.12:456", "192.168.123.12", 456),
            (
                "socket://2001:0db8:85a3:0000:0000:8a2e:0370:7334:789",
                "2001:0db8:85a3:0000:0000:8a2e:0370:7334",
                789,
            ),
            ("socket://[::1]:20007", "::1", 20007),
        ] {
            let parsed = SocketUri::parse(uri).unwrap();
            assert_eq!(parsed.host, host, "{}", uri);
            assert_eq!(parsed.port, port, "{}", uri);
            assert_eq!(parsed.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        }
    }

    #[test]
    fn test_uri_connect_timeout() {
        let parsed = SocketUri::parse("socket://host:20007?connect_timeout=3").unwrap();
        assert_eq!(parsed.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_uri_errors() {
        assert!(SocketUri::parse("tcp://host:1").is_err());
        assert!(SocketUri::parse("socket://host").is_err());
        assert!(SocketUri::parse("socket://host:notaport").is_err());
        assert!(SocketUri::parse("socket://host:1?frobnicate=1").is_err());
    }

    #[test]
    fn test_loopback_exchange() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Expect the status enquiry, answer with a completion.
            let mut buf = vec![0u8; 6];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(buf, hex::decode("050103123456").unwrap());
            stream
                .write_all(&hex::decode("060f0106").unwrap())
                .unwrap();
        });

        let mut transport =
            SocketTransport::connect(&format!("socket://127.0.0.1:{}", addr.port())).unwrap();
        let response = transport
            .send(&hex::decode("050103123456").unwrap(), false)
            .unwrap()
            .unwrap();
        assert_eq!(response, hex::decode("060f0106").unwrap());
        server.join().unwrap();
    }
}

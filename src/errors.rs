use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a ZVT exchange can go wrong.
///
/// The framing layer retries CRC failures on its own (up to three times);
/// everything else propagates to the transmission engine, which terminates
/// the running command and hands the error to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial framing violation: bad header, orphan DLE, or a CRC mismatch
    /// that survived the retry budget.
    #[error("framing error: {0}")]
    Framing(String),

    /// A read deadline expired (T1 between bytes, T2 for the header, or the
    /// ACK poll).
    #[error("timeout: {0}")]
    Timeout(String),

    /// The peer violated the protocol (unexpected acknowledgement byte,
    /// response after a terminal state, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A positional field could not be parsed. Carries the full original
    /// payload as hex so the offending capture can be replayed.
    #[error("{reason} in data: {payload}")]
    ParseField { reason: String, payload: String },

    /// An unknown bitmap tag in the positional tail of a packet.
    #[error("Invalid bitmap 0x{tag:02X} in data: {payload}")]
    ParseBitmap { tag: u8, payload: String },

    /// Construction-time schema violation: a required field after an
    /// optional one, a missing length, a value that does not fit its codec.
    #[error("schema error: {0}")]
    Schema(String),

    /// The transport could not be opened or connected.
    #[error("transport connect failed: {0}")]
    TransportConnect(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Parse error for `payload`, which is kept as hex for the message.
    pub fn parse(reason: impl Into<String>, payload: &[u8]) -> Self {
        Error::ParseField {
            reason: reason.into(),
            payload: hex::encode(payload),
        }
    }

    /// True for the two error kinds the Completion backtracker may recover
    /// from by blacklisting an ignorable field.
    pub(crate) fn is_parse(&self) -> bool {
        matches!(self, Error::ParseField { .. } | Error::ParseBitmap { .. })
    }
}

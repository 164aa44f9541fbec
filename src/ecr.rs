//! High-level ECR client: the common terminal flows over one transport.
//!
//! [`Ecr`] wires a [`Transmission`] engine to a device and exposes the
//! flows a cash register actually runs: register, pay, end-of-day,
//! reservations, status polling, file upload. Anything more exotic can go
//! through [`Ecr::transmit`] with a hand-built [`Packet`].

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use tap::TapFallible;
use tracing::{debug, warn};

use crate::charset::CharacterSet;
use crate::context;
use crate::errors::{Error, Result};
use crate::packets::defs::{self, WriteFiles};
use crate::packets::Packet;
use crate::transmission::{Direction, Outcome, Transmission};
use crate::transport::{self, serial, Transport};
use crate::types::{terminal_status_text, ConfigByte, CurrencyCode};

/// Pause between commands on transports that want breathing room.
const INTER_COMMAND_DELAY: Duration = Duration::from_millis(200);

pub struct Ecr {
    transmission: Transmission<Box<dyn Transport>>,
    password: String,
    /// Terminal ID, captured from the registration completion.
    pub terminal_id: Option<String>,
    /// PT software version, captured from the first status enquiry.
    pub version: Option<String>,
    status: Option<u8>,
    registered: bool,
}

impl Ecr {
    /// Connects to a PT. `device` is a serial device path or a
    /// `socket://<host>:<port>` URI.
    pub fn connect(device: &str, password: &str) -> Result<Ecr> {
        let transport = transport::connect(device)?;
        Ok(Ecr {
            transmission: Transmission::new(transport),
            password: password.to_owned(),
            terminal_id: None,
            version: None,
            status: None,
            registered: false,
        })
    }

    pub fn transmission(&self) -> &Transmission<Box<dyn Transport>> {
        &self.transmission
    }

    /// Whether a registration has succeeded since connecting (or the last
    /// reset/log-off).
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Sends one command, inserting the inter-command delay where the
    /// transport wants it. All the flows below go through here.
    pub fn transmit(&mut self, packet: Packet) -> Result<Outcome> {
        if self.transmission.transport().insert_delays() {
            std::thread::sleep(INTER_COMMAND_DELAY);
        }
        self.transmission.transmit(packet)
    }

    pub fn transmit_with_listener(
        &mut self,
        packet: Packet,
        listener: &mut dyn FnMut(&Packet),
    ) -> Result<Outcome> {
        if self.transmission.transport().insert_delays() {
            std::thread::sleep(INTER_COMMAND_DELAY);
        }
        self.transmission.transmit_with_listener(packet, listener)
    }

    /// Registers the ECR at the PT, locking its menus for production use.
    /// Captures the terminal ID and the announced character set from the
    /// completion.
    pub fn register(&mut self, config_byte: ConfigByte) -> Result<Outcome> {
        let packet = defs::registration(&self.password, config_byte, Some(CurrencyCode::Eur))?;
        let outcome = self.transmit(packet)?;

        if let Some(completion) = outcome.completion() {
            self.registered = true;
            self.terminal_id = completion
                .get("tid")
                .and_then(|v| v.as_bcd())
                .map(str::to_owned);
            adopt_character_set(completion);
        }
        Ok(outcome)
    }

    /// Registers without locking the PT's master menu. Not for production.
    pub fn register_unlocked(&mut self) -> Result<Outcome> {
        self.register(ConfigByte::DEFAULT - ConfigByte::ECR_CONTROLS_ADMIN)
    }

    /// Runs a payment over `amount_cents`. `true` if the payment went
    /// through, `false` if it was declined or aborted.
    pub fn payment(&mut self, amount_cents: u64) -> Result<bool> {
        let packet = defs::authorisation(amount_cents, Some(CurrencyCode::Eur))?;
        let outcome = self
            .transmit(packet)
            .tap_err(|e| warn!("payment failed: {}", e))?;
        Ok(outcome.completion().is_some())
    }

    /// Runs the end-of-day cycle. The day log, if the PT prints one, is in
    /// [`last_printout`](Self::last_printout) afterwards.
    pub fn end_of_day(&mut self) -> Result<Outcome> {
        let packet = defs::end_of_day(&self.password)?;
        self.transmit(packet)
    }

    /// All print lines of the most recent command, in order.
    pub fn last_printout(&self) -> Vec<String> {
        self.transmission
            .last_history()
            .iter()
            .filter(|(direction, _)| *direction == Direction::Incoming)
            .filter(|(_, p)| p.is(&defs::PRINT_LINE))
            .filter_map(|(_, p)| p.get("text")?.as_str().map(str::to_owned))
            .collect()
    }

    /// Enquires the PT status. Returns the terminal status byte (0x00 is
    /// "PT ready"); also captures the software version when the PT sends
    /// one.
    pub fn status(&mut self) -> Result<Option<u8>> {
        let packet = defs::status_enquiry(&self.password)?;
        let outcome = self.transmit(packet)?;
        let completion = match outcome.completion() {
            Some(completion) => completion,
            None => return Ok(None),
        };
        if self.version.is_none() {
            self.version = completion.sw_version().map(str::to_owned);
        }
        adopt_character_set(completion);
        self.status = completion.terminal_status();
        Ok(self.status)
    }

    /// The text for the most recent status byte.
    pub fn status_text(&self) -> &'static str {
        self.status
            .and_then(terminal_status_text)
            .unwrap_or("Unknown Status")
    }

    /// Polls the PT every `poll` until it reports ready.
    pub fn wait_for_status(&mut self, poll: Duration) -> Result<()> {
        loop {
            match self.status()? {
                Some(0x00) => return Ok(()),
                status => {
                    debug!(?status, "PT not ready: {}", self.status_text());
                    std::thread::sleep(poll);
                }
            }
        }
    }

    /// Displays up to four lines on the PT for `duration` seconds (0 means
    /// forever).
    pub fn show_text(&mut self, lines: &[&str], duration: u8, beeps: u8) -> Result<Outcome> {
        self.transmit(defs::display_text(lines, duration, beeps)?)
    }

    /// Restarts/resets the PT; registration is lost.
    pub fn restart(&mut self) -> Result<Outcome> {
        self.registered = false;
        self.transmit(defs::reset_terminal())
    }

    /// Forces the PT to run a network initialisation.
    pub fn initialise(&mut self) -> Result<Outcome> {
        self.transmit(defs::initialisation(&self.password)?)
    }

    /// Sets the terminal ID; requires an initialisation afterwards.
    pub fn set_terminal_id(&mut self, terminal_id: &str) -> Result<Outcome> {
        self.transmit(defs::set_terminal_id(&self.password, terminal_id)?)
    }

    pub fn log_off(&mut self) -> Result<Outcome> {
        self.registered = false;
        self.transmit(defs::log_off())
    }

    pub fn diagnosis(&mut self) -> Result<Outcome> {
        self.transmit(defs::diagnosis())
    }

    /// Requests a reservation (pre-authorisation) over `amount_cents`.
    pub fn request_reservation(&mut self, amount_cents: u64, timeout: u8) -> Result<bool> {
        let packet =
            defs::reservation_request(amount_cents, Some(CurrencyCode::Eur), timeout)?;
        Ok(self.transmit(packet)?.completion().is_some())
    }

    /// Releases the unused part of reservation `receipt`.
    pub fn reverse_reservation(&mut self, receipt: &str, amount_cents: u64) -> Result<bool> {
        let packet =
            defs::reservation_partial_reversal(receipt, amount_cents, Some(CurrencyCode::Eur))?;
        Ok(self.transmit(packet)?.completion().is_some())
    }

    /// Books the used-up amount of reservation `receipt`.
    pub fn book_reservation(&mut self, receipt: &str, amount_cents: u64) -> Result<bool> {
        let packet =
            defs::reservation_book_total(receipt, amount_cents, Some(CurrencyCode::Eur))?;
        Ok(self.transmit(packet)?.completion().is_some())
    }

    /// The receipt numbers of reservations not yet reversed or booked.
    /// The PT reports them in an Abort packet; no open reservations is not
    /// an error but an empty list.
    pub fn open_reservations(&mut self) -> Result<Vec<String>> {
        let packet = defs::open_reservations_enquiry()?;
        match self.transmit(packet)? {
            Outcome::Aborted { packet } => Ok(packet.receipt_numbers()),
            Outcome::Completed { .. } => Ok(Vec::new()),
        }
    }

    /// Uploads files to the PT (08 14), answering its chunk requests.
    pub fn write_files(&mut self, files: BTreeMap<u8, Vec<u8>>) -> Result<Outcome> {
        let mut cmd = WriteFiles::new(&self.password, files)?;
        if self.transmission.transport().insert_delays() {
            std::thread::sleep(INTER_COMMAND_DELAY);
        }
        self.transmission.transmit_command(&mut cmd, None)
    }

    pub fn read_card(&mut self, timeout: u8) -> Result<Outcome> {
        self.transmit(defs::read_card(timeout)?)
    }

    pub fn close_card_session(&mut self) -> Result<Outcome> {
        self.transmit(defs::close_card_session())
    }
}

/// Adopts the character set a completion announces (terminal config TLV
/// 27, tag 14) as the default for all further text fields.
fn adopt_character_set(completion: &Packet) {
    let code = match completion.tlv().and_then(|t| t.int_at(&[0x27, 0x14])) {
        Some(code) => code,
        None => return,
    };
    match CharacterSet::try_from(code as u8) {
        Ok(set) => {
            debug!(?set, "PT announced character set");
            context::set_global_character_set(set);
        }
        Err(_) => warn!(code, "PT announced an unknown character set"),
    }
}

/// A hex dump decoded by [`parse_represented`].
#[derive(Debug, PartialEq)]
pub enum Represented {
    Ack,
    Nak,
    Packet(Packet),
}

/// Decodes a hex dump as captured from a line trace: a serial frame
/// (leading DLE), a bare ACK/NAK byte, or an unframed APDU.
pub fn parse_represented(dump: &str) -> Result<Represented> {
    let data = hex::decode(dump.replace(char::is_whitespace, ""))
        .map_err(|e| Error::Protocol(format!("not a hex dump: {}", e)))?;
    match data.as_slice() {
        [serial::ACK] => return Ok(Represented::Ack),
        [serial::NAK] => return Ok(Represented::Nak),
        [serial::DLE, ..] => {
            let mut r = std::io::Cursor::new(&data[..]);
            let mut header = [0u8; 2];
            r.read_exact(&mut header)?;
            serial::check_header(header)?;
            let (payload, crc) = serial::read_frame_body(&mut r)?;
            let expected = serial::frame_crc(&payload);
            if crc != [(expected & 0xFF) as u8, (expected >> 8) as u8] {
                return Err(Error::Framing("CRC mismatch in dump".into()));
            }
            return Packet::parse(&payload).map(Represented::Packet);
        }
        _ => {}
    }
    Packet::parse(&data).map(Represented::Packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedTransport {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[&str]) -> Box<dyn Transport> {
            Box::new(ScriptedTransport {
                responses: responses
                    .iter()
                    .map(|s| hex::decode(s.replace(' ', "")).unwrap())
                    .collect(),
                sent: Vec::new(),
            })
        }

        fn pop(&mut self) -> Result<Vec<u8>> {
            self.responses
                .pop_front()
                .ok_or_else(|| Error::Timeout("script exhausted".into()))
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>> {
            self.sent.push(apdu.to_vec());
            if no_wait {
                Ok(None)
            } else {
                self.pop().map(Some)
            }
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
            self.pop()
        }

        fn insert_delays(&self) -> bool {
            false
        }
    }

    fn ecr_with(responses: &[&str]) -> Ecr {
        Ecr {
            transmission: Transmission::new(ScriptedTransport::new(responses)),
            password: "123456".into(),
            terminal_id: None,
            version: None,
            status: None,
            registered: false,
        }
    }

    #[test]
    fn test_register_captures_terminal_id() {
        let mut ecr = ecr_with(&[
            "80 00 00",
            // Completion with status byte, TID, currency, charset TLV.
            "06 0F 11 19 00 29 52 00 12 33 49 09 78 06 05 27 03 14 01 FF",
        ]);
        let outcome = ecr.register(ConfigByte::DEFAULT).unwrap();
        assert!(outcome.completion().is_some());
        assert_eq!(ecr.terminal_id.as_deref(), Some("52001233"));
    }

    #[test]
    fn test_payment_success_and_abort() {
        let mut ecr = ecr_with(&[
            "80 00 00",
            "06 0F 01 00",
            // Second payment gets aborted by the cardholder.
            "80 00 00",
            "06 1E 01 6C",
        ]);
        assert!(ecr.payment(50).unwrap());
        assert!(!ecr.payment(50).unwrap());
    }

    #[test]
    fn test_status_records_version() {
        let mut ecr = ecr_with(&["80 00 00", "06 0F 0B F0 F0 F7 32 2E 31 34 2E 31 35 00"]);
        assert_eq!(ecr.status().unwrap(), Some(0x00));
        assert_eq!(ecr.version.as_deref(), Some("2.14.15"));
        assert_eq!(ecr.status_text(), "PT ready");
    }

    #[test]
    fn test_end_of_day_printout() {
        let mut ecr = ecr_with(&[
            "80 00 00",
            "06 D1 05 00 41 42 43 44",
            "06 D1 17 00 20 20 20 20 20 20 20 20 20 4B 61 73 73 65 6E 73 63 68 6E 69 74 74",
            "06 0F 01 00",
        ]);
        let outcome = ecr.end_of_day().unwrap();
        assert!(outcome.completion().is_some());
        assert_eq!(
            ecr.last_printout(),
            vec!["ABCD", "         Kassenschnitt"]
        );
    }

    #[test]
    fn test_open_reservations() {
        let mut ecr = ecr_with(&[
            "80 00 00",
            "06 1E 04 B8 87 FF FF",
            "80 00 00",
            "06 1E 11 B8 87 01 23 06 11 23 09 08 02 45 67 08 02 78 90",
        ]);
        assert!(ecr.open_reservations().unwrap().is_empty());
        assert_eq!(
            ecr.open_reservations().unwrap(),
            vec!["0123", "4567", "7890"]
        );
    }

    #[test]
    fn test_parse_represented_framed() {
        let parsed =
            parse_represented("10 02 06 00 06 12 34 56 BA 09 78 10 03 24 C3").unwrap();
        match parsed {
            Represented::Packet(p) => {
                assert!(p.is(&defs::REGISTRATION));
                assert_eq!(p.get("password").unwrap().as_bcd(), Some("123456"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_represented_ack_nak() {
        assert_eq!(parse_represented("06").unwrap(), Represented::Ack);
        assert_eq!(parse_represented("15").unwrap(), Represented::Nak);
    }

    #[test]
    fn test_parse_represented_bad_crc() {
        assert!(matches!(
            parse_represented("10 02 06 00 06 12 34 56 BA 09 78 10 03 24 C4"),
            Err(Error::Framing(_))
        ));
    }
}

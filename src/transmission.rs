//! The transmission engine: one logical command from the moment the ECR
//! sends it until the PT hands master rights back.
//!
//! The ECR is the master of the protocol, but most commands temporarily
//! make the PT master: it streams intermediate responses (status
//! information, print lines, sub-requests such as file reads) which the
//! ECR acknowledges with Packet Received (80 00), until a terminating
//! Completion or Abort arrives. One command owns the transport exclusively
//! for its whole duration.

use tap::TapFallible;
use tracing::{debug, trace_span, warn};

use crate::errors::Result;
use crate::packets::{defs, Packet};
use crate::transport::serial::TIMEOUT_T2;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A command the engine can run. Plain [`Packet`]s implement this; commands
/// that must react to PT sub-requests (Write Files) carry extra state.
pub trait Command {
    fn packet(&self) -> &Packet;

    fn wait_for_completion(&self) -> bool {
        self.packet().schema().wait_for_completion
    }

    /// Offered every response before the standard handling. Returning a
    /// packet makes the engine send it as the answer to a PT sub-request;
    /// the PT does not acknowledge such a reply.
    fn answer(&mut self, _response: &Packet) -> Result<Option<Packet>> {
        Ok(None)
    }
}

impl Command for Packet {
    fn packet(&self) -> &Packet {
        self
    }
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The PT is done with us. `completion` carries the Completion packet,
    /// or `None` when the command ended on a bare acknowledgement
    /// (or a Packet Received Error).
    Completed { completion: Option<Packet> },
    /// The PT aborted the command; the packet carries the result code and
    /// possibly TLV detail.
    Aborted { packet: Packet },
}

impl Outcome {
    /// `0` on completion, the abort result code otherwise.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Completed { .. } => 0,
            Outcome::Aborted { packet } => packet.result_code().unwrap_or(0xFF),
        }
    }

    /// The Completion packet, if the command produced one.
    pub fn completion(&self) -> Option<&Packet> {
        match self {
            Outcome::Completed { completion } => completion.as_ref(),
            Outcome::Aborted { .. } => None,
        }
    }
}

/// Drives commands over a [`Transport`], keeping a packet history.
pub struct Transmission<T: Transport> {
    transport: T,
    history: Vec<(Direction, Packet)>,
    last_start: usize,
}

impl<T: Transport> Transmission<T> {
    pub fn new(transport: T) -> Transmission<T> {
        Transmission {
            transport,
            history: Vec::new(),
            last_start: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Every packet exchanged since this engine was created.
    pub fn history(&self) -> &[(Direction, Packet)] {
        &self.history
    }

    /// The packets of the most recent command.
    pub fn last_history(&self) -> &[(Direction, Packet)] {
        &self.history[self.last_start..]
    }

    pub fn transmit(&mut self, packet: Packet) -> Result<Outcome> {
        let mut packet = packet;
        self.transmit_command(&mut packet, None)
    }

    pub fn transmit_with_listener(
        &mut self,
        packet: Packet,
        listener: &mut dyn FnMut(&Packet),
    ) -> Result<Outcome> {
        let mut packet = packet;
        self.transmit_command(&mut packet, Some(listener))
    }

    /// Runs one command to its terminal state.
    pub fn transmit_command(
        &mut self,
        cmd: &mut dyn Command,
        mut listener: Option<&mut dyn FnMut(&Packet)>,
    ) -> Result<Outcome> {
        let span = trace_span!("transmit", command = cmd.packet().schema().name);
        let _enter = span.enter();

        self.last_start = self.history.len();
        let apdu = cmd.packet().serialize()?;
        self.history.push((Direction::Outgoing, cmd.packet().clone()));

        let mut next = self
            .transport
            .send(&apdu, false)
            .tap_err(|e| warn!("sending {} failed: {}", cmd.packet().schema().name, e))?
            .ok_or_else(|| crate::errors::Error::Protocol("transport returned no response".into()))?;

        loop {
            let response = Packet::parse(&next)?;
            debug!(name = response.schema().name, "response");
            self.history.push((Direction::Incoming, response.clone()));

            // Sub-requests (the PT exercising its master role) go to the
            // command first.
            if let Some(reply) = cmd.answer(&response)? {
                let bytes = reply.serialize()?;
                self.history.push((Direction::Outgoing, reply));
                self.transport.send(&bytes, true)?;
                next = self.transport.receive(TIMEOUT_T2)?;
                continue;
            }

            if response.is(&defs::PACKET_RECEIVED) {
                if !cmd.wait_for_completion() {
                    return Ok(Outcome::Completed { completion: None });
                }
            } else if response.is(&defs::PACKET_RECEIVED_ERROR) {
                warn!(
                    code = response.control_field()[1],
                    "PT reported a packet receive error"
                );
                return Ok(Outcome::Completed { completion: None });
            } else if response.is(&defs::COMPLETION) {
                self.send_received()?;
                return Ok(Outcome::Completed {
                    completion: Some(response),
                });
            } else if response.is(&defs::ABORT) {
                self.send_received()?;
                return Ok(Outcome::Aborted { packet: response });
            } else if response.is(&defs::STATUS_INFORMATION)
                || response.is(&defs::INTERMEDIATE_STATUS)
                || response.is(&defs::PRINT_LINE)
                || response.is(&defs::PRINT_TEXT_BLOCK)
            {
                self.send_received()?;
                if let Some(l) = listener.as_mut() {
                    l(&response);
                }
            } else {
                warn!(
                    control = ?response.control_field(),
                    "unexpected response packet"
                );
                self.send_received()?;
            }

            next = self.transport.receive(TIMEOUT_T2)?;
        }
    }

    /// Acknowledges the packet the PT just sent, without waiting for
    /// anything in return.
    fn send_received(&mut self) -> Result<()> {
        let ack = defs::packet_received();
        let bytes = ack.serialize()?;
        self.history.push((Direction::Outgoing, ack));
        self.transport.send(&bytes, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::packets::defs::WriteFiles;
    use crate::tlv::Tlv;
    use std::collections::{BTreeMap, VecDeque};
    use std::time::Duration;

    /// A transport that hands out scripted responses and records what was
    /// sent over it.
    #[derive(Default)]
    struct MockTransport {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<(Vec<u8>, bool)>,
    }

    impl MockTransport {
        fn scripted(responses: &[&str]) -> MockTransport {
            MockTransport {
                responses: responses
                    .iter()
                    .map(|s| hex::decode(s.replace(' ', "")).unwrap())
                    .collect(),
                sent: Vec::new(),
            }
        }

        fn pop(&mut self) -> Result<Vec<u8>> {
            self.responses
                .pop_front()
                .ok_or_else(|| Error::Timeout("no scripted response left".into()))
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, apdu: &[u8], no_wait: bool) -> Result<Option<Vec<u8>>> {
            self.sent.push((apdu.to_vec(), no_wait));
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

    #[test]
    fn test_fire_and_forget_ends_on_packet_received() {
        let transport = MockTransport::scripted(&["80 00 00"]);
        let mut tm = Transmission::new(transport);
        let outcome = tm
            .transmit(defs::display_text(&["Hello world!"], 5, 0).unwrap())
            .unwrap();
        assert_eq!(outcome, Outcome::Completed { completion: None });
        assert_eq!(outcome.code(), 0);
        // Only the command itself went out; an ack is not acknowledged.
        assert_eq!(tm.transport().sent.len(), 1);
        assert_eq!(tm.last_history().len(), 2);
    }

    #[test]
    fn test_command_runs_to_completion() {
        let transport = MockTransport::scripted(&[
            // Packet received, then two intermediates, then completion.
            "80 00 00",
            "04 FF 02 0A 01",
            "06 D1 05 00 41 42 43 44",
            "06 0F 01 00",
        ]);
        let mut tm = Transmission::new(transport);
        let mut seen = Vec::new();
        let outcome = tm
            .transmit_with_listener(defs::status_enquiry("123456").unwrap(), &mut |p| {
                seen.push(p.schema().name)
            })
            .unwrap();

        let completion = outcome.completion().expect("no completion packet");
        assert_eq!(completion.terminal_status(), Some(0x00));
        assert_eq!(seen, vec!["intermediate_status", "print_line"]);

        // The enquiry, then one 80 00 per intermediate and one for the
        // completion.
        let sent = &tm.transport().sent;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].0[..2], [0x05, 0x01]);
        for (bytes, no_wait) in &sent[1..] {
            assert_eq!(bytes, &hex::decode("800000").unwrap());
            assert!(no_wait);
        }
    }

    #[test]
    fn test_abort_carries_result_code() {
        let transport = MockTransport::scripted(&["80 00 00", "06 1E 01 6C"]);
        let mut tm = Transmission::new(transport);
        let outcome = tm
            .transmit(defs::authorisation(50, None).unwrap())
            .unwrap();
        assert_eq!(outcome.code(), 0x6C);
        assert!(outcome.completion().is_none());
        // The abort still gets acknowledged.
        assert_eq!(
            tm.transport().sent.last().unwrap(),
            &(hex::decode("800000").unwrap(), true)
        );
    }

    #[test]
    fn test_packet_received_error_terminates() {
        let transport = MockTransport::scripted(&["84 9C 00"]);
        let mut tm = Transmission::new(transport);
        let outcome = tm
            .transmit(defs::status_enquiry("123456").unwrap())
            .unwrap();
        assert_eq!(outcome, Outcome::Completed { completion: None });
    }

    #[test]
    fn test_unknown_response_is_acked_and_skipped() {
        let transport = MockTransport::scripted(&["0F F0 00", "06 0F 01 00"]);
        let mut tm = Transmission::new(transport);
        let outcome = tm
            .transmit(defs::status_enquiry("123456").unwrap())
            .unwrap();
        assert!(outcome.completion().is_some());
        assert_eq!(tm.transport().sent.len(), 3);
    }

    #[test]
    fn test_write_files_answers_file_requests() {
        // The PT requests file 32 from offset 0, then completes.
        let mut request = Packet::new(&defs::REQUEST_FILE);
        {
            let tlv = request.tlv_mut().unwrap();
            let mut entry = Tlv::new(0x2D);
            entry.set(&[0x1D], vec![32u8]).unwrap();
            entry.set(&[0x1E], 0u32.to_be_bytes().to_vec()).unwrap();
            tlv.push_child(entry);
        }
        let request_hex = hex::encode(request.serialize().unwrap());

        let transport =
            MockTransport::scripted(&["80 00 00", &request_hex, "06 0F 01 00"]);
        let mut tm = Transmission::new(transport);

        let mut files = BTreeMap::new();
        files.insert(32u8, b"Test 123".to_vec());
        let mut cmd = WriteFiles::new("000000", files).unwrap();
        let outcome = tm.transmit_command(&mut cmd, None).unwrap();
        assert!(outcome.completion().is_some());

        // Second send is the file-content reply, sent without waiting.
        let sent = &tm.transport().sent;
        let (reply, no_wait) = &sent[1];
        assert!(no_wait);
        let reply = Packet::parse(reply).unwrap();
        assert!(reply.is(&defs::PACKET_RECEIVED));
        assert_eq!(
            reply.tlv().unwrap().bytes_at(&[0x2D, 0x1C]),
            Some(&b"Test 123"[..])
        );

        // History keeps the sub-exchange in order.
        let names: Vec<_> = tm
            .last_history()
            .iter()
            .map(|(d, p)| (*d, p.schema().name))
            .collect();
        assert_eq!(
            names,
            vec![
                (Direction::Outgoing, "write_files"),
                (Direction::Incoming, "packet_received"),
                (Direction::Incoming, "request_file"),
                (Direction::Outgoing, "packet_received"),
                (Direction::Incoming, "completion"),
                (Direction::Outgoing, "packet_received"),
            ]
        );
    }

    #[test]
    fn test_transport_timeout_aborts_command() {
        let transport = MockTransport::scripted(&["80 00 00"]);
        let mut tm = Transmission::new(transport);
        let err = tm
            .transmit(defs::status_enquiry("123456").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}

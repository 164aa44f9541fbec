//! The registered packet schemas, plus typed constructors for the packets
//! an ECR sends and accessors for the ones it receives.
//!
//! Control fields and field layouts follow the ZVT specification chapters
//! noted on each schema.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::fields::{FieldCodec, TextTable, VarLen, VarPayload, PASSWORD};
use crate::packets::schema::{field, ignorable, optional, Schema};
use crate::packets::Packet;
use crate::tlv::Tlv;
use crate::transmission::Command;
use crate::types::{ConfigByte, CurrencyCode};

const fn base(name: &'static str, class: u8, instr: u8) -> Schema {
    Schema {
        name,
        class: Some(class),
        instr: Some(instr),
        wait_for_completion: false,
        fields: &[],
        allowed_bitmaps: None,
        required_bitmaps: &[],
        override_bitmaps: &[],
        dispatch: true,
    }
}

/// Fallback for control fields nothing else claims: no positional fields,
/// the whole body is parsed as bitmaps.
pub static APDU: Schema = Schema {
    name: "apdu",
    class: None,
    instr: None,
    wait_for_completion: false,
    fields: &[],
    allowed_bitmaps: None,
    required_bitmaps: &[],
    override_bitmaps: &[],
    dispatch: false,
};

/// 06 00 Registration (chapter 2.1): sign the ECR on, lock the PT menus.
pub static REGISTRATION: Schema = Schema {
    wait_for_completion: true,
    fields: &[
        field("password", PASSWORD),
        field("config_byte", FieldCodec::Byte),
        optional("cc", FieldCodec::BcdInt(2)),
    ],
    ..base("registration", 0x06, 0x00)
};

/// 06 01 Authorisation (chapter 2.2): the payment itself.
pub static AUTHORISATION: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&[
        "amount",
        "currency_code",
        "status_byte",
        "track_1",
        "card_expire",
        "card_number",
        "track_2",
        "track_3",
        "timeout",
        "max_status_infos",
        "pump_nr",
        "cvv",
        "additional",
        "card_type",
        "tlv",
    ]),
    ..base("authorisation", 0x06, 0x01)
};

/// 06 02 Log Off.
pub static LOG_OFF: Schema = base("log_off", 0x06, 0x02);

/// 06 0F Completion: the PT hands master rights back to the ECR.
///
/// The `sw_version` field is optional but comes first, and whether it is
/// present depends on a bit in the preceding enquiry that is not on the
/// wire. It is an LLLVAR though, so it always starts with `Fx Fy Fz` bytes;
/// `terminal_status` is one arbitrary byte, and the only allowed bitmaps
/// will not match an `Fx` header. Marking both fields ignorable lets the
/// backtracking walk in `Packet::parse` find the one consistent reading.
pub static COMPLETION: Schema = Schema {
    wait_for_completion: false,
    fields: &[
        ignorable(
            "sw_version",
            FieldCodec::Var(VarLen::LLL, VarPayload::Text(TextTable::Zvt7Bit)),
        ),
        ignorable("terminal_status", FieldCodec::Byte),
    ],
    allowed_bitmaps: Some(&["tlv", "status_byte", "tid", "currency_code"]),
    ..base("completion", 0x06, 0x0F)
};

/// 06 18 Reset Terminal.
pub static RESET_TERMINAL: Schema = Schema {
    wait_for_completion: true,
    ..base("reset_terminal", 0x06, 0x18)
};

/// 06 1B Set Terminal ID; needs an initialisation afterwards.
pub static SET_TERMINAL_ID: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    ..base("set_terminal_id", 0x06, 0x1B)
};

/// 06 1E Abort: failure with a one-byte result code, optionally TLV detail.
pub static ABORT: Schema = Schema {
    fields: &[field("result_code", FieldCodec::Byte)],
    ..base("abort", 0x06, 0x1E)
};

/// 06 22 Reservation (pre-authorisation).
pub static RESERVATION_REQUEST: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&[
        "amount",
        "currency_code",
        "status_byte",
        "track_1",
        "card_expire",
        "card_number",
        "track_2",
        "track_3",
        "timeout",
        "max_status_infos",
        "pump_nr",
        "cvv",
        "additional",
        "card_type",
        "tlv",
    ]),
    ..base("reservation_request", 0x06, 0x22)
};

/// 06 23 Partial Reversal of a reservation, also used to book it.
pub static RESERVATION_PARTIAL_REVERSAL: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&[
        "receipt",
        "amount",
        "currency_code",
        "additional",
        "trace_number",
        "aid",
        "tlv",
    ]),
    ..base("reservation_partial_reversal", 0x06, 0x23)
};

/// 06 23 with receipt FF FF: enquire the open reservations instead. Shares
/// its control field with the partial reversal, so it never dispatches.
pub static OPEN_RESERVATIONS_ENQUIRY: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&["receipt"]),
    dispatch: false,
    ..base("open_reservations_enquiry", 0x06, 0x23)
};

/// 06 24 Book Total: book the used-up part of a reservation.
pub static RESERVATION_BOOK_TOTAL: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&[
        "receipt",
        "amount",
        "currency_code",
        "status_byte",
        "additional",
        "trace_number",
        "card_type",
        "aid",
        "tlv",
    ]),
    ..base("reservation_book_total", 0x06, 0x24)
};

/// 06 50 End Of Day.
pub static END_OF_DAY: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    ..base("end_of_day", 0x06, 0x50)
};

/// 06 70 Diagnosis.
pub static DIAGNOSIS: Schema = Schema {
    wait_for_completion: true,
    ..base("diagnosis", 0x06, 0x70)
};

/// 06 93 Initialisation: force a network initialisation.
pub static INITIALISATION: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    ..base("initialisation", 0x06, 0x93)
};

/// 06 B0 Abort Command: abort a running transaction; allowed without
/// master rights.
pub static ABORT_COMMAND: Schema = base("abort_command", 0x06, 0xB0);

/// 06 C0 Read Card. New implementations should poll with Status Readout
/// instead of an infinite timeout here.
pub static READ_CARD: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("timeout", FieldCodec::Byte)],
    allowed_bitmaps: Some(&["status_byte", "dialog_control", "tlv"]),
    ..base("read_card", 0x06, 0xC0)
};

/// 06 C5 Close Card Session.
pub static CLOSE_CARD_SESSION: Schema = base("close_card_session", 0x06, 0xC5);

/// 06 D1 Print Line, PT to ECR.
pub static PRINT_LINE: Schema = Schema {
    fields: &[
        field("attribute", FieldCodec::Byte),
        optional("text", FieldCodec::Text(TextTable::Context)),
    ],
    ..base("print_line", 0x06, 0xD1)
};

/// 06 D3 Print Text Block: like Print Line, but one TLV per receipt.
pub static PRINT_TEXT_BLOCK: Schema = Schema {
    required_bitmaps: &["tlv"],
    ..base("print_text_block", 0x06, 0xD3)
};

/// 06 E0 Display Text. Only lines 1-4 can be used by BZT terminals.
pub static DISPLAY_TEXT: Schema = Schema {
    allowed_bitmaps: Some(&[
        "display_duration",
        "line1",
        "line2",
        "line3",
        "line4",
        "line5",
        "line6",
        "line7",
        "line8",
        "beeps",
    ]),
    ..base("display_text", 0x06, 0xE0)
};

/// 06 E2 Display Text with numerical input.
pub static DISPLAY_TEXT_INT_INPUT: Schema = base("display_text_int_input", 0x06, 0xE2);

/// 05 01 Status Enquiry.
pub static STATUS_ENQUIRY: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    ..base("status_enquiry", 0x05, 0x01)
};

/// 04 0C Request File: the PT asks for a chunk during Write Files.
pub static REQUEST_FILE: Schema = base("request_file", 0x04, 0x0C);

/// 04 0F Status Information.
pub static STATUS_INFORMATION: Schema = base("status_information", 0x04, 0x0F);

/// 04 FF Intermediate Status Information.
pub static INTERMEDIATE_STATUS: Schema = Schema {
    fields: &[
        field("intermediate_status", FieldCodec::Byte),
        optional("timeout", FieldCodec::Byte),
    ],
    ..base("intermediate_status", 0x04, 0xFF)
};

/// 08 13 Change PT Configuration.
pub static CHANGE_PT_CONFIG: Schema = Schema {
    wait_for_completion: true,
    allowed_bitmaps: Some(&["tlv"]),
    ..base("change_pt_config", 0x08, 0x13)
};

/// 08 14 Write Files. Its encoded form collides with the reversal family,
/// so it opts out of dispatch.
pub static WRITE_FILES: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    dispatch: false,
    ..base("write_files", 0x08, 0x14)
};

/// 08 50 Activate Card Reader.
pub static ACTIVATE_CARD_READER: Schema = Schema {
    fields: &[field("activate", FieldCodec::Byte)],
    ..base("activate_card_reader", 0x08, 0x50)
};

/// 0F 10 Kassenbericht, a CardComplete vendor report.
pub static KASSENBERICHT: Schema = Schema {
    wait_for_completion: true,
    fields: &[field("password", PASSWORD)],
    ..base("kassenbericht", 0x0F, 0x10)
};

/// 80 00 Packet Received, the flow-control acknowledgement.
pub static PACKET_RECEIVED: Schema = base("packet_received", 0x80, 0x00);

/// 84 XX Packet Received Error; the instruction byte carries the error.
pub static PACKET_RECEIVED_ERROR: Schema = Schema {
    instr: None,
    ..base("packet_received_error", 0x84, 0x00)
};

/// Every schema `Packet::parse` considers, in dispatch order. Wildcards
/// come last so they cannot shadow specific control fields.
pub static REGISTRY: &[&Schema] = &[
    &REGISTRATION,
    &AUTHORISATION,
    &LOG_OFF,
    &COMPLETION,
    &RESET_TERMINAL,
    &SET_TERMINAL_ID,
    &ABORT,
    &RESERVATION_REQUEST,
    &RESERVATION_PARTIAL_REVERSAL,
    &OPEN_RESERVATIONS_ENQUIRY,
    &RESERVATION_BOOK_TOTAL,
    &END_OF_DAY,
    &DIAGNOSIS,
    &INITIALISATION,
    &ABORT_COMMAND,
    &READ_CARD,
    &CLOSE_CARD_SESSION,
    &PRINT_LINE,
    &PRINT_TEXT_BLOCK,
    &DISPLAY_TEXT,
    &DISPLAY_TEXT_INT_INPUT,
    &STATUS_ENQUIRY,
    &REQUEST_FILE,
    &STATUS_INFORMATION,
    &INTERMEDIATE_STATUS,
    &CHANGE_PT_CONFIG,
    &WRITE_FILES,
    &ACTIVATE_CARD_READER,
    &KASSENBERICHT,
    &PACKET_RECEIVED,
    &PACKET_RECEIVED_ERROR,
];

pub fn registration(
    password: &str,
    config_byte: ConfigByte,
    cc: Option<CurrencyCode>,
) -> Result<Packet> {
    let mut p = Packet::new(&REGISTRATION)
        .with("password", password)?
        .with("config_byte", config_byte.bits())?;
    if let Some(cc) = cc {
        p.set("cc", u16::from(cc))?;
    }
    Ok(p)
}

pub fn authorisation(amount_cents: u64, currency: Option<CurrencyCode>) -> Result<Packet> {
    let mut p = Packet::new(&AUTHORISATION).with("amount", amount_cents)?;
    if let Some(cc) = currency {
        p.set("currency_code", u16::from(cc))?;
    }
    Ok(p)
}

pub fn initialisation(password: &str) -> Result<Packet> {
    Packet::new(&INITIALISATION).with("password", password)
}

pub fn status_enquiry(password: &str) -> Result<Packet> {
    Packet::new(&STATUS_ENQUIRY).with("password", password)
}

pub fn end_of_day(password: &str) -> Result<Packet> {
    Packet::new(&END_OF_DAY).with("password", password)
}

pub fn set_terminal_id(password: &str, tid: &str) -> Result<Packet> {
    Packet::new(&SET_TERMINAL_ID)
        .with("password", password)?
        .with("tid", tid)
}

pub fn log_off() -> Packet {
    Packet::new(&LOG_OFF)
}

pub fn reset_terminal() -> Packet {
    Packet::new(&RESET_TERMINAL)
}

pub fn diagnosis() -> Packet {
    Packet::new(&DIAGNOSIS)
}

pub fn abort_command() -> Packet {
    Packet::new(&ABORT_COMMAND)
}

pub fn close_card_session() -> Packet {
    Packet::new(&CLOSE_CARD_SESSION)
}

pub fn packet_received() -> Packet {
    Packet::new(&PACKET_RECEIVED)
}

pub fn read_card(timeout: u8) -> Result<Packet> {
    Packet::new(&READ_CARD).with("timeout", timeout)
}

/// `lines` beyond the display size are ignored by the PT; duration 0 means
/// forever.
pub fn display_text(lines: &[&str], duration: u8, beeps: u8) -> Result<Packet> {
    let mut p = Packet::new(&DISPLAY_TEXT).with("display_duration", duration)?;
    for (i, line) in lines.iter().enumerate().take(8) {
        p.set(LINE_NAMES[i], *line)?;
    }
    if beeps > 0 {
        p.set("beeps", beeps)?;
    }
    Ok(p)
}

const LINE_NAMES: [&str; 8] = [
    "line1", "line2", "line3", "line4", "line5", "line6", "line7", "line8",
];

pub fn reservation_request(
    amount_cents: u64,
    currency: Option<CurrencyCode>,
    timeout: u8,
) -> Result<Packet> {
    let mut p = Packet::new(&RESERVATION_REQUEST).with("amount", amount_cents)?;
    if let Some(cc) = currency {
        p.set("currency_code", u16::from(cc))?;
    }
    p.set("timeout", timeout)?;
    Ok(p)
}

pub fn reservation_partial_reversal(
    receipt: &str,
    amount_cents: u64,
    currency: Option<CurrencyCode>,
) -> Result<Packet> {
    let mut p = Packet::new(&RESERVATION_PARTIAL_REVERSAL)
        .with("receipt", receipt)?
        .with("amount", amount_cents)?;
    if let Some(cc) = currency {
        p.set("currency_code", u16::from(cc))?;
    }
    Ok(p)
}

pub fn reservation_book_total(
    receipt: &str,
    amount_cents: u64,
    currency: Option<CurrencyCode>,
) -> Result<Packet> {
    let mut p = Packet::new(&RESERVATION_BOOK_TOTAL)
        .with("receipt", receipt)?
        .with("amount", amount_cents)?;
    if let Some(cc) = currency {
        p.set("currency_code", u16::from(cc))?;
    }
    Ok(p)
}

/// The receipt number FF FF turns the partial reversal into an enquiry for
/// the first reservation not yet reversed or booked.
pub fn open_reservations_enquiry() -> Result<Packet> {
    Packet::new(&OPEN_RESERVATIONS_ENQUIRY).with("receipt", "FFFF")
}

impl Packet {
    /// Completion: the PT software version, when announced.
    pub fn sw_version(&self) -> Option<&str> {
        self.get("sw_version")?.as_str()
    }

    /// Completion: the terminal status byte. See
    /// [`terminal_status_text`](crate::types::terminal_status_text).
    pub fn terminal_status(&self) -> Option<u8> {
        Some(self.get("terminal_status")?.as_int()? as u8)
    }

    /// Completion: the PT serial number from the device-information TLV.
    pub fn serial_number(&self) -> Option<&str> {
        self.tlv()?
            .get(&[0xE4])?
            .children()?
            .iter()
            .find(|c| c.tag() == Some(0x1F42))?
            .value()?
            .as_bcd()
    }

    /// Abort: the one-byte result code.
    pub fn result_code(&self) -> Option<u8> {
        Some(self.get("result_code")?.as_int()? as u8)
    }

    /// Abort: every receipt number carried, from bitmap 87 and/or the TLV
    /// receipt-numbers container. The FF FF sentinel ("nothing open") is
    /// skipped, as are duplicates.
    pub fn receipt_numbers(&self) -> Vec<String> {
        let mut receipts: Vec<String> = Vec::new();
        if let Some(receipt) = self.get("receipt").and_then(|v| v.as_bcd()) {
            if receipt != "ffff" {
                receipts.push(receipt.to_owned());
            }
        }
        if let Some(list) = self.tlv().and_then(|t| t.get(&[0x23])).and_then(|n| n.children()) {
            for node in list.iter().filter(|n| n.tag() == Some(0x08)) {
                if let Some(receipt) = node.value().and_then(|v| v.as_bcd()) {
                    if receipt != "ffff" && !receipts.iter().any(|r| r == receipt) {
                        receipts.push(receipt.to_owned());
                    }
                }
            }
        }
        receipts
    }
}

/// 08 14 Write Files as a full command: announces the files, then answers
/// the PT's 04 0C Request File sub-requests chunk by chunk.
#[derive(Debug)]
pub struct WriteFiles {
    packet: Packet,
    files: BTreeMap<u8, Vec<u8>>,
}

/// How much file content fits one Request File answer.
const WRITE_FILES_CHUNK: usize = 65000;

impl WriteFiles {
    pub fn new(password: &str, files: BTreeMap<u8, Vec<u8>>) -> Result<WriteFiles> {
        let mut packet = Packet::new(&WRITE_FILES).with("password", password)?;
        let tlv = packet.tlv_mut()?;
        for (id, content) in &files {
            let mut entry = Tlv::new(0x2D);
            entry.set(&[0x1D], vec![*id])?;
            entry.set(&[0x1F00], (content.len() as u32).to_be_bytes().to_vec())?;
            tlv.push_child(entry);
        }
        Ok(WriteFiles { packet, files })
    }
}

impl Command for WriteFiles {
    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn answer(&mut self, response: &Packet) -> Result<Option<Packet>> {
        if !response.is(&REQUEST_FILE) {
            return Ok(None);
        }
        let request = match response.tlv() {
            Some(tlv) => tlv,
            None => return Ok(None),
        };
        let file_id = match request.int_at(&[0x2D, 0x1D]) {
            Some(id) => id as u8,
            None => return Ok(None),
        };
        let offset = request.int_at(&[0x2D, 0x1E]).unwrap_or(0) as usize;
        let content = match self.files.get(&file_id) {
            Some(content) => content,
            None => return Ok(None),
        };
        let offset = offset.min(content.len());
        let chunk = &content[offset..(offset + WRITE_FILES_CHUNK).min(content.len())];

        let mut reply = packet_received();
        let tlv = reply.tlv_mut()?;
        let mut entry = Tlv::new(0x2D);
        entry.set(&[0x1D], vec![file_id])?;
        entry.set(&[0x1E], (offset as u32).to_be_bytes().to_vec())?;
        entry.set(&[0x1C], chunk.to_vec())?;
        tlv.push_child(entry);
        Ok(Some(reply))
    }
}

//! The global bitmap dictionary (ZVT chapter 9, "bitmaps").
//!
//! A bitmap is a one-byte tag introducing an optional typed field in the
//! unordered tail of a packet. Individual schemas may shadow entries via
//! their `override_bitmaps` table.

use super::schema::{bitmap, BitmapDef};
use crate::fields::{FieldCodec, LLSTRING, LLLVAR, LLVAR};

const BYTE: FieldCodec = FieldCodec::Byte;

pub static BITMAPS: &[BitmapDef] = &[
    bitmap(0x01, "timeout", BYTE, "binary time-out"),
    bitmap(0x02, "max_status_infos", BYTE, "binary max. status infos"),
    bitmap(0x03, "service_byte", BYTE, "binary service-byte"),
    bitmap(0x04, "amount", FieldCodec::BcdInt(6), "amount in cents"),
    bitmap(0x05, "pump_nr", BYTE, "binary pump-Nr."),
    bitmap(0x06, "tlv", FieldCodec::Tlv, "TLV container"),
    bitmap(0x0B, "trace_number", FieldCodec::Bcd(3), "trace-number"),
    bitmap(0x0C, "time", FieldCodec::Bcd(3), "time, HH MM SS"),
    bitmap(0x0D, "date_day", FieldCodec::Bcd(2), "date, MM DD (see AA)"),
    bitmap(0x0E, "card_expire", FieldCodec::Bcd(2), "expiry-date, YY MM"),
    bitmap(0x17, "card_sequence_number", FieldCodec::Bcd(2), "card sequence-number"),
    bitmap(0x19, "status_byte", BYTE, "binary status-byte/payment-type/card-type"),
    bitmap(0x22, "card_number", LLVAR, "card number / PAN, 'E' masks a digit"),
    bitmap(0x23, "track_2", LLVAR, "track 2 data, 'E' masks a digit"),
    bitmap(0x24, "track_3", LLLVAR, "track 3 data, 'E' masks a digit"),
    bitmap(0x27, "result_code", BYTE, "binary result-code"),
    bitmap(0x29, "tid", FieldCodec::Bcd(4), "terminal identifier"),
    bitmap(0x2A, "vu", FieldCodec::Fixed(15), "ASCII VU-number"),
    bitmap(0x2D, "track_1", LLVAR, "track 1 data"),
    bitmap(0x2E, "sync_chip_data", LLLVAR, "synchronous chip data"),
    bitmap(0x37, "trace_number_original", FieldCodec::Bcd(3), "trace-number of the original transaction for reversal"),
    bitmap(0x3A, "cvv", FieldCodec::Bcd(2), "CVV, optionally used for mail order"),
    bitmap(0x3B, "aid", FieldCodec::Fixed(8), "AID authorisation-attribute"),
    bitmap(0x3C, "additional", LLLVAR, "additional-data/additional-text"),
    bitmap(0x3D, "password", FieldCodec::Bcd(3), "password"),
    bitmap(0x49, "currency_code", FieldCodec::BcdInt(2), "currency code"),
    bitmap(0x60, "totals", LLLVAR, "individual totals"),
    bitmap(0x87, "receipt", FieldCodec::Bcd(2), "receipt-number"),
    bitmap(0x88, "turnover", FieldCodec::Bcd(3), "turnover record number"),
    bitmap(0x8A, "card_type", BYTE, "binary card-type (comparison 8C)"),
    bitmap(0x8B, "card_name", LLVAR, "card-name"),
    bitmap(0x8C, "card_operator", BYTE, "binary card-type-ID of the network operator (comparison 8A)"),
    bitmap(0x92, "offline_chip", LLLVAR, "additional-data ec-Cash with chip offline"),
    bitmap(0x9A, "geldkarte", LLLVAR, "Geldkarte payment/failed-payment/total record"),
    bitmap(0xA0, "result_code_as", BYTE, "binary result-code-AS"),
    bitmap(0xA7, "chip_ef_id", LLVAR, "chip-data, EF_ID"),
    bitmap(0xAA, "date", FieldCodec::Bcd(3), "date, YY MM DD (see 0D)"),
    bitmap(0xAF, "ef_info", LLLVAR, "EF_Info"),
    bitmap(0xBA, "aid_param", FieldCodec::Fixed(5), "binary AID-parameter"),
    bitmap(0xD0, "algo_key", BYTE, "binary algorithm-key"),
    bitmap(0xD1, "offset", LLVAR, "card offset/PIN-data"),
    bitmap(0xD2, "direction", BYTE, "binary direction"),
    bitmap(0xD3, "key_position", BYTE, "binary key-position"),
    bitmap(0xE0, "input_min", BYTE, "binary min. length of the input"),
    bitmap(0xE1, "iline1", LLSTRING, "text2 line 1"),
    bitmap(0xE2, "iline2", LLSTRING, "text2 line 2"),
    bitmap(0xE3, "iline3", LLSTRING, "text2 line 3"),
    bitmap(0xE4, "iline4", LLSTRING, "text2 line 4"),
    bitmap(0xE5, "iline5", LLSTRING, "text2 line 5"),
    bitmap(0xE6, "iline6", LLSTRING, "text2 line 6"),
    bitmap(0xE7, "iline7", LLSTRING, "text2 line 7"),
    bitmap(0xE8, "iline8", LLSTRING, "text2 line 8"),
    bitmap(0xE9, "max_input_length", BYTE, "binary max. length of the input"),
    bitmap(0xEA, "input_echo", BYTE, "binary echo the input"),
    bitmap(0xEB, "mac", FieldCodec::Fixed(8), "binary MAC over text 1 and text 2"),
    bitmap(0xF0, "display_duration", BYTE, "binary display-duration"),
    bitmap(0xF1, "line1", LLSTRING, "text1 line 1"),
    bitmap(0xF2, "line2", LLSTRING, "text1 line 2"),
    bitmap(0xF3, "line3", LLSTRING, "text1 line 3"),
    bitmap(0xF4, "line4", LLSTRING, "text1 line 4"),
    bitmap(0xF5, "line5", LLSTRING, "text1 line 5"),
    bitmap(0xF6, "line6", LLSTRING, "text1 line 6"),
    bitmap(0xF7, "line7", LLSTRING, "text1 line 7"),
    bitmap(0xF8, "line8", LLSTRING, "text1 line 8"),
    bitmap(0xF9, "beeps", BYTE, "binary number of beep-tones"),
    bitmap(0xFA, "status", BYTE, "binary status"),
    bitmap(0xFB, "ok_required", BYTE, "binary confirm the input with <OK>"),
    bitmap(0xFC, "dialog_control", BYTE, "binary dialog-control"),
];

//! Shared wire-level enums and flag bytes.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags! {
    /// Registration config byte (ZVT chapter 2.1): which receipts the ECR
    /// prints itself and which flows it wants to control.
    pub struct ConfigByte: u8 {
        const ECR_PRINTS_PAYMENT = 0x02;
        const ECR_PRINTS_ADMIN = 0x04;
        const ECR_INTERMEDIATE_STATUS = 0x08;
        const ECR_CONTROLS_PAYMENT = 0x10;
        const ECR_CONTROLS_ADMIN = 0x20;
        const ECR_USE_PRINT_LINES = 0x80;
    }
}

impl ConfigByte {
    /// Everything except the admin receipt; what most installations want.
    pub const DEFAULT: ConfigByte = ConfigByte::from_bits_truncate(0xBA);
}

bitflags! {
    /// Registration service byte (bitmap 0x03).
    #[derive(Default)]
    pub struct ServiceByte: u8 {
        const SERVICE_MENU_NOT_ASSIGNED = 0x01;
        const USE_CAPITALS = 0x02;
    }
}

bitflags! {
    /// Vendor deviations from the ZVT specification, activated through the
    /// [`context`](crate::context).
    #[derive(Default)]
    pub struct VendorQuirks: u8 {
        /// FEIG cVEND terminals use private TLV tags 0xFF00..0xFFFF as
        /// primitive even though bit 5 says constructed.
        const FEIG_CVEND = 0x01;
    }
}

/// ISO 4217 numeric currency codes the protocol is used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum CurrencyCode {
    Eur = 978,
}

/// TLV tag 0x1F10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CardholderIdentification {
    None = 0,
    Signature = 1,
    PinOnline = 2,
    PinOfflineEncrypted = 3,
    PinOfflinePlaintext = 4,
    SignatureAndPinOfflineEncrypted = 5,
    SignatureAndPinOfflinePlaintext = 6,
    SignatureAndPinOnline = 7,
    Unknown = 0xFF,
}

/// TLV tag 0x1F11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OnlineTag {
    Offline = 0,
    Online = 1,
}

/// File identifiers for Write Files (08 14) / Request File (04 0C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FileId {
    MerchantJournal = 0x01,
    ApplicationLogFile = 0x02,
    EcrProtocolLogFile = 0x03,
    CommunicationModuleLogFile = 0x04,
    PinPadLogFile = 0x05,
    ReconciliationData = 0x06,
}

/// Human-readable text for a PT status byte (Status Enquiry / Completion),
/// ZVT chapter "Status-Codes".
pub fn terminal_status_text(status: u8) -> Option<&'static str> {
    Some(match status {
        0x00 => "PT ready",
        0x51 => "initialisation necessary",
        0x62 => "date/time incorrect",
        0x9A => "OPT data not available",
        0x9B => "diagnosis required",
        0x9C => "please do the end-of-day",
        0xB1 => "memory full",
        0xB2 => "merchant journal full",
        0xBF => "voltage supply too low",
        0xC0 => "card slot defective",
        0xC1 => "shutter closed",
        0xD2 => "printer not operational",
        0xDC => "card inserted",
        0xDF => "out of order",
        0xE0 => "remote maintenance activated",
        0xE1 => "card not completely removed",
        0xE2 => "card reader does not answer",
        _ => return None,
    })
}

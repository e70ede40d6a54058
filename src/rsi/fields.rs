// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Field descriptors for every numeric RSI field: display label, filter key, width, bit mask
//! and the value/range tables used to describe a decoded value.
use crate::rsi::codec::BitField;

/// Describes a numeric value, either by exact match or by inclusive range.
#[derive(Debug, Clone, Copy)]
pub enum Strings {
    None,
    Values(&'static [(u32, &'static str)]),
    Ranges(&'static [(u32, u32, &'static str)]),
}

impl Strings {
    pub fn lookup(&self, value: u32) -> Option<&'static str> {
        match self {
            Strings::None => None,
            Strings::Values(table) => table
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, name)| *name),
            Strings::Ranges(table) => table
                .iter()
                .find(|(lo, hi, _)| (*lo..=*hi).contains(&value))
                .map(|(_, _, name)| *name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    /// Width of the raw word in bytes.
    pub width: usize,
    pub mask: u32,
    pub strings: Strings,
}

impl FieldSpec {
    const fn new(
        key: &'static str,
        label: &'static str,
        width: usize,
        mask: u32,
        strings: Strings,
    ) -> Self {
        Self {
            key,
            label,
            width,
            mask,
            strings,
        }
    }

    pub fn extract(&self, raw: u32) -> u32 {
        BitField::new(self.mask).extract(raw)
    }

    fn hex_digits(&self) -> usize {
        if self.mask == 0 {
            self.width * 2
        } else {
            let bits = 32 - self.mask.leading_zeros() - self.mask.trailing_zeros();
            (bits as usize).div_ceil(4)
        }
    }

    /// `Label: Name (0x..)` when the value has a name, `Label: 0x..` otherwise.
    pub fn describe(&self, value: u32) -> String {
        let width = self.hex_digits() + 2;
        match self.strings.lookup(value) {
            Some(name) => format!("{}: {} ({:#0width$x})", self.label, name, value),
            None => format!("{}: {:#0width$x}", self.label, value),
        }
    }
}

static SERVICE_ACCESS_POINT: [(u32, u32, &str); 3] = [
    (0x0000, 0x7FFF, "RSI Initiator Instance (ISAP) or RSI Responder Instance (RSAP)"),
    (0x8000, 0xFFFE, "Reserved"),
    (0xFFFF, 0xFFFF, "CON-SAP"),
];

static PDU_TYPE_TYPE: [(u32, u32, &str); 6] = [
    (0x00, 0x02, "Reserved"),
    (0x03, 0x03, "RTA_TYPE_ACK"),
    (0x04, 0x04, "RTA_TYPE_ERR"),
    (0x05, 0x05, "RTA_TYPE_FREQ"),
    (0x06, 0x06, "RTA_TYPE_FRSP"),
    (0x07, 0x0F, "Reserved"),
];

static PDU_TYPE_VERSION: [(u32, u32, &str); 4] = [
    (0x00, 0x00, "Reserved"),
    (0x01, 0x01, "Version 1 of the protocol"),
    (0x02, 0x02, "Version 2 of the protocol"),
    (0x03, 0x0F, "Reserved"),
];

static WINDOW_SIZE: [(u32, &str); 8] = [
    (0x00, "Reserved"),
    (0x01, "Unknown WindowSize"),
    (0x02, "Smallest WindowSize"),
    (0x03, "Optional usable WindowSize"),
    (0x04, "Optional usable WindowSize"),
    (0x05, "Optional usable WindowSize"),
    (0x06, "Optional usable WindowSize"),
    (0x07, "Optional usable WindowSize"),
];

static TACK: [(u32, &str); 2] = [
    (0x00, "No immediate acknowledge"),
    (0x01, "Immediate acknowledge"),
];

static MORE_FRAG: [(u32, &str); 2] = [(0x00, "Last fragment"), (0x01, "More fragments follows")];

static NOTIFICATION: [(u32, &str); 2] = [
    (0x00, "No action necessary"),
    (
        0x01,
        "The ApplicationReadyBlock is available for reading with the service ReadNotification",
    ),
];

static SEQ_NUM: [(u32, u32, &str); 4] = [
    (0x0000, 0x7FFF, "synchronization and transmission between initiator and responder"),
    (0x8000, 0xFFFD, "Reserved"),
    (0xFFFE, 0xFFFE, "synchronize initiator and responder for establishment of an AR"),
    (0xFFFF, 0xFFFF, "Reserved"),
];

static VAR_PART_LEN: [(u32, u32, &str); 3] = [
    (0x0000, 0x0000, "No RTA-SDU or RSI-SDU exists"),
    (0x0001, 0x0598, "An RTA-SDU or RSI-PDU with VarPartLen octets exists"),
    (0x0599, 0xFFFF, "Reserved"),
];

static F_OPNUM_OFFSET_OFFSET_STRINGS: [(u32, u32, &str); 3] = [
    (0x0000_0000, 0x0000_0000, "First fragment"),
    (0x0000_0001, 0x0000_0003, "Reserved"),
    (0x0000_0004, 0x00FF_FFFF, "Not first fragment"),
];

static F_OPNUM_OFFSET_OPNUM_STRINGS: [(u32, u32, &str); 12] = [
    (0x00, 0x00, "Connect"),
    (0x01, 0x01, "Reserved"),
    (0x02, 0x02, "Read"),
    (0x03, 0x03, "Write"),
    (0x04, 0x04, "Control"),
    (0x05, 0x05, "ReadImplicit"),
    (0x06, 0x06, "ReadConnectionless"),
    (0x07, 0x07, "ReadNotification"),
    (0x08, 0x08, "PrmWriteMore"),
    (0x09, 0x09, "PrmWriteEnd"),
    (0x0A, 0x0A, "SecurityAssociationControl"),
    (0x0B, 0x1F, "Reserved"),
];

static CALL_SEQUENCE: [(u32, u32, &str); 1] = [(0x00, 0x07, "Allowed values")];

static RSP_MAX_LENGTH_STRINGS: [(u32, u32, &str); 3] = [
    (0x0000_0000, 0x0000_0003, "Reserved"),
    (0x0000_0004, 0x00FF_FFFF, "Usable"),
    (0x0100_0000, 0xFFFF_FFFF, "Reserved"),
];

static RSI_INTERFACE_STRINGS: [(u32, u32, &str); 5] = [
    (0x00, 0x00, "IO device interface"),
    (0x01, 0x01, "Read Implicit IO device interface"),
    (0x02, 0x02, "CIM device interface"),
    (0x03, 0x03, "Read Implicit CIM device interface"),
    (0x04, 0xFF, "Reserved"),
];

static PROTECTION_MODE_STRINGS: [(u32, &str); 2] =
    [(0x00, "Authentication only"), (0x01, "Authenticated encryption")];

static GENERATION_NUMBER_STRINGS: [(u32, u32, &str); 1] = [(
    0x00,
    0x0F,
    "Addresses the stage of the PRO state machine which is to be used",
)];

static SECURITY_LENGTH_STRINGS: [(u32, u32, &str); 2] = [
    (0x0000, 0x0000, "Reserved"),
    (0x0001, 0x07FF, "Usable for length information"),
];

static SECURITY_SEQUENCE_COUNTER_STRINGS: [(u32, u32, &str); 3] = [
    (0x0000_0000, 0x0000_0000, "reserved"),
    (0x0000_0001, 0x0FFF_FFFF, "Usable values"),
    (
        0x1000_0000,
        0xFFFF_FFFF,
        "Usable values, this range indicates to the caller a key update sequence via SecurityControl.NextContextID",
    ),
];

pub static DST_SRV_ACCESS_POINT: FieldSpec = FieldSpec::new(
    "pn_rsi.dst_srv_access_point",
    "DestinationServiceAccessPoint",
    2,
    0,
    Strings::Ranges(&SERVICE_ACCESS_POINT),
);
pub static SRC_SRV_ACCESS_POINT: FieldSpec = FieldSpec::new(
    "pn_rsi.src_srv_access_point",
    "SourceServiceAccessPoint",
    2,
    0,
    Strings::Ranges(&SERVICE_ACCESS_POINT),
);

pub static PDU_TYPE_TYPE_FIELD: FieldSpec = FieldSpec::new(
    "pn_rsi.pdu_type.type",
    "Type",
    1,
    0x0F,
    Strings::Ranges(&PDU_TYPE_TYPE),
);
pub static PDU_TYPE_VERSION_FIELD: FieldSpec = FieldSpec::new(
    "pn_rsi.pdu_type.version",
    "Version",
    1,
    0xF0,
    Strings::Ranges(&PDU_TYPE_VERSION),
);

pub static ADD_FLAGS_WINDOW_SIZE: FieldSpec = FieldSpec::new(
    "pn_rsi.add_flags_windowsize",
    "WindowSize",
    1,
    0x07,
    Strings::Values(&WINDOW_SIZE),
);
pub static ADD_FLAGS_RESERVED1: FieldSpec =
    FieldSpec::new("pn_rsi.add_flags_reserved", "Reserved", 1, 0x08, Strings::None);
pub static ADD_FLAGS_TACK: FieldSpec = FieldSpec::new(
    "pn_rsi.add_flags_tack",
    "TACK",
    1,
    0x10,
    Strings::Values(&TACK),
);
pub static ADD_FLAGS_MORE_FRAG: FieldSpec = FieldSpec::new(
    "pn_rsi.add_flags_morefrag",
    "MoreFrag",
    1,
    0x20,
    Strings::Values(&MORE_FRAG),
);
pub static ADD_FLAGS_NOTIFICATION: FieldSpec = FieldSpec::new(
    "pn_rsi.add_flags_notification",
    "Notification",
    1,
    0x40,
    Strings::Values(&NOTIFICATION),
);
pub static ADD_FLAGS_RESERVED2: FieldSpec =
    FieldSpec::new("pn_rsi.add_flags_reserved", "Reserved", 1, 0x80, Strings::None);

pub static SEND_SEQ_NUM: FieldSpec = FieldSpec::new(
    "pn_rsi.send_seq_num",
    "SendSeqNum",
    2,
    0,
    Strings::Ranges(&SEQ_NUM),
);
pub static ACK_SEQ_NUM: FieldSpec = FieldSpec::new(
    "pn_rsi.ack_seq_num",
    "AckSeqNum",
    2,
    0,
    Strings::Ranges(&SEQ_NUM),
);
pub static VAR_PART_LEN_FIELD: FieldSpec = FieldSpec::new(
    "pn_rsi.var_part_len",
    "VarPartLen",
    2,
    0,
    Strings::Ranges(&VAR_PART_LEN),
);

pub static F_OPNUM_OFFSET: FieldSpec =
    FieldSpec::new("pn_rsi.f_opnum_offset", "FOpnumOffset", 4, 0, Strings::None);
pub static F_OPNUM_OFFSET_OFFSET: FieldSpec = FieldSpec::new(
    "pn_rsi.f_opnum_offset.offset",
    "FOpnumOffset.Offset",
    4,
    0x00FF_FFFF,
    Strings::Ranges(&F_OPNUM_OFFSET_OFFSET_STRINGS),
);
pub static F_OPNUM_OFFSET_OPNUM: FieldSpec = FieldSpec::new(
    "pn_rsi.f_opnum_offset.opnum",
    "FOpnumOffset.Opnum",
    4,
    0x1F00_0000,
    Strings::Ranges(&F_OPNUM_OFFSET_OPNUM_STRINGS),
);
pub static F_OPNUM_OFFSET_CALL_SEQUENCE: FieldSpec = FieldSpec::new(
    "pn_rsi.f_opnum_offset.callsequence",
    "FOpnumOffset.CallSequence",
    4,
    0xE000_0000,
    Strings::Ranges(&CALL_SEQUENCE),
);

pub static RSP_MAX_LENGTH: FieldSpec = FieldSpec::new(
    "pn_rsi.rsp_max_length",
    "RspMaxLength",
    4,
    0,
    Strings::Ranges(&RSP_MAX_LENGTH_STRINGS),
);
pub static VENDOR_ID: FieldSpec =
    FieldSpec::new("pn_rsi.vendor_id", "VendorID", 2, 0, Strings::None);
pub static DEVICE_ID: FieldSpec =
    FieldSpec::new("pn_rsi.device_id", "DeviceID", 2, 0, Strings::None);
pub static INSTANCE_ID: FieldSpec =
    FieldSpec::new("pn_rsi.instance_id", "InstanceID", 2, 0, Strings::None);
pub static RSI_INTERFACE: FieldSpec = FieldSpec::new(
    "pn_rsi.interface",
    "RsiInterface",
    1,
    0,
    Strings::Ranges(&RSI_INTERFACE_STRINGS),
);
pub static NUMBER_OF_ENTRIES: FieldSpec = FieldSpec::new(
    "pn_rsi.number_of_entries",
    "NumberOfEntries",
    2,
    0,
    Strings::None,
);

pub static SECURITY_INFORMATION: FieldSpec = FieldSpec::new(
    "pn_rsi.security_information",
    "SecurityInformation",
    1,
    0,
    Strings::None,
);
pub static SECURITY_PROTECTION_MODE: FieldSpec = FieldSpec::new(
    "pn_rsi.security_information.protection_mode",
    "SecurityInformation.ProtectionMode",
    1,
    0x01,
    Strings::Values(&PROTECTION_MODE_STRINGS),
);
pub static SECURITY_INFORMATION_RESERVED: FieldSpec = FieldSpec::new(
    "pn_rsi.security_information.reserved",
    "SecurityInformation.Reserved",
    1,
    0xFE,
    Strings::None,
);
pub static SECURITY_CONTROL: FieldSpec = FieldSpec::new(
    "pn_rsi.security_control",
    "SecurityControl",
    1,
    0,
    Strings::None,
);
pub static SECURITY_GENERATION_NUMBER: FieldSpec = FieldSpec::new(
    "pn_rsi.security_control.generation_number",
    "SecurityControl.GenerationNumber",
    1,
    0x0F,
    Strings::Ranges(&GENERATION_NUMBER_STRINGS),
);
pub static SECURITY_CONTROL_RESERVED: FieldSpec = FieldSpec::new(
    "pn_rsi.security_control.reserved",
    "SecurityControl.Reserved",
    1,
    0xF0,
    Strings::None,
);
pub static SECURITY_SEQUENCE_COUNTER: FieldSpec = FieldSpec::new(
    "pn_rsi.security_sequence_counter",
    "SecuritySequenceCounter",
    4,
    0,
    Strings::Ranges(&SECURITY_SEQUENCE_COUNTER_STRINGS),
);
pub static SECURITY_LENGTH: FieldSpec = FieldSpec::new(
    "pn_rsi.security_length",
    "SecurityLength",
    2,
    0,
    Strings::None,
);
pub static SECURITY_LENGTH_LENGTH: FieldSpec = FieldSpec::new(
    "pn_rsi.security_length.length",
    "SecurityLength.Length",
    2,
    0x07FF,
    Strings::Ranges(&SECURITY_LENGTH_STRINGS),
);
pub static SECURITY_LENGTH_RESERVED: FieldSpec = FieldSpec::new(
    "pn_rsi.security_length.reserved",
    "SecurityLength.Reserved",
    2,
    0xF800,
    Strings::None,
);

static ERROR_CODE_STRINGS: [(u32, &str); 6] = [
    (0x00, "OK"),
    (0x81, "PNIO"),
    (0xCF, "RTA error"),
    (0xDA, "AlarmAck"),
    (0xDB, "IODConnectRes"),
    (0xDC, "IODReleaseRes"),
];

static ERROR_DECODE_STRINGS: [(u32, &str); 4] = [
    (0x00, "OK"),
    (0x80, "PNIORW"),
    (0x81, "PNIO"),
    (0x82, "Manufacturer specific"),
];

pub static ERROR_CODE: FieldSpec = FieldSpec::new(
    "pn_io.error_code",
    "ErrorCode",
    1,
    0,
    Strings::Values(&ERROR_CODE_STRINGS),
);
pub static ERROR_DECODE: FieldSpec = FieldSpec::new(
    "pn_io.error_decode",
    "ErrorDecode",
    1,
    0,
    Strings::Values(&ERROR_DECODE_STRINGS),
);
pub static ERROR_CODE1: FieldSpec =
    FieldSpec::new("pn_io.error_code1", "ErrorCode1", 1, 0, Strings::None);
pub static ERROR_CODE2: FieldSpec =
    FieldSpec::new("pn_io.error_code2", "ErrorCode2", 1, 0, Strings::None);

pub static BLOCK_TYPE: FieldSpec =
    FieldSpec::new("pn_io.block_type", "BlockType", 2, 0, Strings::None);
pub static BLOCK_LENGTH: FieldSpec =
    FieldSpec::new("pn_io.block_length", "BlockLength", 2, 0, Strings::None);
pub static BLOCK_VERSION_HIGH: FieldSpec = FieldSpec::new(
    "pn_io.block_version_high",
    "BlockVersionHigh",
    1,
    0,
    Strings::None,
);
pub static BLOCK_VERSION_LOW: FieldSpec = FieldSpec::new(
    "pn_io.block_version_low",
    "BlockVersionLow",
    1,
    0,
    Strings::None,
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_range_lookup() {
        assert_eq!(DST_SRV_ACCESS_POINT.strings.lookup(0xFFFF), Some("CON-SAP"));
        assert_eq!(DST_SRV_ACCESS_POINT.strings.lookup(0x8001), Some("Reserved"));
        assert_eq!(
            F_OPNUM_OFFSET_OPNUM.strings.lookup(0x15),
            Some("Reserved")
        );
        assert_eq!(VENDOR_ID.strings.lookup(1), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            DST_SRV_ACCESS_POINT.describe(0xFFFF),
            "DestinationServiceAccessPoint: CON-SAP (0xffff)"
        );
        assert_eq!(ADD_FLAGS_MORE_FRAG.describe(1), "MoreFrag: More fragments follows (0x1)");
        assert_eq!(
            F_OPNUM_OFFSET_OPNUM.describe(2),
            "FOpnumOffset.Opnum: Read (0x02)"
        );
        assert_eq!(VENDOR_ID.describe(0x2a), "VendorID: 0x002a");
    }

    #[test]
    fn test_masked_extract() {
        assert_eq!(PDU_TYPE_VERSION_FIELD.extract(0x15), 1);
        assert_eq!(PDU_TYPE_TYPE_FIELD.extract(0x15), 5);
        assert_eq!(SECURITY_LENGTH_RESERVED.extract(0xF812), 0x1F);
        assert_eq!(SECURITY_LENGTH_LENGTH.extract(0xF812), 0x12);
    }
}

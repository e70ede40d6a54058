//! Common constants used mostly by the `rsi` and `capture` modules
pub const RSI_HEADER_SIZE: usize = 12;
pub const F_OPNUM_OFFSET_SIZE: usize = 4;
/// RsiHeaderSize used by the block payload length computation.
pub const RSI_BLOCK_HEADER_SIZE: usize = 4;
pub const SECURITY_META_DATA_SIZE: usize = 8;
pub const SECURITY_CHECKSUM_SIZE: usize = 16;
pub const PNIO_STATUS_SIZE: usize = 4;

/// DestinationServiceAccessPoint addressing the connection (CON) SAP.
pub const CON_SAP: u16 = 0xFFFF;

pub const BLOCK_HEADER_SIZE: usize = 6;

pub const PD_RSI_DEVICE_TYPE_SIZE: usize = 25;
pub const PD_RSI_ORDER_ID_SIZE: usize = 20;
pub const PD_RSI_IM_SERIAL_NUMBER_SIZE: usize = 16;
pub const PD_RSI_HW_REVISION_SIZE: usize = 5;
pub const PD_RSI_SW_REVISION_PREFIX_SIZE: usize = 1;
pub const PD_RSI_SW_REVISION_SIZE: usize = 9;

pub const RFC1006_PORT: u16 = 102;
pub const TPKT_VERSION: u8 = 3;
pub const TPKT_HEADER_SIZE: usize = 4;
pub const COTP_DT_TPDU: u8 = 0xF0;

pub const PROTOCOL_RSI: &str = "PNIO-RSI";
pub const PROTOCOL_RSI_SECURED: &str = "PNIO-RSIsec";

// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Decode the RSI PDUs of a classic pcap file.
//!
//! RSI travels in COTP data TPDUs inside TPKT records over TCP (RFC 1006). Every frame that
//! carries RSI is decoded twice: an initial pass that builds the conversation and reassembly
//! state, then a display pass with `visited` set whose output becomes the report.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::mem::size_of;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tracing::{info, trace, warn};
use zerocopy::*;
use zerocopy_derive::*;

use crate::config::{Config, DecoderConfig};
use crate::constants::{COTP_DT_TPDU, TPKT_HEADER_SIZE, TPKT_VERSION};
use crate::errors::{Error, Result};
use crate::rsi::reassembly::{ReassemblyKey, ReassemblyStats};
use crate::rsi::tree::{ExpertNote, FieldNode};
use crate::rsi::{Address, Dissection, FrameInfo, RsiDissector, SegmentStatus};

const PCAP_MAGIC: u32 = 0xa1b2c3d4;
const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3b2a1;
const PCAP_MAGIC_NANOS: u32 = 0xa1b23c4d;
const PCAP_MAGIC_NANOS_SWAPPED: u32 = 0x4d3cb2a1;
const PCAP_HEADER_SIZE: usize = 24;
const PACKET_HEADER_SIZE: usize = 16;

const LINKTYPE_NULL: u32 = 0;
const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW: u32 = 101;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const AF_INET: u32 = 2;
const IPPROTO_TCP: u8 = 6;

/// Indicates which stage a frame reached during parsing.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum ParsingStage {
    FrameHeader,
    IpHeader,
    TcpHeader,
    Tpkt,
    Cotp,
}

/// PCAP Global Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct PcapGlobalHeader {
    magic_number: u32,  // Magic number
    version_major: u16, // Major version number
    version_minor: u16, // Minor version number
    thiszone: i32,      // GMT to local correction
    sigfigs: u32,       // Accuracy of timestamps
    snaplen: u32,       // Max length of captured packets
    network: u32,       // Data link type
}

/// PCAP Packet Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct PcapPacketHeader {
    ts_sec: u32,   // Timestamp seconds
    ts_frac: u32,  // Timestamp micro- or nanoseconds
    incl_len: u32, // Number of octets of packet saved in file
    orig_len: u32, // Actual length of packet
}

/// Ethernet Frame Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct EthernetHeader {
    dst_mac: [u8; 6], // Destination MAC address
    src_mac: [u8; 6], // Source MAC address
    ether_type: u16,  // EtherType field
}

/// 802.1Q tag following an Ethernet header with EtherType 0x8100
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct VlanTag {
    tci: u16,        // Priority, DEI and VLAN id
    ether_type: u16, // Encapsulated EtherType
}

/// Loopback Frame Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct LoopbackHeader {
    family: u32, // Address family
}

/// IPv4 Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct IPv4Header {
    version_ihl: u8,      // Version (4 bits) + Internet header length (4 bits)
    tos: u8,              // Type of service
    total_length: u16,    // Total length
    identification: u16,  // Identification
    flags_fragment: u16,  // Flags (3 bits) + Fragment offset (13 bits)
    ttl: u8,              // Time to live
    protocol: u8,         // Protocol
    header_checksum: u16, // Header checksum
    src_addr: [u8; 4],    // Source address
    dst_addr: [u8; 4],    // Destination address
                          // Options and padding are variable and not included in this struct
}

impl IPv4Header {
    fn version(&self) -> u8 {
        self.version_ihl >> 4
    }
    /// Get the header length in bytes.
    fn header_length(&self) -> usize {
        ((self.version_ihl & 0x0F) as usize) * 4
    }
}

/// TCP Header
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct TcpHeader {
    src_port: u16,          // Source port
    dst_port: u16,          // Destination port
    seq: u32,               // Sequence number
    ack: u32,               // Acknowledgment number
    data_offset_flags: u16, // Data offset (4 bits) + reserved + flags
    window: u16,            // Window size
    checksum: u16,          // Checksum
    urgent: u16,            // Urgent pointer
                            // Options are variable and not included in this struct
}

impl TcpHeader {
    fn src_port(&self) -> u16 {
        u16::from_be(self.src_port)
    }
    fn dst_port(&self) -> u16 {
        u16::from_be(self.dst_port)
    }
    /// Get the header length in bytes.
    fn data_offset(&self) -> usize {
        ((u16::from_be(self.data_offset_flags) >> 12) as usize) * 4
    }
}

/// TPKT Header (RFC 1006)
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Copy, Clone)]
#[repr(C, packed)]
struct TpktHeader {
    version: u8,  // Always 3
    reserved: u8, // Reserved
    length: u16,  // Record length including this header
}

fn file_u32(raw: u32, swapped: bool) -> u32 {
    if swapped {
        u32::from_be(raw)
    } else {
        u32::from_le(raw)
    }
}

/// One record of the capture file.
#[derive(Debug)]
pub struct CapturedFrame {
    /// Position in the file, starting at 1.
    pub number: u32,
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct PcapFile {
    pub link_type: u32,
    /// Whether the file was written on a host of the other byte order.
    pub swapped: bool,
    pub frames: Vec<CapturedFrame>,
    pub errors: Vec<String>,
}

/// Reads up to `max_frames` records (0 reads all) from a classic pcap file.
pub fn read_pcap<P: AsRef<Path>>(path: P, max_frames: usize) -> Result<PcapFile> {
    let mut file = File::open(path)?;

    let mut global_header_buf = [0u8; PCAP_HEADER_SIZE];
    file.read_exact(&mut global_header_buf)?;
    let global = PcapGlobalHeader::read_from_bytes(&global_header_buf[..])
        .map_err(|_| Error::Parse("short PCAP global header".to_string()))?;
    let (swapped, nanos) = match u32::from_le(global.magic_number) {
        PCAP_MAGIC => (false, false),
        PCAP_MAGIC_SWAPPED => (true, false),
        PCAP_MAGIC_NANOS => (false, true),
        PCAP_MAGIC_NANOS_SWAPPED => (true, true),
        _ => return Err(Error::Parse("Invalid PCAP magic number".to_string())),
    };
    let link_type = file_u32(global.network, swapped);
    if ![LINKTYPE_NULL, LINKTYPE_ETHERNET, LINKTYPE_RAW].contains(&link_type) {
        return Err(Error::Parse(format!("unsupported link type {link_type}")));
    }

    let mut frames = Vec::new();
    let mut errors = Vec::new();
    let mut packet_header_buf = [0u8; PACKET_HEADER_SIZE];
    while max_frames == 0 || frames.len() < max_frames {
        if file.read_exact(&mut packet_header_buf).is_err() {
            break;
        }
        let pcap_hdr = PcapPacketHeader::read_from_bytes(&packet_header_buf[..])
            .map_err(|_| Error::Parse("short PCAP packet header".to_string()))?;

        let caplen = file_u32(pcap_hdr.incl_len, swapped) as usize;
        let mut data = vec![0u8; caplen];
        if let Err(e) = file.read_exact(&mut data) {
            errors.push(format!("Failed to read packet data: {e}"));
            break;
        }

        let frac = file_u32(pcap_hdr.ts_frac, swapped);
        let nsecs = if nanos { frac } else { frac.saturating_mul(1000) };
        let timestamp =
            DateTime::from_timestamp(file_u32(pcap_hdr.ts_sec, swapped) as i64, nsecs)
                .unwrap_or_default();

        frames.push(CapturedFrame {
            number: frames.len() as u32 + 1,
            timestamp,
            data,
        });
    }

    Ok(PcapFile {
        link_type,
        swapped,
        frames,
        errors,
    })
}

/// Transport addressing and the COTP user data of one frame.
#[derive(Debug)]
struct RsiFrame<'a> {
    src: SocketAddr,
    dst: SocketAddr,
    pdus: Vec<&'a [u8]>,
}

impl RsiFrame<'_> {
    fn frame_info(&self, number: u32, visited: bool) -> FrameInfo {
        FrameInfo::new(number)
            .with_addresses(Address::Ip(self.src.ip()), Address::Ip(self.dst.ip()))
            .with_ports(self.src.port(), self.dst.port())
            .visited(visited)
    }
}

type StageResult<T> = std::result::Result<T, (ParsingStage, String)>;

/// Returns `None` for frames that are not TPKT/COTP data on one of `ports`.
fn extract_rsi<'a>(
    data: &'a [u8],
    link_type: u32,
    swapped: bool,
    ports: &[u16],
) -> StageResult<Option<RsiFrame<'a>>> {
    let mut rem = data;

    // --- Link layer ---
    match link_type {
        LINKTYPE_ETHERNET => {
            let (eth_hdr, new_rem) = EthernetHeader::ref_from_prefix(rem).map_err(|_| {
                (
                    ParsingStage::FrameHeader,
                    "frame too small for Ethernet header".to_string(),
                )
            })?;
            let mut ether_type = u16::from_be(eth_hdr.ether_type);
            rem = new_rem;
            if ether_type == ETHERTYPE_VLAN {
                let (tag, new_rem) = VlanTag::ref_from_prefix(rem).map_err(|_| {
                    (
                        ParsingStage::FrameHeader,
                        "frame too small for VLAN tag".to_string(),
                    )
                })?;
                ether_type = u16::from_be(tag.ether_type);
                rem = new_rem;
            }
            if ether_type != ETHERTYPE_IPV4 {
                return Ok(None);
            }
        }
        LINKTYPE_NULL => {
            let (lb_hdr, new_rem) = LoopbackHeader::ref_from_prefix(rem).map_err(|_| {
                (
                    ParsingStage::FrameHeader,
                    "frame too small for Loopback header".to_string(),
                )
            })?;
            if file_u32(lb_hdr.family, swapped) != AF_INET {
                return Ok(None);
            }
            rem = new_rem;
        }
        _ => {}
    }

    // --- IPv4 Header ---
    let (ipv4_hdr, _) = IPv4Header::ref_from_prefix(rem).map_err(|_| {
        (
            ParsingStage::IpHeader,
            "frame too small for IPv4 header".to_string(),
        )
    })?;
    if ipv4_hdr.version() != 4 || ipv4_hdr.protocol != IPPROTO_TCP {
        return Ok(None);
    }
    let header_len = ipv4_hdr.header_length();
    // Ethernet pads short frames; the IP total length bounds the datagram
    let total_len = (u16::from_be(ipv4_hdr.total_length) as usize).min(rem.len());
    if header_len < size_of::<IPv4Header>() || total_len < header_len {
        return Err((
            ParsingStage::IpHeader,
            format!("bad IPv4 header length {header_len} (total {total_len})"),
        ));
    }
    let src_ip = IpAddr::V4(Ipv4Addr::from(ipv4_hdr.src_addr));
    let dst_ip = IpAddr::V4(Ipv4Addr::from(ipv4_hdr.dst_addr));
    rem = &rem[header_len..total_len];

    // --- TCP Header ---
    let (tcp, _) = TcpHeader::ref_from_prefix(rem).map_err(|_| {
        (
            ParsingStage::TcpHeader,
            "datagram too small for TCP header".to_string(),
        )
    })?;
    let src_port = tcp.src_port();
    let dst_port = tcp.dst_port();
    if !ports.contains(&src_port) && !ports.contains(&dst_port) {
        return Ok(None);
    }
    let data_offset = tcp.data_offset();
    if data_offset < size_of::<TcpHeader>() || data_offset > rem.len() {
        return Err((
            ParsingStage::TcpHeader,
            format!("bad TCP data offset {data_offset}"),
        ));
    }
    rem = &rem[data_offset..];

    // --- TPKT records, each holding one COTP TPDU ---
    let mut pdus = Vec::new();
    while !rem.is_empty() {
        let (tpkt, _) = TpktHeader::ref_from_prefix(rem).map_err(|_| {
            (
                ParsingStage::Tpkt,
                format!("{} bytes left, too small for TPKT header", rem.len()),
            )
        })?;
        if tpkt.version != TPKT_VERSION {
            return Err((
                ParsingStage::Tpkt,
                format!("unexpected TPKT version {}", tpkt.version),
            ));
        }
        let length = u16::from_be(tpkt.length) as usize;
        if length < TPKT_HEADER_SIZE || length > rem.len() {
            return Err((
                ParsingStage::Tpkt,
                format!("TPKT length {length} exceeds {} captured bytes", rem.len()),
            ));
        }
        let record = &rem[TPKT_HEADER_SIZE..length];
        rem = &rem[length..];

        let Some((&li, tpdu)) = record.split_first() else {
            return Err((ParsingStage::Cotp, "empty COTP TPDU".to_string()));
        };
        let li = li as usize;
        if li == 0 || li > tpdu.len() {
            return Err((
                ParsingStage::Cotp,
                format!("COTP length indicator {li} exceeds the TPDU"),
            ));
        }
        if tpdu[0] & 0xF0 != COTP_DT_TPDU {
            trace!("skipping COTP TPDU {:#04x}", tpdu[0]);
            continue;
        }
        if tpdu.len() > li {
            pdus.push(&tpdu[li..]);
        }
    }

    if pdus.is_empty() {
        return Ok(None);
    }
    Ok(Some(RsiFrame {
        src: SocketAddr::new(src_ip, src_port),
        dst: SocketAddr::new(dst_ip, dst_port),
        pdus,
    }))
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub decoder: DecoderConfig,
    pub rfc1006_ports: Vec<u16>,
    /// 0 means unlimited.
    pub max_frames: usize,
    /// Keep the field tree of every PDU in the report.
    pub show_tree: bool,
}

impl CaptureOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            decoder: config.decoder.clone(),
            rfc1006_ports: config.capture.rfc1006_ports.clone(),
            max_frames: config.capture.max_frames,
            show_tree: config.output.show_tree,
        }
    }
}

/// Display pass result for one PDU.
#[derive(Debug, Serialize)]
pub struct PduSummary {
    pub protocol: &'static str,
    pub info: String,
    pub length: usize,
    pub segment: Option<SegmentStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<ExpertNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<FieldNode>,
}

impl PduSummary {
    fn new(dissection: Dissection, show_tree: bool) -> Self {
        Self {
            protocol: dissection.protocol,
            info: dissection.info,
            length: dissection.end_offset,
            segment: dissection.segment,
            notes: dissection.notes,
            tree: show_tree.then_some(dissection.tree),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FrameSummary {
    pub number: u32,
    pub timestamp: DateTime<Utc>,
    pub src: SocketAddr,
    pub dst: SocketAddr,
    /// Info lines of all PDUs in the frame, joined.
    pub info: String,
    pub pdus: Vec<PduSummary>,
}

/// A report generated after decoding a PCAP file.
#[derive(Debug, Serialize)]
pub struct CaptureReport {
    pub frames_read: usize,
    pub frames: Vec<FrameSummary>,
    /// Errors encountered while extracting RSI from frames.
    pub errors: Vec<String>,
    pub conversations: usize,
    /// Reassemblies that never saw their last fragment, with the frames they hold.
    pub incomplete: Vec<(ReassemblyKey, Vec<u32>)>,
    pub stats: ReassemblyStats,
}

impl fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# PNIO RSI Capture Report")?;
        writeln!(f, "{} frames read", self.frames_read)?;
        writeln!(f, "{} RSI frames", self.frames.len())?;
        writeln!(f, "{} conversations", self.conversations)?;
        writeln!(f, "{} errors", self.errors.len())?;
        writeln!(f, "{} incomplete reassemblies", self.incomplete.len())?;
        writeln!(f, " \nReassembly Statistics:\n{:#?}", self.stats)?;

        writeln!(f, "\n## Frames")?;
        for frame in &self.frames {
            let ts = frame
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            let protocol = frame.pdus.first().map_or("", |p| p.protocol);
            writeln!(
                f,
                "{:>6} {ts} {} -> {} {protocol} {}",
                frame.number, frame.src, frame.dst, frame.info
            )?;
            for pdu in &frame.pdus {
                for note in &pdu.notes {
                    writeln!(f, "       {:?} at {}: {}", note.severity, note.offset, note.message)?;
                }
                if let Some(tree) = &pdu.tree {
                    for line in tree.to_string().lines() {
                        writeln!(f, "       {line}")?;
                    }
                }
            }
        }

        writeln!(f, "\n## Incomplete Reassemblies")?;
        for (key, frames) in &self.incomplete {
            let frames: Vec<String> = frames.iter().map(|n| n.to_string()).collect();
            writeln!(
                f,
                "  conversation {} {:?}: frames {}",
                key.conversation,
                key.direction,
                frames.join(", ")
            )?;
        }

        writeln!(f, "\n## Errors")?;
        for (i, error) in self.errors.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, error)?;
        }
        Ok(())
    }
}

fn decode(dissector: &mut RsiDissector, frame: &FrameInfo, pdu: &[u8], secured: bool) -> Dissection {
    if secured {
        dissector.dissect_with_security(frame, pdu, 0)
    } else {
        dissector.dissect(frame, pdu, 0)
    }
}

/// Decodes every RSI PDU in `pcap_file` and reports the display pass.
pub fn decode_pcap<P: AsRef<Path>>(pcap_file: P, options: &CaptureOptions) -> Result<CaptureReport> {
    let capture = read_pcap(pcap_file, options.max_frames)?;
    let mut errors = capture.errors;
    let secured = options.decoder.secured;

    let mut extracted = Vec::new();
    for frame in &capture.frames {
        match extract_rsi(
            &frame.data,
            capture.link_type,
            capture.swapped,
            &options.rfc1006_ports,
        ) {
            Ok(Some(rsi)) => extracted.push((frame, rsi)),
            Ok(None) => trace!("frame {}: no RSI payload", frame.number),
            Err((stage, error)) => {
                warn!("frame {}: {stage:?}: {error}", frame.number);
                errors.push(format!(
                    "frame {}: incompletely parsed at {stage:?}: {error}",
                    frame.number
                ));
            }
        }
    }
    info!(
        "{} of {} frames carry RSI PDUs",
        extracted.len(),
        capture.frames.len()
    );

    let mut dissector = RsiDissector::with_config(&options.decoder);

    // initial pass
    for (frame, rsi) in &extracted {
        for (index, pdu) in rsi.pdus.iter().enumerate() {
            let frame_info = rsi.frame_info(frame.number, false).with_pdu(index as u32);
            decode(&mut dissector, &frame_info, pdu, secured);
        }
    }

    // display pass
    let mut frames = Vec::with_capacity(extracted.len());
    for (frame, rsi) in &extracted {
        let pdus: Vec<PduSummary> = rsi
            .pdus
            .iter()
            .enumerate()
            .map(|(index, pdu)| {
                let frame_info = rsi.frame_info(frame.number, true).with_pdu(index as u32);
                PduSummary::new(
                    decode(&mut dissector, &frame_info, pdu, secured),
                    options.show_tree,
                )
            })
            .collect();
        let info = pdus
            .iter()
            .map(|p| p.info.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        frames.push(FrameSummary {
            number: frame.number,
            timestamp: frame.timestamp,
            src: rsi.src,
            dst: rsi.dst,
            info,
            pdus,
        });
    }

    let reassembly = dissector.reassembly();
    info!(
        "decoded {} RSI frames, {} reassemblies completed",
        frames.len(),
        reassembly.stats().reassemblies_completed
    );
    Ok(CaptureReport {
        frames_read: capture.frames.len(),
        frames,
        errors,
        conversations: dissector.conversations().len(),
        incomplete: reassembly.incomplete(),
        stats: reassembly.stats().clone(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn rsi_freq(add_flags: u8, offset: u32, body: &[u8]) -> Vec<u8> {
        let mut pdu = vec![0x12, 0x34, 0x00, 0x01, 0x15, add_flags, 0x00, 0x01, 0x00, 0x00];
        pdu.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
        pdu.extend_from_slice(&((0x02 << 24) | offset).to_be_bytes());
        pdu.extend_from_slice(body);
        pdu
    }

    /// Ethernet/IPv4/TCP/TPKT/COTP DT around `rsi`.
    fn frame(src_port: u16, dst_port: u16, rsi: &[u8]) -> Vec<u8> {
        frame_with_records(src_port, dst_port, &[rsi])
    }

    /// One TCP segment holding a TPKT record per PDU.
    fn frame_with_records(src_port: u16, dst_port: u16, records: &[&[u8]]) -> Vec<u8> {
        let mut tcp = Vec::new();
        tcp.extend_from_slice(&src_port.to_be_bytes());
        tcp.extend_from_slice(&dst_port.to_be_bytes());
        tcp.extend_from_slice(&[0; 8]);
        tcp.extend_from_slice(&[0x50, 0x18, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00]);
        for rsi in records {
            let mut cotp = vec![0x02, 0xF0, 0x80];
            cotp.extend_from_slice(rsi);
            tcp.extend_from_slice(&[TPKT_VERSION, 0x00]);
            tcp.extend_from_slice(&((4 + cotp.len()) as u16).to_be_bytes());
            tcp.extend(cotp);
        }

        let mut ip = vec![0x45, 0x00];
        ip.extend_from_slice(&((20 + tcp.len()) as u16).to_be_bytes());
        ip.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, 0x40, IPPROTO_TCP, 0x00, 0x00]);
        if src_port == 102 {
            ip.extend_from_slice(&[192, 168, 0, 20, 192, 168, 0, 10]);
        } else {
            ip.extend_from_slice(&[192, 168, 0, 10, 192, 168, 0, 20]);
        }
        ip.extend(tcp);

        let mut eth = vec![0x02, 0, 0, 0, 0, 0x20, 0x02, 0, 0, 0, 0, 0x10, 0x08, 0x00];
        eth.extend(ip);
        eth
    }

    fn write_pcap(frames: &[Vec<u8>]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut header = Vec::new();
        header.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
        header.extend_from_slice(&2u16.to_le_bytes());
        header.extend_from_slice(&4u16.to_le_bytes());
        header.extend_from_slice(&[0; 8]);
        header.extend_from_slice(&65535u32.to_le_bytes());
        header.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        file.write_all(&header).unwrap();
        for (i, data) in frames.iter().enumerate() {
            file.write_all(&(1_700_000_000u32 + i as u32).to_le_bytes()).unwrap();
            file.write_all(&500u32.to_le_bytes()).unwrap();
            file.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
            file.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
            file.write_all(data).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn options() -> CaptureOptions {
        CaptureOptions {
            decoder: DecoderConfig::default(),
            rfc1006_ports: vec![102],
            max_frames: 0,
            show_tree: true,
        }
    }

    #[test]
    fn test_fragmented_read_in_capture() {
        let payload = [0x00, 0x01, 0x00, 0x04, 0x01, 0x00, 0xaa, 0xbb];
        let mut first = 0x1000u32.to_be_bytes().to_vec();
        first.extend_from_slice(&payload[..3]);
        let pcap = write_pcap(&[
            frame(49152, 102, &rsi_freq(0x21, 0, &first)),
            // unrelated traffic on another port
            frame(49153, 8080, &rsi_freq(0x01, 0, &first)),
            frame(49152, 102, &rsi_freq(0x01, 7, &payload[3..])),
        ]);

        let report = decode_pcap(pcap.path(), &options()).unwrap();
        assert_eq!(report.frames_read, 3);
        assert_eq!(report.frames.len(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(report.conversations, 1);
        assert!(report.incomplete.is_empty());
        assert_eq!(report.stats.reassemblies_completed, 1);
        assert_eq!(report.stats.fragments_added, 2);

        let first = &report.frames[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.info, "Read request [PN IO RSI Segment]");
        assert_eq!(first.pdus[0].segment, Some(SegmentStatus::ReassembledIn { frame: 3 }));
        assert_eq!(first.src.port(), 49152);

        let last = &report.frames[1];
        assert_eq!(last.number, 3);
        assert_eq!(last.info, "Read request [Last PN IO RSI Segment]");
        let tree = last.pdus[0].tree.as_ref().unwrap();
        assert_eq!(tree.find("pn_rsi.data_payload").unwrap().find_all("pn_io.block").len(), 1);

        let text = report.to_string();
        assert!(text.contains("2 RSI frames"));
        assert!(text.contains("PNIO-RSI Read request [Last PN IO RSI Segment]"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames"][1]["number"], 3);
    }

    #[test]
    fn test_two_fragments_in_one_segment() {
        let payload = [0x00, 0x01, 0x00, 0x04, 0x01, 0x00, 0xaa, 0xbb];
        let mut first = 0x1000u32.to_be_bytes().to_vec();
        first.extend_from_slice(&payload[..3]);
        let more = rsi_freq(0x21, 0, &first);
        let last = rsi_freq(0x01, 7, &payload[3..]);
        let segment = frame_with_records(49152, 102, &[more.as_slice(), last.as_slice()]);
        let pcap = write_pcap(&[segment]);

        let report = decode_pcap(pcap.path(), &options()).unwrap();
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.stats.reassemblies_completed, 1);
        let frame = &report.frames[0];
        assert_eq!(
            frame.info,
            "Read request [PN IO RSI Segment] | Read request [Last PN IO RSI Segment]"
        );

        // only the completing PDU shows the reassembled payload
        assert_eq!(frame.pdus[0].segment, Some(SegmentStatus::ReassembledIn { frame: 1 }));
        let tree = frame.pdus[0].tree.as_ref().unwrap();
        assert!(!tree.contains("pn_rsi.data_payload"));
        assert_eq!(
            frame.pdus[1].segment,
            Some(SegmentStatus::Reassembled {
                length: 8,
                segments: 2
            })
        );
        let tree = frame.pdus[1].tree.as_ref().unwrap();
        assert!(tree.contains("pn_rsi.data_payload"));
    }

    #[test]
    fn test_bad_tpkt_is_reported() {
        let mut data = frame(102, 49152, &[0x00, 0x01]);
        // corrupt the TPKT version
        let tpkt_at = 14 + 20 + 20;
        data[tpkt_at] = 2;
        let pcap = write_pcap(&[data]);
        let report = decode_pcap(pcap.path(), &options()).unwrap();
        assert!(report.frames.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Tpkt"));
    }

    #[test]
    fn test_max_frames_and_bad_magic() {
        let pdu = rsi_freq(0x01, 0, &[0, 0, 0x10, 0]);
        let pcap = write_pcap(&[frame(49152, 102, &pdu), frame(49152, 102, &pdu)]);
        let capture = read_pcap(pcap.path(), 1).unwrap();
        assert_eq!(capture.frames.len(), 1);
        assert_eq!(capture.frames[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(capture.frames[0].timestamp.timestamp_subsec_micros(), 500);

        let mut bogus = NamedTempFile::new().unwrap();
        bogus.write_all(&[0u8; 24]).unwrap();
        bogus.flush().unwrap();
        assert!(matches!(read_pcap(bogus.path(), 0), Err(Error::Parse(_))));
    }
}

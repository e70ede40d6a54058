// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! PDRsiInstances: the list of RSI instances a device offers, followed by its system
//! identification strings. Only block version 1.0 is understood.
use serde::Serialize;

use crate::constants::{
    PD_RSI_DEVICE_TYPE_SIZE, PD_RSI_HW_REVISION_SIZE, PD_RSI_IM_SERIAL_NUMBER_SIZE,
    PD_RSI_ORDER_ID_SIZE, PD_RSI_SW_REVISION_PREFIX_SIZE, PD_RSI_SW_REVISION_SIZE,
};
use crate::rsi::blocks::RsiEndpoint;
use crate::rsi::codec::{read_bytes, read_u16, read_u8, DecodeError, DecodeResult};
use crate::rsi::fields;
use crate::rsi::leaf::dissect_padding;
use crate::rsi::tree::{FieldNode, PacketInfo, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdRsiInstances {
    pub instances: Vec<RsiEndpoint>,
    pub device_type: String,
    pub order_id: String,
    pub im_serial_number: String,
    pub hw_revision: String,
    pub sw_revision_prefix: String,
    pub sw_revision: String,
}

/// Decodes a PDRsiInstances block body into `tree`, the block's own node.
///
/// A version other than 1.0 is reported as a note and returned as
/// [`DecodeError::UnsupportedVersion`]; nothing is consumed in that case.
pub fn dissect_pd_rsi_instances(
    buf: &[u8],
    offset: usize,
    version_high: u8,
    version_low: u8,
    tree: &mut FieldNode,
    info: &mut PacketInfo,
) -> DecodeResult<(PdRsiInstances, usize)> {
    if version_high != 1 || version_low != 0 {
        let err = DecodeError::UnsupportedVersion {
            high: version_high,
            low: version_low,
        };
        info.note(Severity::Note, offset, err.to_string());
        return Err(err);
    }

    let (count, mut offset) = read_u16(buf, offset)?;
    tree.add_uint(&fields::NUMBER_OF_ENTRIES, offset - 2, count as u32);
    tree.append_text(format!(": NumberOfEntries:{count}"));

    let mut instances = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = offset;
        let sub = tree.push(FieldNode::subtree("pn_rsi.pd_rsi_instance", "PDRsiInstance", offset, 0));
        let (vendor_id, pos) = read_u16(buf, offset)?;
        sub.add_uint(&fields::VENDOR_ID, offset, vendor_id as u32);
        let (device_id, next) = read_u16(buf, pos)?;
        sub.add_uint(&fields::DEVICE_ID, pos, device_id as u32);
        let pos = next;
        let (instance_id, next) = read_u16(buf, pos)?;
        sub.add_uint(&fields::INSTANCE_ID, pos, instance_id as u32);
        let pos = next;
        let (rsi_interface, next) = read_u8(buf, pos)?;
        sub.add_uint(&fields::RSI_INTERFACE, pos, rsi_interface as u32);
        sub.append_text(format!(
            ": VendorID:{vendor_id}, DeviceID:{device_id}, InstanceID:{instance_id}, RsiInterface:{rsi_interface}"
        ));
        offset = dissect_padding(buf, next, sub, 1)?;
        sub.set_len(offset - start);

        instances.push(RsiEndpoint {
            vendor_id,
            device_id,
            instance_id,
            rsi_interface,
        });
    }

    // SystemIdentification: each string but the revision pair is followed by a blank
    let (device_type, offset) =
        dissect_string(buf, offset, tree, "pn_rsi.device_type", "DeviceType", PD_RSI_DEVICE_TYPE_SIZE, 1)?;
    let (order_id, offset) =
        dissect_string(buf, offset, tree, "pn_rsi.order_id", "OrderID", PD_RSI_ORDER_ID_SIZE, 1)?;
    let (im_serial_number, offset) = dissect_string(
        buf,
        offset,
        tree,
        "pn_rsi.im_serial_number",
        "IM_Serial_Number",
        PD_RSI_IM_SERIAL_NUMBER_SIZE,
        1,
    )?;
    let (hw_revision, offset) =
        dissect_string(buf, offset, tree, "pn_rsi.hw_revision", "HWRevision", PD_RSI_HW_REVISION_SIZE, 1)?;
    let (sw_revision_prefix, offset) = dissect_string(
        buf,
        offset,
        tree,
        "pn_rsi.sw_revision_prefix",
        "SWRevisionPrefix",
        PD_RSI_SW_REVISION_PREFIX_SIZE,
        0,
    )?;
    let (sw_revision, offset) =
        dissect_string(buf, offset, tree, "pn_rsi.sw_revision", "SWRevision", PD_RSI_SW_REVISION_SIZE, 0)?;

    let block = PdRsiInstances {
        instances,
        device_type,
        order_id,
        im_serial_number,
        hw_revision,
        sw_revision_prefix,
        sw_revision,
    };
    Ok((block, offset))
}

fn dissect_string(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    key: &'static str,
    label: &str,
    len: usize,
    blank: usize,
) -> DecodeResult<(String, usize)> {
    let (bytes, end) = read_bytes(buf, offset, len + blank)?;
    let text = String::from_utf8_lossy(&bytes[..len])
        .trim_end_matches('\0')
        .to_string();
    tree.add_text(key, label, offset, len, text.clone());
    Ok((text, end))
}

// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Display sink for decoded PDUs: a hierarchical field tree, the per-frame info line and
//! expert notes.
use serde::{Serialize, Serializer};
use std::fmt;

use crate::rsi::fields::FieldSpec;

fn serialize_hex<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    None,
    UInt(u64),
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
    Text(String),
    FrameRef(u32),
}

/// One line of the decoded field tree. Offsets are relative to the buffer the node was
/// decoded from; nodes below a reassembled payload refer to the reassembled bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldNode {
    pub key: &'static str,
    pub label: String,
    pub offset: usize,
    pub length: usize,
    pub value: FieldValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    /// A node with no value of its own, used for protocol roots and subtrees.
    pub fn subtree(key: &'static str, label: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            key,
            label: label.into(),
            offset,
            length,
            value: FieldValue::None,
            text: Vec::new(),
            generated: false,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, node: FieldNode) -> &mut FieldNode {
        self.children.push(node);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Adds a numeric field. `raw` is the whole word read from the wire; the spec's mask
    /// selects the part shown.
    pub fn add_uint(&mut self, spec: &FieldSpec, offset: usize, raw: u32) -> &mut FieldNode {
        let value = spec.extract(raw);
        self.push(FieldNode {
            value: FieldValue::UInt(value as u64),
            ..FieldNode::subtree(spec.key, spec.describe(value), offset, spec.width)
        })
    }

    pub fn add_bytes(
        &mut self,
        key: &'static str,
        label: &str,
        offset: usize,
        bytes: &[u8],
    ) -> &mut FieldNode {
        self.push(FieldNode {
            value: FieldValue::Bytes(bytes.to_vec()),
            ..FieldNode::subtree(key, format!("{label} ({} bytes)", bytes.len()), offset, bytes.len())
        })
    }

    pub fn add_text(
        &mut self,
        key: &'static str,
        label: &str,
        offset: usize,
        length: usize,
        text: String,
    ) -> &mut FieldNode {
        self.push(FieldNode {
            label: format!("{label}: {text}"),
            value: FieldValue::Text(text),
            ..FieldNode::subtree(key, "", offset, length)
        })
    }

    /// Adds a generated cross-reference to another frame.
    pub fn add_frame_ref(&mut self, key: &'static str, label: &str, frame: u32) -> &mut FieldNode {
        self.push(FieldNode {
            value: FieldValue::FrameRef(frame),
            generated: true,
            ..FieldNode::subtree(key, format!("{label}: {frame}"), 0, 0)
        })
    }

    pub fn append_text(&mut self, text: impl Into<String>) {
        self.text.push(text.into());
    }

    pub fn set_len(&mut self, length: usize) {
        self.length = length;
    }

    /// Depth-first search for the first node with `key`.
    pub fn find(&self, key: &str) -> Option<&FieldNode> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    pub fn find_all<'a>(&'a self, key: &str) -> Vec<&'a FieldNode> {
        let mut found = Vec::new();
        self.collect(key, &mut found);
        found
    }

    fn collect<'a>(&'a self, key: &str, found: &mut Vec<&'a FieldNode>) {
        if self.key == key {
            found.push(self);
        }
        for child in &self.children {
            child.collect(key, found);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn uint(&self) -> Option<u64> {
        match self.value {
            FieldValue::UInt(v) => Some(v),
            _ => None,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        let mut line = self.label.clone();
        for text in &self.text {
            line.push_str(text);
        }
        if self.generated {
            writeln!(f, "{indent}[{line}]")?;
        } else {
            writeln!(f, "{indent}{line}")?;
        }
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Note,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpertNote {
    pub severity: Severity,
    pub offset: usize,
    pub message: String,
}

/// Protocol column, info line and expert notes for one decoded PDU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacketInfo {
    pub protocol: &'static str,
    pub info: String,
    pub notes: Vec<ExpertNote>,
}

impl PacketInfo {
    pub fn append(&mut self, text: &str) {
        self.info.push_str(text);
    }

    pub fn set_protocol(&mut self, protocol: &'static str) {
        self.protocol = protocol;
    }

    pub fn note(&mut self, severity: Severity, offset: usize, message: impl Into<String>) {
        self.notes.push(ExpertNote {
            severity,
            offset,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rsi::fields;

    #[test]
    fn test_tree_building_and_search() {
        let mut root = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", 0, 12);
        let flags = root.push(FieldNode::subtree("pn_rsi.add_flags", "AddFlags", 5, 1));
        flags.add_uint(&fields::ADD_FLAGS_MORE_FRAG, 5, 0x23);
        flags.append_text(", Window Size: 3, Tack: 0  ");
        root.add_frame_ref("pn_rsi.reassembled_in", "Reassembled pn_rsi in frame", 7);

        let more = root.find("pn_rsi.add_flags_morefrag").unwrap();
        assert_eq!(more.uint(), Some(1));
        assert_eq!(more.offset, 5);
        assert_eq!(more.length, 1);
        let reassembled_in = root.find("pn_rsi.reassembled_in").unwrap();
        assert!(reassembled_in.generated);
        assert_eq!(reassembled_in.value, FieldValue::FrameRef(7));
        assert!(!root.contains("pn_rsi.svcs_block"));

        let rendered = root.to_string();
        assert!(rendered.contains("AddFlags, Window Size: 3, Tack: 0"));
        assert!(rendered.contains("[Reassembled pn_rsi in frame: 7]"));
    }

    #[test]
    fn test_bytes_serialize_as_hex() {
        let mut root = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", 0, 2);
        root.add_bytes("pn_rsi.security_checksum", "SecurityChecksum", 0, &[0xab, 0xcd]);
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["children"][0]["value"]["value"], "abcd");
        assert_eq!(json["children"][0]["value"]["type"], "bytes");
    }

    #[test]
    fn test_packet_info() {
        let mut info = PacketInfo::default();
        info.set_protocol("PNIO-RSI");
        info.append("Read request");
        info.append(" [PN IO RSI Segment]");
        info.note(Severity::Warn, 4, "truncated");
        assert_eq!(info.info, "Read request [PN IO RSI Segment]");
        assert_eq!(info.notes.len(), 1);
    }
}

//! Escaped node-tree writer for the server item table.
//!
//! The output is the self-delimiting binary tree consumed by external map
//! editing tools: nodes are bracketed by the reserved start/end bytes, and
//! any payload byte that collides with a reserved value is prefixed with the
//! escape byte. The tree is write-only from this side; the consumer parses
//! it with the inverse rules.

use crate::data::server_items::{ServerItemGroup, ServerItemTable};

pub const NODE_START: u8 = 0xFE;
pub const NODE_END: u8 = 0xFF;
pub const ESCAPE: u8 = 0xFD;

const ROOT_ATTR_VERSION: u8 = 0x01;
const ITEM_ATTR_SERVER_ID: u8 = 0x10;
const ITEM_ATTR_CLIENT_ID: u8 = 0x11;

/// Fixed size of the reserved description field in the root version
/// attribute.
const DESCRIPTION_LEN: usize = 128;

/// Accumulates the tree, escaping payload bytes as they are written. Node
/// brackets bypass the escaping on purpose: they are the only bytes allowed
/// to appear bare.
struct NodeWriter {
    buf: Vec<u8>,
}

impl NodeWriter {
    fn new() -> NodeWriter {
        // The file identifier: four zero bytes before the root node.
        NodeWriter {
            buf: vec![0, 0, 0, 0],
        }
    }

    fn begin_node(&mut self) {
        self.buf.push(NODE_START);
    }

    fn end_node(&mut self) {
        self.buf.push(NODE_END);
    }

    fn write_u8(&mut self, value: u8) {
        if value == ESCAPE || value == NODE_START || value == NODE_END {
            self.buf.push(ESCAPE);
        }
        self.buf.push(value);
    }

    fn write_u16_le(&mut self, value: u16) {
        for byte in value.to_le_bytes() {
            self.write_u8(byte);
        }
    }

    fn write_u32_le(&mut self, value: u32) {
        for byte in value.to_le_bytes() {
            self.write_u8(byte);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_u8(*byte);
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Removes one level of escaping from a node payload. Used by tests to check
/// the writer against the consumer's parsing rules; the tool itself never
/// reads the tree back.
pub fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut escaped = false;
    for byte in payload {
        if !escaped && *byte == ESCAPE {
            escaped = true;
            continue;
        }
        escaped = false;
        out.push(*byte);
    }
    out
}

/// Serializes the table. Items are emitted in ascending server-id order so
/// the output is deterministic; deprecated-group items are omitted entirely.
pub fn compile_server_table(table: &ServerItemTable) -> Vec<u8> {
    let mut writer = NodeWriter::new();

    writer.begin_node();
    writer.write_u8(0); // root node type
    writer.write_u32_le(0); // root flags, reserved

    writer.write_u8(ROOT_ATTR_VERSION);
    writer.write_u16_le((4 + 4 + 4 + DESCRIPTION_LEN) as u16);
    writer.write_u32_le(table.major_version);
    writer.write_u32_le(table.minor_version);
    writer.write_u32_le(table.build_number);
    let mut description = [0u8; DESCRIPTION_LEN];
    let text = table.description.as_bytes();
    let copied = text.len().min(DESCRIPTION_LEN);
    description[..copied].copy_from_slice(&text[..copied]);
    writer.write_bytes(&description);

    for item in table.iter() {
        if item.group == ServerItemGroup::Deprecated {
            continue;
        }
        writer.begin_node();
        writer.write_u8(item.group as u8);
        writer.write_u32_le(item.flags);
        writer.write_u8(ITEM_ATTR_SERVER_ID);
        writer.write_u16_le(2);
        writer.write_u16_le(item.server_id);
        writer.write_u8(ITEM_ATTR_CLIENT_ID);
        writer.write_u16_le(2);
        writer.write_u16_le(item.client_id);
        writer.end_node();
    }

    writer.end_node();
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::server_items::ServerItemRecord;

    fn escape_via_writer(bytes: &[u8]) -> Vec<u8> {
        let mut writer = NodeWriter::new();
        writer.write_bytes(bytes);
        writer.into_inner()[4..].to_vec()
    }

    #[test]
    fn escaping_round_trips_arbitrary_bytes() {
        let sequence: Vec<u8> = (0..=255u8).chain([0xFD, 0xFE, 0xFF, 0x41]).collect();
        let escaped = escape_via_writer(&sequence);
        assert_eq!(unescape(&escaped), sequence);
    }

    #[test]
    fn escaped_output_contains_no_bare_reserved_bytes() {
        let sequence = [0xFC, 0xFD, 0xFE, 0xFF, 0x00, 0xFD];
        let escaped = escape_via_writer(&sequence);
        let mut index = 0;
        while index < escaped.len() {
            let byte = escaped[index];
            assert_ne!(byte, NODE_START);
            assert_ne!(byte, NODE_END);
            if byte == ESCAPE {
                // The escaped byte that follows is data, skip it.
                index += 2;
            } else {
                index += 1;
            }
        }
    }

    fn sample_table() -> ServerItemTable {
        let mut table = ServerItemTable::new(3, 57, 0, String::from("generated table"));
        let mut sword = ServerItemRecord::new(2400, 3300);
        sword.group = ServerItemGroup::Weapon;
        sword.flags = 0x40;
        table.insert(sword);
        let mut old = ServerItemRecord::new(2000, 3000);
        old.group = ServerItemGroup::Deprecated;
        table.insert(old);
        let mut ground = ServerItemRecord::new(100, 100);
        ground.group = ServerItemGroup::Ground;
        // Flags value full of reserved bytes to exercise the escaping.
        ground.flags = 0xFFFE_FDFC;
        table.insert(ground);
        table
    }

    /// Positions of bare (unescaped) `NODE_START` bytes.
    fn bare_starts(out: &[u8]) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut index = 0;
        while index < out.len() {
            if out[index] == ESCAPE {
                index += 2;
                continue;
            }
            if out[index] == NODE_START {
                starts.push(index);
            }
            index += 1;
        }
        starts
    }

    /// Unescaped payload of the node opening at `start`, up to its bare end
    /// marker or the next bare start.
    fn node_payload(out: &[u8], start: usize) -> Vec<u8> {
        let mut index = start + 1;
        while index < out.len() {
            if out[index] == ESCAPE {
                index += 2;
                continue;
            }
            if out[index] == NODE_END || out[index] == NODE_START {
                break;
            }
            index += 1;
        }
        unescape(&out[start + 1..index])
    }

    #[test]
    fn tree_structure_and_ordering() {
        let table = sample_table();
        let out = compile_server_table(&table);

        // File identifier, then the root node opens.
        assert_eq!(&out[0..4], &[0, 0, 0, 0]);
        assert_eq!(out[4], NODE_START);
        assert_eq!(*out.last().unwrap(), NODE_END);

        // Exactly two item nodes: the deprecated one is dropped.
        let starts = bare_starts(&out);
        assert_eq!(starts.len(), 3); // root + two items

        // Items come out in ascending server-id order; the id sits behind
        // group (1), flags (4) and the attribute tag + length (3).
        let first = node_payload(&out, starts[1]);
        assert_eq!(u16::from_le_bytes([first[8], first[9]]), 100);
        let second = node_payload(&out, starts[2]);
        assert_eq!(u16::from_le_bytes([second[8], second[9]]), 2400);
    }

    #[test]
    fn item_payload_layout() {
        let mut table = ServerItemTable::new(3, 57, 0, String::new());
        let mut item = ServerItemRecord::new(0x1234, 0x5678);
        item.group = ServerItemGroup::Weapon;
        item.flags = 0x0000_0040;
        table.insert(item);
        let out = compile_server_table(&table);

        let starts = bare_starts(&out);
        assert_eq!(starts.len(), 2); // root + one item
        let payload = node_payload(&out, starts[1]);
        assert_eq!(
            payload,
            vec![
                ServerItemGroup::Weapon as u8,
                0x40, 0, 0, 0, // flags
                ITEM_ATTR_SERVER_ID, 2, 0, 0x34, 0x12,
                ITEM_ATTR_CLIENT_ID, 2, 0, 0x78, 0x56,
            ]
        );
    }

    #[test]
    fn root_version_attribute_layout() {
        let table = ServerItemTable::new(3, 57, 9, String::from("x"));
        let out = compile_server_table(&table);
        let payload = unescape(&out[5..]);
        // type byte, flags u32, attr tag, length 140.
        assert_eq!(payload[0], 0);
        assert_eq!(&payload[1..5], &[0, 0, 0, 0]);
        assert_eq!(payload[5], ROOT_ATTR_VERSION);
        assert_eq!(u16::from_le_bytes([payload[6], payload[7]]), 140);
        assert_eq!(u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]), 3);
        assert_eq!(u32::from_le_bytes([payload[12], payload[13], payload[14], payload[15]]), 57);
        assert_eq!(u32::from_le_bytes([payload[16], payload[17], payload[18], payload[19]]), 9);
        assert_eq!(payload[20], b'x');
        assert_eq!(payload[21], 0);
    }
}

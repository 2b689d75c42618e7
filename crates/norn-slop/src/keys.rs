use norn_types::{Key, NodeId};

/// Slop partition: `target_node(8) ++ store_utf8 ++ \x00 ++ key_bytes`.
///
/// Big-endian node id keeps all hints for one target node contiguous, so the
/// slop pusher can prefix-scan a node's backlog. The `\x00` delimiter after
/// the store name guarantees a scan for store "foo" never bleeds into
/// "foobar" (store names are UTF-8 and cannot contain null bytes).
pub fn slop_key(node_id: NodeId, store_name: &str, key: &Key) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + store_name.len() + 1 + key.len());
    buf.extend_from_slice(&node_id.to_be_bytes());
    buf.extend_from_slice(store_name.as_bytes());
    buf.push(0x00);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// 8-byte prefix covering every hint destined for `node_id`.
pub fn node_prefix(node_id: NodeId) -> [u8; 8] {
    node_id.to_be_bytes()
}

/// Prefix covering every hint for one store on one target node.
pub fn store_prefix(node_id: NodeId, store_name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + store_name.len() + 1);
    buf.extend_from_slice(&node_id.to_be_bytes());
    buf.extend_from_slice(store_name.as_bytes());
    buf.push(0x00);
    buf
}

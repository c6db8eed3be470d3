//! Binary blob format for persisted document trees.
//!
//! Layout: the 4-byte magic `TPDT`, one format-version byte, then a `bincode`
//! payload holding every [`NodeRecord`] in pre-order. Each record is
//! `(kind_tag, child_count, (name, attributes, value, callback_data))`; the
//! child counts alone rebuild the shape, so neither direction recurses.
//! Callback data is stored as JSON text so arbitrary plugin values survive a
//! non-self-describing encoding.
//!
//! An empty blob stands for "nothing parsed yet" and loads as an empty
//! static fragment.

use bincode::Options;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SerializeError;
use crate::node::{Attributes, CallbackData, Document, NodeData, NodeId, NodeKind};

const MAGIC: &[u8; 4] = b"TPDT";
const FORMAT_VERSION: u8 = 2;
const HEADER_LEN: usize = MAGIC.len() + 1;
const MAX_PAYLOAD: u64 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct NodeMembers(
    Option<String>,
    Attributes,
    Option<String>,
    Option<Vec<(String, Option<String>)>>,
);

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord(u8, u32, NodeMembers);

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_PAYLOAD)
}

fn encode_callbacks(data: Option<&CallbackData>) -> Result<Option<Vec<(String, Option<String>)>>, SerializeError> {
    let Some(entries) = data else {
        return Ok(None);
    };
    let mut encoded = Vec::with_capacity(entries.len());
    for (identifier, value) in entries {
        let json = value.as_ref().map(serde_json::to_string).transpose()?;
        encoded.push((identifier.clone(), json));
    }
    Ok(Some(encoded))
}

fn decode_callbacks(data: Option<Vec<(String, Option<String>)>>) -> Result<Option<CallbackData>, SerializeError> {
    let Some(entries) = data else {
        return Ok(None);
    };
    let mut decoded = Vec::with_capacity(entries.len());
    for (identifier, json) in entries {
        let value: Option<Value> = json.as_deref().map(serde_json::from_str).transpose()?;
        decoded.push((identifier, value));
    }
    Ok(Some(decoded))
}

fn to_records(doc: &Document) -> Result<Vec<NodeRecord>, SerializeError> {
    let mut records = Vec::new();
    let mut stack = vec![doc.root()];
    while let Some(id) = stack.pop() {
        let node = &doc.nodes[id.0];
        let count = u32::try_from(node.children.len())
            .map_err(|_| SerializeError::Structure("too many children"))?;
        records.push(NodeRecord(
            node.kind.tag(),
            count,
            NodeMembers(
                node.name.clone(),
                node.attributes.clone(),
                node.value.clone(),
                encode_callbacks(node.callback_data.as_ref())?,
            ),
        ));
        stack.extend(node.children.iter().rev().copied());
    }
    Ok(records)
}

fn from_records(records: Vec<NodeRecord>) -> Result<Document, SerializeError> {
    let mut doc = Document::empty_arena();
    // Open nodes with the number of children each still expects.
    let mut open: Vec<(NodeId, u32)> = Vec::new();
    for NodeRecord(tag, count, NodeMembers(name, attributes, value, callbacks)) in records {
        let parent = match open.last_mut() {
            Some((parent, remaining)) => {
                *remaining -= 1;
                Some(*parent)
            }
            None if doc.nodes.is_empty() => None,
            None => return Err(SerializeError::Structure("records after the root")),
        };
        let kind = NodeKind::from_tag(tag).ok_or(SerializeError::UnknownKind(tag))?;
        let mut data = NodeData::new(kind);
        data.name = name;
        data.attributes = attributes;
        data.value = value;
        data.callback_data = decode_callbacks(callbacks)?;
        data.parent = parent;
        let id = doc.push(data);
        if let Some(parent) = parent {
            doc.nodes[parent.0].children.push(id);
        }
        open.push((id, count));
        while open.last().is_some_and(|&(_, remaining)| remaining == 0) {
            open.pop();
        }
    }
    if doc.nodes.is_empty() {
        return Err(SerializeError::Structure("no root record"));
    }
    if !open.is_empty() {
        return Err(SerializeError::Structure("missing child records"));
    }
    Ok(doc)
}

/// Serialize a tree into a blob. A falsy root yields an empty blob.
pub fn dump_tree(doc: &Document) -> Result<Vec<u8>, SerializeError> {
    if !doc.is_truthy(doc.root()) {
        return Ok(Vec::new());
    }
    let records = to_records(doc)?;
    let payload = codec().serialize(&records).map_err(SerializeError::Encode)?;
    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.push(FORMAT_VERSION);
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Rebuild a tree from a blob written by [`dump_tree`].
pub fn load_tree(data: &[u8]) -> Result<Document, SerializeError> {
    if data.is_empty() {
        return Ok(Document::new_static(String::new()));
    }
    if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(SerializeError::BadMagic);
    }
    let version = data[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedVersion(version));
    }
    let records: Vec<NodeRecord> = codec()
        .deserialize(&data[HEADER_LEN..])
        .map_err(SerializeError::Decode)?;
    from_records(records)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::render::NoCallbacks;

    fn sample() -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("div");
        let mut attrs = Attributes::new();
        attrs.insert("class".to_owned(), "x".to_owned());
        let p = doc.create_element_with("p", attrs);
        let text = doc.create_text("a & b");
        let raw = doc.create_data("<em>raw</em>");
        let br = doc.create_element("br");
        let tail = doc.create_text("tail");
        doc.append(root, div).unwrap();
        doc.extend(div, [p, br, tail]).unwrap();
        doc.extend(p, [text, raw]).unwrap();
        doc.add_render_callback(p, "highlight", Some(json!({"lang": "rust", "lines": [1, 2]})))
            .unwrap();
        doc.add_render_callback(p, "clock", None).unwrap();
        doc
    }

    #[test]
    fn test_round_trip_preserves_render_and_queries() {
        let doc = sample();
        let loaded = load_tree(&dump_tree(&doc).unwrap()).unwrap();

        assert_eq!(
            loaded.render(loaded.root(), &NoCallbacks).unwrap(),
            doc.render(doc.root(), &NoCallbacks).unwrap()
        );
        for rule in ["p", "div/#", "/div/br", "*[class=x]", "p[!class]", "+"] {
            let names = |d: &Document| -> Vec<(Option<String>, Option<String>)> {
                d.query(d.root(), rule)
                    .unwrap()
                    .iter()
                    .map(|n| (n.name().map(str::to_owned), n.value().map(str::to_owned)))
                    .collect()
            };
            assert_eq!(names(&loaded), names(&doc), "rule {rule}");
        }
    }

    #[test]
    fn test_round_trip_restores_parents_and_callbacks() {
        let doc = sample();
        let loaded = load_tree(&dump_tree(&doc).unwrap()).unwrap();

        assert_eq!(loaded.parent(loaded.root()), None);
        let mut stack = vec![loaded.root()];
        while let Some(id) = stack.pop() {
            for &child in loaded.children(id) {
                assert_eq!(loaded.parent(child), Some(id));
                stack.push(child);
            }
        }
        let p = loaded.query(loaded.root(), "p").unwrap().first().unwrap();
        assert_eq!(
            p.callback_data().unwrap(),
            &[
                (
                    "highlight".to_owned(),
                    Some(json!({"lang": "rust", "lines": [1, 2]}))
                ),
                ("clock".to_owned(), None),
            ]
        );
    }

    #[test]
    fn test_static_fragment_round_trip() {
        let doc = Document::new_static("<p>done</p>");
        let loaded = load_tree(&dump_tree(&doc).unwrap()).unwrap();

        assert_eq!(loaded.kind(loaded.root()), NodeKind::StaticFragment);
        assert_eq!(loaded.value(loaded.root()), Some("<p>done</p>"));
    }

    #[test]
    fn test_empty_tree_and_blob() {
        assert!(dump_tree(&Document::new()).unwrap().is_empty());
        assert!(dump_tree(&Document::new_static("")).unwrap().is_empty());

        let loaded = load_tree(b"").unwrap();
        assert_eq!(loaded.kind(loaded.root()), NodeKind::StaticFragment);
        assert_eq!(loaded.render(loaded.root(), &NoCallbacks).unwrap(), "");
    }

    #[test]
    fn test_corrupt_blobs_fail() {
        let blob = dump_tree(&sample()).unwrap();

        assert!(matches!(load_tree(b"nope"), Err(SerializeError::BadMagic)));
        assert!(matches!(load_tree(b"XXXX\x01abc"), Err(SerializeError::BadMagic)));

        let mut wrong_version = blob.clone();
        wrong_version[4] = 9;
        assert!(matches!(
            load_tree(&wrong_version),
            Err(SerializeError::UnsupportedVersion(9))
        ));

        let truncated = &blob[..blob.len() / 2];
        assert!(matches!(load_tree(truncated), Err(SerializeError::Decode(_))));

        let mut trailing = blob;
        trailing.push(0);
        assert!(matches!(load_tree(&trailing), Err(SerializeError::Decode(_))));
    }

    fn blob_of(records: &[NodeRecord]) -> Vec<u8> {
        let mut blob = MAGIC.to_vec();
        blob.push(FORMAT_VERSION);
        blob.extend(codec().serialize(records).unwrap());
        blob
    }

    fn record(tag: u8, count: u32) -> NodeRecord {
        NodeRecord(tag, count, NodeMembers(None, Attributes::new(), None, None))
    }

    #[test]
    fn test_unknown_kind_tag() {
        assert!(matches!(
            load_tree(&blob_of(&[record(7, 0)])),
            Err(SerializeError::UnknownKind(7))
        ));
    }

    #[test]
    fn test_child_counts_must_form_one_tree() {
        let fragment = NodeKind::Fragment.tag();
        let element = NodeKind::Element.tag();

        assert!(matches!(
            load_tree(&blob_of(&[])),
            Err(SerializeError::Structure(_))
        ));
        assert!(matches!(
            load_tree(&blob_of(&[record(fragment, 2), record(element, 0)])),
            Err(SerializeError::Structure(_))
        ));
        assert!(matches!(
            load_tree(&blob_of(&[record(fragment, 0), record(element, 0)])),
            Err(SerializeError::Structure(_))
        ));
        // A huge claimed depth with no records behind it fails cleanly.
        let mut chain = vec![record(fragment, 1)];
        chain.extend((0..10_000).map(|_| record(element, 1)));
        assert!(matches!(
            load_tree(&blob_of(&chain)),
            Err(SerializeError::Structure(_))
        ));
    }

    #[test]
    fn test_deep_tree_round_trip() {
        let mut doc = Document::new();
        let mut parent = doc.root();
        for _ in 0..100_000 {
            let child = doc.create_element("i");
            doc.append(parent, child).unwrap();
            parent = child;
        }
        let leaf = doc.create_text("deep");
        doc.append(parent, leaf).unwrap();

        let loaded = load_tree(&dump_tree(&doc).unwrap()).unwrap();

        assert_eq!(loaded.node_count(), doc.node_count());
        assert_eq!(loaded.text(loaded.root(), &NoCallbacks).unwrap(), "deep");
        let mut depth = 0;
        let mut cursor = loaded.root();
        while let Some(&child) = loaded.children(cursor).first() {
            assert_eq!(loaded.parent(child), Some(cursor));
            cursor = child;
            depth += 1;
        }
        assert_eq!(depth, 100_001);
    }
}

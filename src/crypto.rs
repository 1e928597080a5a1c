//! Canonical block encoding and SHA-256 digests.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::Block;

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Compact JSON with every object's keys in lexicographic order.
///
/// The output depends only on field values, never on the order in which
/// fields were declared or inserted.
pub fn canonical_encoding<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(value)?);
    serde_json::to_vec(&value)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Hex SHA-256 of the block's canonical encoding. Recomputed on every call;
/// blocks never carry their own hash.
pub fn hash_block(block: &Block) -> String {
    // Blocks hold only strings, integers, finite numbers and enums.
    let encoded = canonical_encoding(block).expect("block encodes as json");
    hash_concat(&[encoded.as_slice()])
}

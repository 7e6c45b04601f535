use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::NetworkSettings;

/// Extra values that make two otherwise-equal networks distinct.
pub type NetworkMetadata = BTreeMap<String, serde_json::Value>;

const DOMAIN: &[u8] = b"statuslink.network-fingerprint.v1";

/// Deterministic digest of a network's defining settings (lowercase hex BLAKE3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the network settings plus metadata.
///
/// Every field is length-prefixed so no two distinct inputs share an
/// encoding. Metadata is a sorted map, and nested JSON objects serialize with
/// sorted keys, so insertion order never reaches the digest.
pub fn compute_fingerprint(settings: &NetworkSettings, metadata: &NetworkMetadata) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);

    write_field(&mut hasher, settings.network_name.as_bytes());
    write_field(&mut hasher, settings.node_url.as_bytes());
    write_field(&mut hasher, settings.chain_name.as_bytes());
    write_field(&mut hasher, &settings.network_id.to_le_bytes());

    hasher.update(&(metadata.len() as u64).to_le_bytes());
    for (key, value) in metadata {
        write_field(&mut hasher, key.as_bytes());
        write_field(&mut hasher, value.to_string().as_bytes());
    }

    Fingerprint(hasher.finalize().to_hex().to_string())
}

fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

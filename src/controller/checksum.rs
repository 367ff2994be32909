//! # Checksums
//!
//! Stable digests over generated configuration and secrets.
//!
//! The digest of each payload is written to a pod template annotation
//! (`configuration/checksum`, `secret/checksum`). A changed payload changes the
//! annotation, which changes the pod template hash, and the Deployment
//! controller rolls the pods. An unchanged payload must therefore always yield
//! the same digest or every reconcile would restart the workload.

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// SHA-256 of `payload` as lowercase hex
pub fn checksum(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

/// Digest over several named payloads
///
/// Entries are hashed in key order with length framing, so neither insertion
/// order nor moving bytes between a key and its value can alias two inputs.
#[derive(Debug, Default, Clone)]
pub struct ChecksumBuilder {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ChecksumBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named payload, replacing any previous payload with the same name
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, payload: impl AsRef<[u8]>) -> Self {
        self.entries.insert(name.into(), payload.as_ref().to_vec());
        self
    }

    pub fn finish(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, payload) in &self.entries {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            hasher.update((payload.len() as u64).to_be_bytes());
            hasher.update(payload);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Checksum of a ConfigMap's `data` and `binaryData`
pub fn config_map_checksum(config_map: &ConfigMap) -> String {
    let mut builder = ChecksumBuilder::new();
    for (key, value) in config_map.data.iter().flatten() {
        builder = builder.with(format!("data/{key}"), value);
    }
    for (key, value) in config_map.binary_data.iter().flatten() {
        builder = builder.with(format!("binaryData/{key}"), &value.0);
    }
    builder.finish()
}

/// Checksum of a Secret's `data`
///
/// `stringData` is ignored: the stored object only ever carries `data`, and
/// computing over both would differ between a freshly built and a fetched Secret.
pub fn secret_checksum(secret: &Secret) -> String {
    let mut builder = ChecksumBuilder::new();
    for (key, value) in secret.data.iter().flatten() {
        builder = builder.with(key.clone(), &value.0);
    }
    builder.finish()
}

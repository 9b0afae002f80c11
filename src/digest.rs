//! Content digest of a manifest, as reported in `docker-content-digest`.
//!
//! Schema 1 manifests are signed with libtrust's "pretty JWS" format: the
//! signatures are spliced into the JSON document, so the digest has to be
//! taken over the payload with the signature block cut back out. Each
//! signature's protected header records how to do that: keep the first
//! `formatLength` bytes of the document and append the decoded `formatTail`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedManifest {
    schema_version: Option<u32>,
    #[serde(default)]
    signatures: Vec<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    protected: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtectedHeader {
    format_length: usize,
    format_tail: String,
}

/// Computes `sha256:<hex>` for a manifest.
///
/// Signed schema 1 manifests hash their canonical payload; everything else
/// (schema 2, unsigned documents, bytes that are not JSON) hashes the raw
/// bytes.
pub fn manifest_digest(manifest: &[u8]) -> String {
    match signed_payload(manifest) {
        Some(payload) => sha256_digest(&payload),
        None => sha256_digest(manifest),
    }
}

/// `sha256:<hex>` of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn signed_payload(manifest: &[u8]) -> Option<Vec<u8>> {
    let parsed: SignedManifest = serde_json::from_slice(manifest).ok()?;
    if parsed.schema_version != Some(1) {
        return None;
    }
    let signature = parsed.signatures.first()?;

    let header = URL_SAFE_NO_PAD.decode(trim_padding(&signature.protected)).ok()?;
    let header: ProtectedHeader = serde_json::from_slice(&header).ok()?;
    let tail = URL_SAFE_NO_PAD.decode(trim_padding(&header.format_tail)).ok()?;

    let head = manifest.get(..header.format_length)?;
    let mut payload = Vec::with_capacity(head.len() + tail.len());
    payload.extend_from_slice(head);
    payload.extend_from_slice(&tail);
    Some(payload)
}

fn trim_padding(s: &str) -> &str {
    s.trim_end_matches('=')
}

//! Credential codec: DER to PEM re-encoding for the on-disk files.
//!
//! Encoding is deterministic: the same input always produces byte-identical
//! output (LF line endings, 64-column base64), which is what makes repeated
//! writes of the same artifact idempotent on disk.

use pem::{EncodeConfig, LineEnding, Pem};

use crate::cert::{Certificate, PrivateKey};

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

fn encode_config() -> EncodeConfig {
    EncodeConfig::default().set_line_ending(LineEnding::LF)
}

/// Encodes the given certificates as concatenated PEM blocks, one
/// `CERTIFICATE` block per record, in input order.
pub fn encode_certificates(certs: &[Certificate]) -> Vec<u8> {
    let blocks: Vec<Pem> = certs
        .iter()
        .map(|c| Pem::new(CERTIFICATE_TAG, c.as_bytes()))
        .collect();

    pem::encode_many_config(&blocks, encode_config()).into_bytes()
}

/// Encodes the given private key as a single PKCS#8 `PRIVATE KEY` PEM block.
///
/// Key-format validation happens when the [`PrivateKey`] is constructed from
/// the wire bytes; a key that reaches this function always encodes.
pub fn encode_private_key(key: &PrivateKey) -> Vec<u8> {
    let block = Pem::new(PRIVATE_KEY_TAG, key.as_bytes());
    pem::encode_config(&block, encode_config()).into_bytes()
}

//! Error types for certificate and private key validation.

use x509_parser::error::X509Error;

/// An error that may arise parsing X.509 certificate material from the feed.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// The concatenated chain holds more certificates than the helper accepts.
    #[error("certificate chain has too many certificates (max {max})")]
    TooManyCertificates {
        /// Maximum number of certificates processed before aborting.
        max: usize,
    },
}

/// An error that may arise decoding private keys.
///
/// A key that fails PKCS#8 decoding cannot be re-encoded to PEM, so this is
/// the helper's "unsupported key format" failure.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PrivateKeyError {
    /// Error returned by the PKCS#8 private key decoding library.
    #[error("failed decoding PKCS#8 private key")]
    DecodePkcs8(pkcs8::Error),
}

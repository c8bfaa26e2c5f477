//! X.509-SVID type.

use thiserror::Error;

use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::to_certificate_vec;
use crate::cert::{Certificate, PrivateKey};
use crate::spiffe_id::{SpiffeId, SpiffeIdError};

/// One X.509-SVID as delivered on the issuance feed: the identity it was
/// issued for, its leaf-first certificate chain, and the bound private key.
///
/// The identity is taken from the feed message, matching what the agent
/// attested; the helper does not cross-check it against the certificate
/// (chain validation is out of scope).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Svid {
    spiffe_id: SpiffeId,
    cert_chain: Vec<Certificate>,
    private_key: PrivateKey,
}

/// An error that may arise building an [`X509Svid`] from wire data.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum X509SvidError {
    /// The certificate chain is empty.
    #[error("no certificates found in chain")]
    EmptyChain,

    /// The SPIFFE ID attached to the SVID is malformed.
    #[error("failed parsing SPIFFE ID: {0}")]
    InvalidSpiffeId(#[from] SpiffeIdError),

    /// Error processing the X.509 certificates.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Error processing the private key.
    #[error(transparent)]
    PrivateKey(#[from] PrivateKeyError),
}

impl X509Svid {
    /// Creates an `X509Svid` from its wire representation: a SPIFFE ID
    /// string, a concatenation of DER-encoded certificates (leaf first), and
    /// a DER-encoded PKCS#8 private key.
    ///
    /// # Errors
    ///
    /// Returns an [`X509SvidError`] if any component fails to parse or the
    /// chain is empty.
    pub fn parse_from_der(
        spiffe_id: &str,
        cert_chain_der: &[u8],
        private_key_der: &[u8],
    ) -> Result<Self, X509SvidError> {
        let spiffe_id = SpiffeId::new(spiffe_id)?;

        let cert_chain = to_certificate_vec(cert_chain_der)?;
        if cert_chain.is_empty() {
            return Err(X509SvidError::EmptyChain);
        }

        let private_key = PrivateKey::try_from(private_key_der)?;

        Ok(Self {
            spiffe_id,
            cert_chain,
            private_key,
        })
    }

    /// Returns the SPIFFE ID of the SVID.
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Returns the certificate chain, leaf first.
    pub fn cert_chain(&self) -> &[Certificate] {
        &self.cert_chain
    }

    /// Returns the private key bound to the leaf certificate.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_from_der_roundtrips_the_id() {
        let id = "spiffe://example.org/workload";
        let (cert, key) = crate::test_support::generate_svid(id);

        let svid = X509Svid::parse_from_der(id, &cert, &key).unwrap();
        assert_eq!(svid.spiffe_id().to_string(), id);
        assert_eq!(svid.cert_chain().len(), 1);
    }

    #[test]
    fn empty_chain_is_rejected() {
        let (_, key) = crate::test_support::generate_svid("spiffe://example.org/w");
        let err = X509Svid::parse_from_der("spiffe://example.org/w", &[], &key).unwrap_err();
        assert_eq!(err, X509SvidError::EmptyChain);
    }

    #[test]
    fn malformed_id_is_rejected() {
        let (cert, key) = crate::test_support::generate_svid("spiffe://example.org/w");
        let err = X509Svid::parse_from_der("http://example.org/w", &cert, &key).unwrap_err();
        assert!(matches!(err, X509SvidError::InvalidSpiffeId(_)));
    }

    #[test]
    fn garbage_key_is_rejected() {
        let (cert, _) = crate::test_support::generate_svid("spiffe://example.org/w");
        let err =
            X509Svid::parse_from_der("spiffe://example.org/w", &cert, &[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, X509SvidError::PrivateKey(_)));
    }

    #[test]
    fn garbage_chain_is_rejected() {
        let (_, key) = crate::test_support::generate_svid("spiffe://example.org/w");
        let err = X509Svid::parse_from_der("spiffe://example.org/w", &[0xFF; 16], &key)
            .unwrap_err();
        assert!(matches!(err, X509SvidError::Certificate(_)));
    }
}

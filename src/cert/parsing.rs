//! Internal DER parsing helpers.

use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::nom::Err;

use crate::cert::error::CertificateError;
use crate::cert::Certificate;

/// Maximum number of certificates accepted in one concatenated DER input.
///
/// An SVID chain carries 1-3 certificates and agent-issued trust bundles stay
/// far below this, so the cap only trips on malformed or adversarial input.
const MAX_CERT_CHAIN_LENGTH: usize = 64;

/// Splits a concatenation of DER-encoded certificates into a
/// `Vec<Certificate>`, preserving order.
pub(crate) fn to_certificate_vec(
    cert_chain_der: &[u8],
) -> Result<Vec<Certificate>, CertificateError> {
    let mut rest = cert_chain_der;
    let mut certs = Vec::new();

    while !rest.is_empty() {
        if certs.len() >= MAX_CERT_CHAIN_LENGTH {
            return Err(CertificateError::TooManyCertificates {
                max: MAX_CERT_CHAIN_LENGTH,
            });
        }

        let (new_rest, _cert) = x509_parser::parse_x509_certificate(rest).map_err(|e| match e {
            Err::Incomplete(_) => {
                CertificateError::ParseX509Certificate(X509Error::InvalidCertificate)
            }
            Err::Error(err) | Err::Failure(err) => CertificateError::ParseX509Certificate(err),
        })?;

        // The parser consumed exactly one certificate; keep its original bytes.
        let cert_len = rest.len() - new_rest.len();
        certs.push(Certificate::try_from(&rest[..cert_len])?);

        rest = new_rest;
    }

    Ok(certs)
}

/// Parses the given DER-encoded bytes as a single X.509 certificate.
pub(crate) fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, CertificateError> {
    match x509_parser::parse_x509_certificate(der_bytes) {
        Ok((_, cert)) => Ok(cert),
        Err(Err::Incomplete(_)) => Err(CertificateError::ParseX509Certificate(
            X509Error::InvalidCertificate,
        )),
        Err(Err::Error(e) | Err::Failure(e)) => Err(CertificateError::ParseX509Certificate(e)),
    }
}

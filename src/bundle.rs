//! Trust bundle types, keyed by trust domain.

use std::collections::HashMap;

use crate::cert::error::CertificateError;
use crate::cert::parsing::to_certificate_vec;
use crate::cert::Certificate;
use crate::spiffe_id::TrustDomain;

/// The trust anchors for one [`TrustDomain`], in delivery order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Bundle {
    trust_domain: TrustDomain,
    authorities: Vec<Certificate>,
}

/// A set of [`X509Bundle`], keyed by [`TrustDomain`].
///
/// One identity update can carry bundles for several trust domains (the
/// workload's own plus federated ones); the helper looks up the one matching
/// the target identity's trust domain.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct X509BundleSet {
    bundles: HashMap<TrustDomain, X509Bundle>,
}

impl X509Bundle {
    /// Parses a bundle from concatenated DER-encoded X.509 authorities.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if a record cannot be parsed.
    pub fn parse_from_der(
        trust_domain: TrustDomain,
        bundle_der: &[u8],
    ) -> Result<Self, CertificateError> {
        let authorities = to_certificate_vec(bundle_der)?;
        Ok(Self {
            trust_domain,
            authorities,
        })
    }

    /// Returns the trust domain the bundle belongs to.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Returns the X.509 authorities in the bundle.
    pub fn authorities(&self) -> &[Certificate] {
        &self.authorities
    }
}

impl X509BundleSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bundle, replacing any existing bundle for its trust domain.
    pub fn add_bundle(&mut self, bundle: X509Bundle) {
        self.bundles.insert(bundle.trust_domain().clone(), bundle);
    }

    /// Returns the bundle for the given trust domain, if present.
    pub fn bundle_for(&self, trust_domain: &TrustDomain) -> Option<&X509Bundle> {
        self.bundles.get(trust_domain)
    }
}

//! Identity update events and target selection.

use crate::bundle::X509BundleSet;
use crate::spiffe_id::SpiffeId;
use crate::svid::X509Svid;

/// One identity update from the issuance feed: every SVID currently issued to
/// this workload context, in delivery order, plus the trust bundles keyed by
/// trust domain.
///
/// Updates are ephemeral: parsed from one wire message, consumed by the
/// selector, then dropped. No history is retained.
#[derive(Debug, Clone)]
pub struct IdentityUpdate {
    svids: Vec<X509Svid>,
    bundles: X509BundleSet,
}

impl IdentityUpdate {
    /// Assembles an update from its parsed parts.
    pub fn new(svids: Vec<X509Svid>, bundles: X509BundleSet) -> Self {
        Self { svids, bundles }
    }

    /// Returns all SVIDs in the update, in delivery order.
    pub fn svids(&self) -> &[X509Svid] {
        &self.svids
    }

    /// Returns the bundle set delivered with the update.
    pub fn bundles(&self) -> &X509BundleSet {
        &self.bundles
    }

    /// Selects the SVID issued for `target`.
    ///
    /// Scans in delivery order and returns the first entry whose SPIFFE ID
    /// structurally equals `target`; all other entries are ignored. `None`
    /// means the target identity was not issued in this update, which is not
    /// an error by itself: the watcher logs it and waits for the next update,
    /// while init mode treats it as fatal.
    pub fn select(&self, target: &SpiffeId) -> Option<&X509Svid> {
        self.svids.iter().find(|svid| svid.spiffe_id() == target)
    }
}

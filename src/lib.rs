#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! A sidecar helper that provisions SPIFFE X.509 identity credentials from
//! the SPIRE agent's Workload API into a directory on disk.
//!
//! Workloads that speak plain TLS read three PEM files: `svid.pem` (the
//! certificate chain), `svid-key.pem` (the PKCS#8 private key) and
//! `bundle.pem` (the trust bundle). The helper keeps those files in place in
//! one of two modes:
//!
//! * **init**: fetch the current identity once, write the files and exit.
//!   Suited to a Kubernetes init container.
//! * **refresh**: stay connected to the agent and rewrite the files on every
//!   rotation until shut down. Suited to a sidecar container.
//!
//! The entry point is [`SvidHelper`], configured with a [`HelperConfig`]:
//!
//! ```no_run
//! use svid_helper::{HelperConfig, Mode, SvidHelper, DEFAULT_INIT_TIMEOUT};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HelperConfig {
//!     mode: Mode::Init,
//!     endpoint: "unix:///run/spire/sockets/agent.sock".parse()?,
//!     svid_dir: "/run/svid".into(),
//!     target_id: "spiffe://example.org/ns/default/sa/web".parse()?,
//!     init_timeout: DEFAULT_INIT_TIMEOUT,
//! };
//!
//! SvidHelper::new(config).run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod bundle;
pub mod cert;
pub mod disk;
pub mod helper;
pub mod spiffe_id;
pub mod svid;
pub mod update;
pub mod watcher;
pub mod workload_api;

pub use artifact::CredentialArtifact;
pub use bundle::{X509Bundle, X509BundleSet};
pub use disk::SvidDisk;
pub use helper::{
    HelperConfig, HelperError, IdentityFetcher, Mode, PreflightChecker, SvidHelper,
    WorkloadApiFetcher, DEFAULT_INIT_TIMEOUT,
};
pub use spiffe_id::{SpiffeId, TrustDomain};
pub use svid::X509Svid;
pub use update::IdentityUpdate;
pub use watcher::{RotationWatcher, WatcherState};
pub use workload_api::{Endpoint, WorkloadApiClient, WorkloadApiError};

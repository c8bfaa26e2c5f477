//! The helper controller: configuration, run modes and the top-level error
//! taxonomy.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artifact::{ArtifactError, CredentialArtifact};
use crate::disk::{DiskError, SvidDisk};
use crate::spiffe_id::SpiffeId;
use crate::update::IdentityUpdate;
use crate::watcher::RotationWatcher;
use crate::workload_api::{Endpoint, WorkloadApiClient, WorkloadApiError};

/// Default bound on the one-shot fetch in init mode.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run mode of the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Fetch credentials once and exit.
    Init,
    /// Keep credentials on disk fresh until shut down.
    Refresh,
}

/// Validated configuration for a helper run.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Run mode.
    pub mode: Mode,
    /// Workload API endpoint of the local SPIRE agent.
    pub endpoint: Endpoint,
    /// Directory the credential files are written to.
    pub svid_dir: PathBuf,
    /// SPIFFE ID the helper persists credentials for.
    pub target_id: SpiffeId,
    /// Bound on the one-shot fetch in init mode.
    pub init_timeout: Duration,
}

/// Errors terminating a helper run, each tagged with the phase it came from.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HelperError {
    /// The pre-flight check found the target directory unusable or already
    /// populated.
    #[error("pre-flight check of the SVID directory failed")]
    Preflight(#[source] DiskError),
    /// The one-shot fetch from the Workload API failed.
    #[error("unable to fetch identities from the workload api")]
    Fetch(#[source] WorkloadApiError),
    /// The agent responded, but issued no identity matching the target.
    #[error("no identity issued for {0}")]
    IdentityNotIssued(SpiffeId),
    /// The matching identity cannot be turned into a credential artifact.
    #[error("issued identity is unusable")]
    Artifact(#[source] ArtifactError),
    /// The credential files could not be written.
    #[error("unable to persist credentials")]
    Persist(#[source] DiskError),
    /// The rotation subscription could not be established.
    #[error("unable to subscribe to identity updates")]
    Subscription(#[source] WorkloadApiError),
}

/// Capability producing one identity update for init mode.
pub trait IdentityFetcher {
    /// Fetches the current identity set.
    fn fetch(&self) -> impl Future<Output = Result<IdentityUpdate, WorkloadApiError>> + Send;
}

/// Capability guarding the target directory before the first write.
pub trait PreflightChecker {
    /// Fails if the directory must not be written to.
    fn check(&self) -> Result<(), DiskError>;
}

/// Production fetcher: connects to the Workload API and takes the first
/// update off the stream.
#[derive(Debug, Clone)]
pub struct WorkloadApiFetcher {
    endpoint: Endpoint,
}

impl WorkloadApiFetcher {
    /// Creates a fetcher for the given endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl IdentityFetcher for WorkloadApiFetcher {
    fn fetch(&self) -> impl Future<Output = Result<IdentityUpdate, WorkloadApiError>> + Send {
        async move {
            let client = WorkloadApiClient::connect(&self.endpoint).await?;
            client.fetch_identity_update().await
        }
    }
}

impl PreflightChecker for SvidDisk {
    fn check(&self) -> Result<(), DiskError> {
        self.check_no_existing_svid()
    }
}

/// Drives one helper run in the configured mode.
#[derive(Debug)]
pub struct SvidHelper<F = WorkloadApiFetcher, C = SvidDisk> {
    config: HelperConfig,
    fetcher: F,
    preflight: C,
}

impl SvidHelper {
    /// Creates a helper from a validated configuration, wired to the real
    /// Workload API and disk.
    pub fn new(config: HelperConfig) -> Self {
        let fetcher = WorkloadApiFetcher::new(config.endpoint.clone());
        let preflight = SvidDisk::new(config.svid_dir.clone());
        Self::with_parts(config, fetcher, preflight)
    }
}

impl<F, C> SvidHelper<F, C>
where
    F: IdentityFetcher,
    C: PreflightChecker,
{
    /// Creates a helper with explicit fetch and pre-flight capabilities.
    pub fn with_parts(config: HelperConfig, fetcher: F, preflight: C) -> Self {
        Self {
            config,
            fetcher,
            preflight,
        }
    }

    /// Runs the helper until completion (init) or cancellation (refresh).
    ///
    /// # Errors
    ///
    /// Returns a [`HelperError`] naming the phase that failed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), HelperError> {
        match self.config.mode {
            Mode::Init => self.run_init().await,
            Mode::Refresh => self.run_refresh(cancel).await,
        }
    }

    /// One-shot mode: check the directory is empty of credentials, fetch the
    /// current identity set once, persist the matching credential and return.
    ///
    /// The pre-flight check runs before the agent is contacted, so a
    /// restarted init container fails fast without consuming agent capacity.
    /// Connecting and fetching together are bounded by the configured
    /// timeout; there is no retry.
    pub async fn run_init(&self) -> Result<(), HelperError> {
        self.preflight.check().map_err(HelperError::Preflight)?;

        info!(endpoint = %self.config.endpoint, "fetching identities");
        let update = tokio::time::timeout(self.config.init_timeout, self.fetcher.fetch())
            .await
            .map_err(|_| {
                HelperError::Fetch(WorkloadApiError::FetchTimeout(self.config.init_timeout))
            })?
            .map_err(HelperError::Fetch)?;

        let artifact = self.resolve_artifact(&update)?;
        let disk = SvidDisk::new(self.config.svid_dir.clone());
        disk.write(&artifact).map_err(HelperError::Persist)?;
        info!(
            target_id = %self.config.target_id,
            dir = %disk.dir().display(),
            "credentials written"
        );
        Ok(())
    }

    /// Long-running mode: subscribe to rotations and keep the files on disk
    /// current until cancelled.
    ///
    /// Existing files are overwritten; a refresh sidecar owns the directory.
    /// After the subscription is up, failures no longer terminate the run,
    /// they are logged by the watcher.
    pub async fn run_refresh(&self, cancel: CancellationToken) -> Result<(), HelperError> {
        let client = WorkloadApiClient::connect(&self.config.endpoint)
            .await
            .map_err(HelperError::Subscription)?;
        let updates = client
            .stream_identity_updates()
            .await
            .map_err(HelperError::Subscription)?;

        let disk = SvidDisk::new(self.config.svid_dir.clone());
        let watcher = RotationWatcher::new(self.config.target_id.clone(), disk);
        watcher.run(updates, cancel).await;
        Ok(())
    }

    fn resolve_artifact(
        &self,
        update: &IdentityUpdate,
    ) -> Result<CredentialArtifact, HelperError> {
        let svid = update
            .select(&self.config.target_id)
            .ok_or_else(|| HelperError::IdentityNotIssued(self.config.target_id.clone()))?;
        let bundle = update
            .bundles()
            .bundle_for(self.config.target_id.trust_domain());
        CredentialArtifact::resolve(svid, bundle).map_err(HelperError::Artifact)
    }
}

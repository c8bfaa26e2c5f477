//! Client for the X.509 surface of the SPIFFE Workload API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use tokio_stream::{Stream, StreamExt};
use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint as TonicEndpoint, Uri};
use tower::service_fn;

use crate::bundle::{X509Bundle, X509BundleSet};
use crate::spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain, SPIFFE_SCHEME_PREFIX};
use crate::svid::X509Svid;
use crate::update::IdentityUpdate;
use crate::workload_api::endpoint::Endpoint;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::pb::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use crate::workload_api::pb::{X509svidRequest, X509svidResponse};

const SPIFFE_HEADER_KEY: &str = "workload.spiffe.io";
const SPIFFE_HEADER_VALUE: &str = "true";

// Placeholder authority; the unix connector ignores it.
const TONIC_DUMMY_URI: &str = "http://[::]:50051";

/// Tonic interceptor adding the security metadata header the agent requires
/// on every Workload API call.
#[derive(Debug, Clone)]
pub struct MetadataAdder;

impl tonic::service::Interceptor for MetadataAdder {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        request.metadata_mut().insert(
            SPIFFE_HEADER_KEY,
            MetadataValue::from_static(SPIFFE_HEADER_VALUE),
        );
        Ok(request)
    }
}

/// Client for the SPIFFE Workload API, connected over a Unix domain socket or
/// TCP.
///
/// Provides the two operations the helper needs: a one-shot fetch of the
/// current identity set (init mode) and a lazy update stream (refresh mode).
#[derive(Debug, Clone)]
pub struct WorkloadApiClient {
    client: SpiffeWorkloadApiClient<InterceptedService<Channel, MetadataAdder>>,
}

impl WorkloadApiClient {
    /// Connects to the Workload API at the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the endpoint cannot be reached.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, WorkloadApiError> {
        let channel = match endpoint {
            Endpoint::Unix(path) => connect_unix(path).await?,
            Endpoint::Tcp { host, port } => {
                TonicEndpoint::try_from(format!("http://{host}:{port}"))?
                    .connect()
                    .await?
            }
        };

        Ok(Self {
            client: SpiffeWorkloadApiClient::with_interceptor(channel, MetadataAdder),
        })
    }

    /// Fetches the current identity set as a single update.
    ///
    /// Issues the streaming RPC and takes its first message; the agent always
    /// sends the current state as the first item on the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the RPC fails, the stream ends
    /// without a message, or the response cannot be parsed.
    pub async fn fetch_identity_update(&self) -> Result<IdentityUpdate, WorkloadApiError> {
        let mut client = self.client.clone();
        let mut stream = client
            .fetch_x509svid(X509svidRequest::default())
            .await?
            .into_inner();

        let response = stream
            .message()
            .await?
            .ok_or(WorkloadApiError::EmptyResponse)?;

        parse_identity_update(response)
    }

    /// Subscribes to identity updates.
    ///
    /// The returned stream yields one [`IdentityUpdate`] per agent-side
    /// rotation and ends when the agent closes the connection. It does not
    /// reconnect; dropping it tears the subscription down.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the subscription cannot be
    /// established.
    pub async fn stream_identity_updates(
        &self,
    ) -> Result<
        impl Stream<Item = Result<IdentityUpdate, WorkloadApiError>> + Send + Unpin + 'static,
        WorkloadApiError,
    > {
        let mut client = self.client.clone();
        let response = client.fetch_x509svid(X509svidRequest::default()).await?;

        let stream = response.into_inner().map(|message| {
            message
                .map_err(WorkloadApiError::from)
                .and_then(parse_identity_update)
        });
        Ok(Box::pin(stream))
    }
}

async fn connect_unix(path: &Path) -> Result<Channel, WorkloadApiError> {
    #[cfg(not(unix))]
    {
        let _ = path;
        Err(WorkloadApiError::UnsupportedTransport { scheme: "unix" })
    }

    #[cfg(unix)]
    {
        let path: Arc<PathBuf> = Arc::new(path.to_path_buf());

        let channel = TonicEndpoint::try_from(TONIC_DUMMY_URI)?
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = Arc::clone(&path);
                async move {
                    let stream = tokio::net::UnixStream::connect(path.as_path()).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await?;

        Ok(channel)
    }
}

/// Parses one wire response into an [`IdentityUpdate`]: each SVID with its
/// own trust-domain bundle, plus any federated bundles, merged into one
/// bundle set keyed by trust domain.
fn parse_identity_update(
    response: X509svidResponse,
) -> Result<IdentityUpdate, WorkloadApiError> {
    let mut svids = Vec::with_capacity(response.svids.len());
    let mut bundles = X509BundleSet::new();

    for svid in &response.svids {
        let parsed = X509Svid::parse_from_der(&svid.spiffe_id, &svid.x509_svid, &svid.x509_svid_key)
            .map_err(|source| WorkloadApiError::X509Svid {
                spiffe_id: svid.spiffe_id.clone(),
                source,
            })?;

        let trust_domain = parsed.spiffe_id().trust_domain().clone();
        bundles.add_bundle(X509Bundle::parse_from_der(trust_domain, &svid.bundle)?);
        svids.push(parsed);
    }

    for (key, bundle) in &response.federated_bundles {
        let trust_domain = parse_bundle_key(key)?;
        bundles.add_bundle(X509Bundle::parse_from_der(trust_domain, bundle)?);
    }

    Ok(IdentityUpdate::new(svids, bundles))
}

/// Federated bundle map keys are the SPIFFE ID of the foreign trust domain,
/// e.g. `spiffe://other.org`; bare names are accepted too.
fn parse_bundle_key(key: &str) -> Result<TrustDomain, SpiffeIdError> {
    if key.starts_with(SPIFFE_SCHEME_PREFIX) {
        Ok(SpiffeId::new(key)?.trust_domain().clone())
    } else {
        TrustDomain::new(key)
    }
}

//! Error types for the Workload API client.

use thiserror::Error;

use crate::spiffe_id::SpiffeIdError;
use crate::svid::X509SvidError;
use crate::workload_api::endpoint::EndpointError;

/// Errors produced talking to the Workload API or decoding its responses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkloadApiError {
    /// The response stream ended without a message.
    #[error("empty Workload API response")]
    EmptyResponse,

    /// The one-shot fetch did not complete within the configured timeout.
    #[error("Workload API fetch timed out after {0:?}")]
    FetchTimeout(std::time::Duration),

    /// The agent denied issuing an identity for this workload (e.g. its
    /// selectors match no registration entry).
    #[error("no identity issued")]
    NoIdentityIssued,

    /// The agent denied the request for other permission reasons.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Failed to parse an X.509 SVID from a response. Carries the SPIFFE ID
    /// the agent attached to the unusable entry so logs can name it.
    #[error("failed parsing X.509 SVID for {spiffe_id}: {source}")]
    X509Svid {
        /// SPIFFE ID of the entry that could not be parsed.
        spiffe_id: String,
        /// Underlying parse error.
        #[source]
        source: X509SvidError,
    },

    /// Failed to parse a trust bundle from a response.
    #[error("failed parsing trust bundle: {0}")]
    Bundle(#[from] crate::cert::error::CertificateError),

    /// Failed to parse a trust domain key of the federated bundle map.
    #[error("failed parsing trust domain: {0}")]
    TrustDomain(#[from] SpiffeIdError),

    /// The endpoint string is invalid.
    #[error("invalid Workload API endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// The endpoint transport is unsupported on the current platform.
    #[error("unsupported endpoint transport: {scheme}")]
    UnsupportedTransport {
        /// The unsupported transport scheme.
        scheme: &'static str,
    },

    /// gRPC status returned by the agent.
    #[error("gRPC status: {0}")]
    Grpc(#[source] tonic::Status),

    /// Transport error while connecting to the agent.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl From<tonic::Status> for WorkloadApiError {
    fn from(status: tonic::Status) -> Self {
        // SPIRE reports unmatched selectors as PermissionDenied with the
        // message "no identity issued"; surface it as a matchable variant.
        if status.code() == tonic::Code::PermissionDenied {
            let msg = status.message();
            if msg.contains("no identity issued") {
                return WorkloadApiError::NoIdentityIssued;
            }
            return WorkloadApiError::PermissionDenied(msg.to_owned());
        }

        WorkloadApiError::Grpc(status)
    }
}

//! Connectivity to the SPIRE agent's Workload API.
//!
//! The agent serves the Workload API over a local endpoint, Unix domain
//! socket in the common case. [`Endpoint`] parses the endpoint address,
//! [`WorkloadApiClient`] speaks the X.509 surface of the protocol.

pub mod client;
pub mod endpoint;
pub mod error;

/// Generated protobuf and gRPC bindings for the Workload API.
///
/// The upstream proto declares no package, so the bindings land in the
/// crate-root output file.
#[allow(missing_docs, unreachable_pub, clippy::all)]
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/_.rs"));
}

pub use client::WorkloadApiClient;
pub use endpoint::Endpoint;
pub use error::WorkloadApiError;

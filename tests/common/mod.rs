//! Shared fixtures: self-signed SVIDs and an in-process Workload API agent
//! served over a Unix domain socket.

#![allow(dead_code)]

use std::path::Path;
use std::pin::Pin;

use tokio_stream::wrappers::UnixListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use svid_helper::workload_api::pb::spiffe_workload_api_server::{
    SpiffeWorkloadApi, SpiffeWorkloadApiServer,
};
use svid_helper::workload_api::pb::{X509svid, X509svidRequest, X509svidResponse};

/// Generates a self-signed certificate carrying `id` as a URI SAN, returning
/// the DER certificate and the DER PKCS#8 private key.
pub fn generate_svid(id: &str) -> (Vec<u8>, Vec<u8>) {
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new());
    params.subject_alt_names = vec![rcgen::SanType::URI(id.to_string())];
    let cert = rcgen::Certificate::from_params(params).expect("generate certificate");
    (
        cert.serialize_der().expect("serialize certificate"),
        cert.serialize_private_key_der(),
    )
}

/// Builds a wire SVID message for `id`, self-signed, with its own cert as
/// the trust bundle.
pub fn svid_message(id: &str) -> X509svid {
    let (cert, key) = generate_svid(id);
    X509svid {
        spiffe_id: id.to_string(),
        x509_svid: cert.clone(),
        x509_svid_key: key,
        bundle: cert,
        hint: String::new(),
    }
}

/// Builds a response carrying one SVID per given ID.
pub fn response_with(ids: &[&str]) -> X509svidResponse {
    X509svidResponse {
        svids: ids.iter().map(|id| svid_message(id)).collect(),
        crl: Vec::new(),
        federated_bundles: Default::default(),
    }
}

/// What the mock agent replies to a fetch with.
pub enum AgentScript {
    /// Stream the responses in order, then leave the stream open.
    Respond(Vec<X509svidResponse>),
    /// Fail the RPC with the given status.
    Reject(Status),
    /// Accept the RPC but never yield a message.
    Hang,
}

/// Minimal Workload API agent. Enforces the `workload.spiffe.io` security
/// header like the real agent does.
pub struct MockAgent {
    script: AgentScript,
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<X509svidResponse, Status>> + Send>>;

#[tonic::async_trait]
impl SpiffeWorkloadApi for MockAgent {
    type FetchX509SVIDStream = ResponseStream;

    async fn fetch_x509svid(
        &self,
        request: Request<X509svidRequest>,
    ) -> Result<Response<Self::FetchX509SVIDStream>, Status> {
        let header_ok = request
            .metadata()
            .get("workload.spiffe.io")
            .map(|v| v == "true")
            .unwrap_or(false);
        if !header_ok {
            return Err(Status::invalid_argument("security header missing"));
        }

        match &self.script {
            AgentScript::Respond(responses) => {
                let items = responses.clone().into_iter().map(Ok).collect::<Vec<_>>();
                let stream = tokio_stream::iter(items).chain(tokio_stream::pending());
                Ok(Response::new(Box::pin(stream)))
            }
            AgentScript::Reject(status) => Err(status.clone()),
            AgentScript::Hang => Ok(Response::new(Box::pin(tokio_stream::pending()))),
        }
    }
}

/// Serves a mock agent on `socket_path` until the returned task is aborted.
pub fn spawn_agent(socket_path: &Path, script: AgentScript) -> tokio::task::JoinHandle<()> {
    let listener = tokio::net::UnixListener::bind(socket_path).expect("bind agent socket");
    let incoming = UnixListenerStream::new(listener);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(SpiffeWorkloadApiServer::new(MockAgent { script }))
            .serve_with_incoming(incoming)
            .await
            .expect("serve mock agent");
    })
}

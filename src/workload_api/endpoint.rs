//! Workload API endpoint parsing and validation.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

const UNIX_SCHEME: &str = "unix";
const TCP_SCHEME: &str = "tcp";

/// Parsed address of the Workload API served by the SPIRE agent.
///
/// The agent normally listens on a Unix domain socket; TCP endpoints are
/// accepted for completeness and must name an IP address, not a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket endpoint.
    Unix(PathBuf),

    /// TCP endpoint.
    Tcp {
        /// IP address of the endpoint.
        host: IpAddr,
        /// TCP port of the endpoint.
        port: u16,
    },
}

/// Errors returned by [`Endpoint::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// The input could not be parsed as a URI.
    #[error("endpoint socket is not a valid URI")]
    Parse(#[from] url::ParseError),

    /// The URI scheme is not supported.
    #[error("endpoint socket URI scheme must be unix: or tcp:")]
    InvalidScheme,

    /// User info, query values and fragments are not allowed.
    #[error("endpoint socket URI must not include user info, query values or a fragment")]
    HasForbiddenComponent,

    /// `unix:` endpoints must carry an absolute path.
    #[error("unix: endpoint socket URI must include an absolute path")]
    UnixMissingPath,

    /// `tcp:` endpoints must use an IP address.
    #[error("tcp: endpoint socket URI host must be an IP address")]
    TcpHostNotIp,

    /// `tcp:` endpoints must include a port.
    #[error("tcp: endpoint socket URI must include a port")]
    TcpMissingPort,
}

impl Endpoint {
    /// Parses a Workload API endpoint URI.
    ///
    /// Accepted forms: `unix:///path/to/socket`, the shorthand
    /// `unix:/path/to/socket`, a bare absolute path `/path/to/socket`,
    /// `tcp://1.2.3.4:8081` and the shorthand `tcp:1.2.3.4:8081`.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] when the input does not satisfy the
    /// validation rules for its scheme.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        // A bare absolute path is the way the original helper was configured
        // (`--workload-api-socket /run/spire/agent.sock`); keep accepting it.
        if input.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(input)));
        }

        let url = Url::parse(&normalize(input))?;

        if !url.username().is_empty() || url.query().is_some() || url.fragment().is_some() {
            return Err(EndpointError::HasForbiddenComponent);
        }

        match url.scheme() {
            UNIX_SCHEME => {
                let path = url.path();
                if url.host_str().is_some() || !path.starts_with('/') || path == "/" {
                    return Err(EndpointError::UnixMissingPath);
                }
                Ok(Self::Unix(PathBuf::from(path)))
            }

            TCP_SCHEME => {
                let host = match url.host() {
                    Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip),
                    Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip),
                    // IPv4 literals are sometimes classified as Domain.
                    Some(url::Host::Domain(domain)) => {
                        IpAddr::from_str(domain).map_err(|_| EndpointError::TcpHostNotIp)?
                    }
                    None => return Err(EndpointError::TcpHostNotIp),
                };
                let port = url.port().ok_or(EndpointError::TcpMissingPort)?;
                Ok(Self::Tcp { host, port })
            }

            _ => Err(EndpointError::InvalidScheme),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// Rewrites the `unix:/path` and `tcp:IP:PORT` shorthands into full URIs.
fn normalize(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("unix:/") {
        if !rest.starts_with('/') {
            return format!("unix:///{rest}");
        }
    }
    if let Some(rest) = input.strip_prefix("tcp:") {
        if !rest.starts_with("//") {
            return format!("tcp://{rest}");
        }
    }
    input.to_owned()
}

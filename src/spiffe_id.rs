//! SPIFFE ID and trust domain types.
//!
//! The helper selects the SVID to persist by comparing the IDs delivered on
//! the Workload API feed against the configured pod SPIFFE ID, so parsing is
//! strict: IDs must already be canonical, no normalization is applied.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

pub(crate) const SPIFFE_SCHEME_PREFIX: &str = "spiffe://";

const TRUST_DOMAIN_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-._";
const PATH_SEGMENT_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._";

/// A structured workload identifier, e.g. `spiffe://example.org/workload`.
///
/// Equality is structural over trust domain and path. `spiffe://td/a` and
/// `spiffe://td/a/` are not equal; the latter does not even parse.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: String,
}

/// The authority component of a [`SpiffeId`], naming the issuing trust domain.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TrustDomain {
    name: String,
}

/// An error arising from parsing a SPIFFE ID or trust domain name.
#[derive(Debug, Error, PartialEq, Clone)]
#[non_exhaustive]
pub enum SpiffeIdError {
    /// An empty string cannot be parsed as a SPIFFE ID.
    #[error("cannot be empty")]
    Empty,

    /// A SPIFFE ID must start with the scheme 'spiffe://'.
    #[error("scheme is missing or invalid")]
    WrongScheme,

    /// The trust domain component is empty.
    #[error("trust domain is missing")]
    MissingTrustDomain,

    /// The trust domain contains a character outside its limited char set.
    #[error(
        "trust domain characters are limited to lowercase letters, numbers, dots, dashes, and \
         underscores"
    )]
    BadTrustDomainChar,

    /// A path segment contains a character outside its limited char set.
    #[error(
        "path segment characters are limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadPathSegmentChar,

    /// The path contains an empty segment, e.g. '//'.
    #[error("path cannot contain empty segments")]
    EmptySegment,

    /// The path contains a relative dot segment, e.g. '/.' or '/..'.
    #[error("path cannot contain dot segments")]
    DotSegment,

    /// The path ends with a slash.
    #[error("path cannot have a trailing slash")]
    TrailingSlash,
}

impl SpiffeId {
    /// Parses a SPIFFE ID from a string such as `spiffe://trustdomain/path`.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] when the input does not conform to the
    /// SPIFFE ID grammar.
    pub fn new(id: &str) -> Result<Self, SpiffeIdError> {
        if id.is_empty() {
            return Err(SpiffeIdError::Empty);
        }
        if !id.starts_with(SPIFFE_SCHEME_PREFIX) {
            return Err(SpiffeIdError::WrongScheme);
        }

        let rest = &id[SPIFFE_SCHEME_PREFIX.len()..];
        let td_end = rest.find('/').unwrap_or(rest.len());
        if td_end == 0 {
            return Err(SpiffeIdError::MissingTrustDomain);
        }

        let name = &rest[..td_end];
        validate_trust_domain_name(name)?;

        let path = &rest[td_end..];
        if !path.is_empty() {
            validate_path(path)?;
        }

        Ok(Self {
            trust_domain: TrustDomain {
                name: name.to_string(),
            },
            path: path.to_string(),
        })
    }

    /// Returns the trust domain of the SPIFFE ID.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Returns the path of the SPIFFE ID, including the leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Display for SpiffeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", SPIFFE_SCHEME_PREFIX, self.trust_domain, self.path)
    }
}

impl FromStr for SpiffeId {
    type Err = SpiffeIdError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        Self::new(id)
    }
}

impl TryFrom<&str> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl TryFrom<String> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(&id)
    }
}

impl TrustDomain {
    /// Parses a trust domain from a bare name, e.g. `example.org`.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] when the name is empty or contains an
    /// invalid character.
    pub fn new(name: &str) -> Result<Self, SpiffeIdError> {
        if name.is_empty() {
            return Err(SpiffeIdError::MissingTrustDomain);
        }
        validate_trust_domain_name(name)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl Display for TrustDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl AsRef<str> for TrustDomain {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl FromStr for TrustDomain {
    type Err = SpiffeIdError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::new(name)
    }
}

fn validate_trust_domain_name(name: &str) -> Result<(), SpiffeIdError> {
    if name.chars().all(|c| TRUST_DOMAIN_CHARS.contains(c)) {
        Ok(())
    } else {
        Err(SpiffeIdError::BadTrustDomainChar)
    }
}

fn validate_path(path: &str) -> Result<(), SpiffeIdError> {
    let mut segment_start = 0;

    for (idx, c) in path.char_indices() {
        if c == '/' {
            match &path[segment_start..idx] {
                "/" => return Err(SpiffeIdError::EmptySegment),
                "/." | "/.." => return Err(SpiffeIdError::DotSegment),
                _ => {}
            }
            segment_start = idx;
            continue;
        }

        if !PATH_SEGMENT_CHARS.contains(c) {
            return Err(SpiffeIdError::BadPathSegmentChar);
        }
    }

    match &path[segment_start..] {
        "/" => Err(SpiffeIdError::TrailingSlash),
        "/." | "/.." => Err(SpiffeIdError::DotSegment),
        _ => Ok(()),
    }
}

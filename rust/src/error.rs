//! Error kinds of the verification pipeline.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::fetch::FetchError;
use crate::rpmverify::PackageCheckError;

/// Everything that can stop keyring assembly, a package verification, or a run.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("could not fetch gpgkey {url}")]
    KeySourceFetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("could not load gpgkey {url}")]
    KeySourceParse {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    /// A single candidate URL could not be downloaded.  Absorbed by the
    /// package verifier, which moves on to the next candidate.
    #[error("failed to download {url}")]
    PackageUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to verify {url}")]
    SignatureInvalid {
        url: String,
        #[source]
        source: PackageCheckError,
    },
    #[error("expected sha256 sum {expected}, but got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("none of the {} candidate URLs could be downloaded: {}", .urls.len(), .urls.join(", "))]
    NoReachableSource { urls: Vec<String> },
    #[error("refusing to verify packages against an empty keyring")]
    EmptyKeyring,
    #[error("invalid package {name}: {reason}")]
    InvalidPackage { name: String, reason: String },
    #[error("operation was cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("could not verify {name}")]
    RunAborted {
        name: String,
        #[source]
        source: Box<VerifyError>,
    },
}

impl VerifyError {
    /// Whether this error (or the error it wraps) came from cancellation
    /// rather than from verification.
    pub fn is_cancellation(&self) -> bool {
        match self {
            VerifyError::Cancelled | VerifyError::DeadlineExceeded => true,
            VerifyError::RunAborted { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

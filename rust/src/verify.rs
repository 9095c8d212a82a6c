// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Verification of the packages referenced by a workspace: each package is
//! downloaded from the first reachable mirror, checked against the keyring,
//! and its content digest compared with the one pinned in the workspace.

use crate::cancel::Cancellable;
use crate::config::{EmptyKeyringPolicy, UnreachablePolicy, VerifyConfig};
use crate::digest::HashingReader;
use crate::error::VerifyError;
use crate::fetch::{FetchError, Fetcher};
use crate::keyring::TrustSet;
use crate::rpmverify::{self, VerifiedRpm};

/// A package as pinned by the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    name: String,
    urls: Vec<String>,
    sha256: String,
}

impl PackageDescriptor {
    /// A package must have at least one candidate URL.
    pub fn new(
        name: impl Into<String>,
        urls: Vec<String>,
        sha256: impl Into<String>,
    ) -> Result<Self, VerifyError> {
        let name = name.into();
        if urls.is_empty() {
            return Err(VerifyError::InvalidPackage {
                name,
                reason: "no candidate URLs".into(),
            });
        }
        Ok(Self {
            name,
            urls,
            sha256: sha256.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate URLs, in the order they are tried.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Expected SHA-256 of the whole package file, as hex.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPackage {
    /// The mirror which served the package.
    pub url: String,
    pub sha256: String,
    pub rpm: VerifiedRpm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Verified(VerifiedPackage),
    /// No candidate URL could be downloaded, so nothing was verified.
    /// Only returned under [`UnreachablePolicy::Permissive`].
    Unreachable,
}

/// Verifies single packages against a keyring.
#[derive(Debug, Clone)]
pub struct PackageVerifier {
    fetcher: Fetcher,
    config: VerifyConfig,
}

impl PackageVerifier {
    pub fn new(fetcher: Fetcher, config: VerifyConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    fn cancellable(&self) -> &Cancellable {
        self.fetcher.cancellable()
    }

    /// Try the candidate URLs of `pkg` in order until one yields a package.
    ///
    /// Download failures move on to the next URL.  Once a body is being
    /// read, the first signature, structure or digest failure is final and
    /// no other URL is tried.  A missing trust set is the same as an empty one.
    #[tracing::instrument(skip_all, fields(package = %pkg.name()))]
    pub fn verify(
        &self,
        pkg: &PackageDescriptor,
        trust: Option<&TrustSet>,
    ) -> Result<PackageOutcome, VerifyError> {
        let empty = TrustSet::default();
        let trust = trust.unwrap_or(&empty);
        if trust.is_empty() && self.config.empty_keyring == EmptyKeyringPolicy::FailClosed {
            return Err(VerifyError::EmptyKeyring);
        }

        for url in pkg.urls() {
            self.cancellable().set_error_if_cancelled()?;
            tracing::info!("Verifying {} from {url}", pkg.name());
            let body = match self.fetcher.get(url) {
                Ok(body) => body,
                Err(e) => {
                    self.cancellable().set_error_if_cancelled()?;
                    self.skip_mirror(url, e);
                    continue;
                }
            };

            let mut body = HashingReader::new(body, self.cancellable().clone());
            let rpm = match rpmverify::check_package(&mut body, trust) {
                Ok(rpm) => rpm,
                Err(e) => {
                    self.cancellable().set_error_if_cancelled()?;
                    // The connection dropped; this says nothing about the package.
                    if let Some(source) = body.take_source_error() {
                        self.skip_mirror(url, FetchError::Body(source));
                        continue;
                    }
                    return Err(VerifyError::SignatureInvalid {
                        url: url.clone(),
                        source: e,
                    });
                }
            };
            let digest = match body.finish() {
                Ok(d) => d,
                Err(e) => {
                    self.cancellable().set_error_if_cancelled()?;
                    self.skip_mirror(url, FetchError::Body(e));
                    continue;
                }
            };
            tracing::debug!("{}: sha256 {} ({} bytes)", rpm.nevra, digest.sha256, digest.len);
            if !digest.sha256.eq_ignore_ascii_case(pkg.sha256()) {
                return Err(VerifyError::DigestMismatch {
                    expected: pkg.sha256().to_string(),
                    actual: digest.sha256,
                });
            }
            return Ok(PackageOutcome::Verified(VerifiedPackage {
                url: url.clone(),
                sha256: digest.sha256,
                rpm,
            }));
        }

        match self.config.unreachable {
            UnreachablePolicy::Strict => Err(VerifyError::NoReachableSource {
                urls: pkg.urls().to_vec(),
            }),
            UnreachablePolicy::Permissive => {
                tracing::warn!(
                    "None of the URLs of {} could be downloaded, it was not verified",
                    pkg.name()
                );
                Ok(PackageOutcome::Unreachable)
            }
        }
    }

    fn skip_mirror(&self, url: &str, e: FetchError) {
        let e = VerifyError::PackageUnreachable {
            url: url.to_string(),
            source: e,
        };
        tracing::warn!("{:#}, continuing with next url", anyhow::Error::new(e));
    }
}

/// Totals of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub verified: Vec<VerifiedPackage>,
    /// Names of packages none of whose URLs could be downloaded.
    pub unreachable: Vec<String>,
}

/// Verify `packages` in order, stopping at the first failure.
pub fn run(
    packages: &[PackageDescriptor],
    trust: &TrustSet,
    verifier: &PackageVerifier,
) -> Result<RunSummary, VerifyError> {
    if trust.is_empty() && verifier.config().empty_keyring == EmptyKeyringPolicy::Permissive {
        tracing::warn!("No repository provides a gpgkey; package signatures will not be checked");
    }
    let mut summary = RunSummary::default();
    for pkg in packages {
        let outcome = verifier
            .verify(pkg, Some(trust))
            .map_err(|e| VerifyError::RunAborted {
                name: pkg.name().to_string(),
                source: Box::new(e),
            })?;
        match outcome {
            PackageOutcome::Verified(v) => summary.verified.push(v),
            PackageOutcome::Unreachable => summary.unreachable.push(pkg.name().to_string()),
        }
    }
    Ok(summary)
}

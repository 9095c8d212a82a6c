//! The keyring: OpenPGP certificates gathered from the `gpgkey` of
//! every enabled repository.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::error::VerifyError;
use crate::fetch::Fetcher;
use crate::repos::RepositoryDescriptor;
use anyhow::{bail, Result};
use openpgp::cert::{Cert, CertParser};
use openpgp::packet::Signature;
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use sequoia_openpgp as openpgp;

/// The set of trusted certificates for a run.  Immutable once built.
///
/// An empty set is valid: it means no repository configured a key, and
/// packages can then only be checked for integrity, not authenticity.
#[derive(Debug, Clone, Default)]
pub struct TrustSet {
    certs: Vec<Cert>,
}

impl TrustSet {
    pub fn new(certs: Vec<Cert>) -> Self {
        Self { certs }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cert> {
        self.certs.iter()
    }

    /// Primary key fingerprints, in keyring order.
    pub fn fingerprints(&self) -> Vec<String> {
        self.certs.iter().map(|c| c.fingerprint().to_hex()).collect()
    }

    /// Find a signing-capable key which made `sig` over `data`, returning
    /// its fingerprint.
    pub(crate) fn verify(&self, sig: &Signature, data: &[u8]) -> Option<String> {
        let policy = StandardPolicy::new();
        for cert in &self.certs {
            for key in cert.keys().with_policy(&policy, None).for_signing() {
                let mut sig = sig.clone();
                if sig.verify_message(key.key(), data).is_ok() {
                    return Some(key.key().fingerprint().to_hex());
                }
            }
        }
        None
    }
}

/// Parse an (armored or binary) keyring; it must hold at least one certificate.
pub fn parse_keyring(data: &[u8]) -> Result<Vec<Cert>> {
    let mut certs = Vec::new();
    for cert in CertParser::from_bytes(data)? {
        certs.push(cert?);
    }
    if certs.is_empty() {
        bail!("No public keys found");
    }
    Ok(certs)
}

/// Fetch and parse the key of every enabled repository, in order.
/// Any failure aborts the whole build; a partial keyring is never returned.
pub fn build_keyring(
    repos: &[RepositoryDescriptor],
    fetcher: &Fetcher,
) -> Result<TrustSet, VerifyError> {
    let cancellable = fetcher.cancellable();
    let mut certs = Vec::new();
    for repo in repos {
        let url = match repo.key_source() {
            Some(url) => url,
            None => continue,
        };
        cancellable.set_error_if_cancelled()?;
        tracing::info!("Loading gpgkey {} for repository {}", url, repo.name);
        let data = match fetcher.get_bytes(url) {
            Ok(data) => data,
            Err(source) => {
                cancellable.set_error_if_cancelled()?;
                return Err(VerifyError::KeySourceFetch {
                    url: url.to_string(),
                    source,
                });
            }
        };
        let keys = parse_keyring(&data).map_err(|source| VerifyError::KeySourceParse {
            url: url.to_string(),
            source,
        })?;
        for k in &keys {
            tracing::debug!("Trusting key {}", k.fingerprint().to_hex());
        }
        certs.extend(keys);
    }
    Ok(TrustSet::new(certs))
}

//! Implementation of `rpm-verify verify`.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::cancel::Cancellable;
use crate::config::{
    EmptyKeyringPolicy, FetchConfig, UnreachablePolicy, VerifyConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_TIMEOUT,
};
use crate::fetch::Fetcher;
use crate::keyring::build_keyring;
use crate::repos::load_repo_file;
use crate::verify::{run, PackageVerifier, RunSummary};
use crate::workspace::load_workspace;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Parser)]
#[clap(rename_all = "kebab-case")]
pub struct VerifyOpts {
    /// Repository file listing the gpgkey of each repository
    #[clap(long, short = 'r', default_value = "repo.yaml")]
    pub repofile: Utf8PathBuf,

    /// Bazel WORKSPACE file containing the rpm() rules to verify
    #[clap(long, short = 'w', default_value = "WORKSPACE")]
    pub workspace: Utf8PathBuf,

    /// Timeout for a single download, in seconds
    #[clap(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Timeout for establishing a connection, in seconds
    #[clap(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout: u64,

    /// Abort the whole run after this many seconds
    #[clap(long)]
    pub deadline: Option<u64>,

    /// Fail if no repository provides a gpgkey, instead of only checking digests
    #[clap(long)]
    pub fail_on_empty_keyring: bool,

    /// Fail if none of the URLs of a package can be downloaded
    #[clap(long)]
    pub require_reachable: bool,
}

impl VerifyOpts {
    pub fn config(&self) -> VerifyConfig {
        VerifyConfig {
            fetch: FetchConfig {
                timeout: Duration::from_secs(self.timeout),
                connect_timeout: Duration::from_secs(self.connect_timeout),
                ..Default::default()
            },
            empty_keyring: if self.fail_on_empty_keyring {
                EmptyKeyringPolicy::FailClosed
            } else {
                EmptyKeyringPolicy::Permissive
            },
            unreachable: if self.require_reachable {
                UnreachablePolicy::Strict
            } else {
                UnreachablePolicy::Permissive
            },
        }
    }

    fn cancellable(&self) -> Cancellable {
        match self.deadline {
            Some(secs) => Cancellable::with_timeout(Duration::from_secs(secs)),
            None => Cancellable::new(),
        }
    }
}

/// Build the keyring from `repofile`, then verify every package of `workspace`.
pub fn verify_workspace(
    repofile: &Utf8Path,
    workspace: &Utf8Path,
    config: &VerifyConfig,
    cancellable: Cancellable,
) -> Result<RunSummary> {
    let repos = load_repo_file(repofile)?;
    let packages = load_workspace(workspace)?;
    let fetcher = Fetcher::new(&config.fetch, cancellable)?;
    let trust = build_keyring(&repos, &fetcher)?;
    tracing::info!(
        "Loaded {} keys from {} repositories",
        trust.len(),
        repos.len()
    );
    let verifier = PackageVerifier::new(fetcher, config.clone());
    Ok(run(&packages, &trust, &verifier)?)
}

/// Main entrypoint for verify
pub fn entrypoint(opts: &VerifyOpts) -> Result<()> {
    let summary = verify_workspace(
        &opts.repofile,
        &opts.workspace,
        &opts.config(),
        opts.cancellable(),
    )?;
    tracing::info!("Verified {} packages", summary.verified.len());
    if !summary.unreachable.is_empty() {
        tracing::warn!(
            "Could not download {} packages: {}",
            summary.unreachable.len(),
            summary.unreachable.join(", ")
        );
    }
    Ok(())
}

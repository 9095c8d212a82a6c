/*
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Verification of the RPMs pinned by a Bazel workspace: signatures are
//! checked against the GPG keys of the configured repositories, and the
//! content digest against the one recorded in the workspace.

pub mod builtins;
pub mod cancel;
pub mod cli;
pub mod config;
mod digest;
pub mod error;
pub mod fetch;
pub mod keyring;
pub mod repos;
pub mod rpmverify;
#[cfg(test)]
mod testutils;
pub mod verify;
pub mod workspace;

pub use cancel::Cancellable;
pub use config::{EmptyKeyringPolicy, FetchConfig, UnreachablePolicy, VerifyConfig};
pub use error::VerifyError;
pub use keyring::{build_keyring, TrustSet};
pub use repos::RepositoryDescriptor;
pub use verify::{run, PackageDescriptor, PackageOutcome, PackageVerifier, RunSummary};

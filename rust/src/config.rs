//! Runtime settings for a verification run.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Duration;

/// Default total timeout for a single HTTP request, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when no repository provides a GPG key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyKeyringPolicy {
    /// Still verify packages, but only for structural integrity and digests;
    /// signatures are not checked for authenticity.
    #[default]
    Permissive,
    /// Reject every package.
    FailClosed,
}

/// What to do when every candidate URL of a package fails to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreachablePolicy {
    /// Log a warning and treat the package as not verified, without failing.
    #[default]
    Permissive,
    /// Fail the package.
    Strict,
}

/// HTTP transport settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("rpm-verify/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyConfig {
    pub fetch: FetchConfig,
    pub empty_keyring: EmptyKeyringPolicy,
    pub unreachable: UnreachablePolicy,
}

//! Tag numbers used by this crate and its consumers.
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Main header
pub const NAME: u32 = 1000;
pub const VERSION: u32 = 1001;
pub const RELEASE: u32 = 1002;
pub const EPOCH: u32 = 1003;
pub const ARCH: u32 = 1022;
pub const PAYLOADDIGEST: u32 = 5092;
pub const PAYLOADDIGESTALGO: u32 = 5093;

// Signature header
pub const SIG_DSA: u32 = 267;
pub const SIG_RSA: u32 = 268;
pub const SIG_SHA1: u32 = 269;
pub const SIG_LONGSIZE: u32 = 270;
pub const SIG_SHA256: u32 = 273;
pub const SIG_SIZE: u32 = 1000;
pub const SIG_PGP: u32 = 1002;
pub const SIG_MD5: u32 = 1004;
pub const SIG_GPG: u32 = 1005;

/// OpenPGP hash algorithm identifiers, as used by `PAYLOADDIGESTALGO`.
pub mod hashalgo {
    pub const MD5: u32 = 1;
    pub const SHA1: u32 = 2;
    pub const SHA256: u32 = 8;
    pub const SHA384: u32 = 9;
    pub const SHA512: u32 = 10;
    pub const SHA224: u32 = 11;
}

//! Tee reader computing the SHA-256 content digest of everything read through it.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::cancel::Cancellable;
use openssl::sha::Sha256;
use std::io::{self, Read};

/// Feeds every byte handed to the consumer into a SHA-256 accumulator.
///
/// Errors returned by the wrapped reader are remembered, so that callers
/// can tell a failing download apart from a consumer rejecting the data.
pub(crate) struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    len: u64,
    cancellable: Cancellable,
    source_error: Option<io::Error>,
}

/// Result of hashing a complete stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentDigest {
    pub(crate) sha256: String,
    pub(crate) len: u64,
}

impl<R: Read> HashingReader<R> {
    pub(crate) fn new(inner: R, cancellable: Cancellable) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            len: 0,
            cancellable,
            source_error: None,
        }
    }

    /// The error the wrapped reader failed with, if any.
    pub(crate) fn take_source_error(&mut self) -> Option<io::Error> {
        self.source_error.take()
    }

    /// Read whatever the consumer left unread, then finalize the digest.
    pub(crate) fn finish(mut self) -> io::Result<ContentDigest> {
        io::copy(&mut self, &mut io::sink())?;
        Ok(ContentDigest {
            sha256: hex::encode(self.hasher.finish()),
            len: self.len,
        })
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cancellable.check_io()?;
        match self.inner.read(buf) {
            Ok(n) => {
                self.hasher.update(&buf[..n]);
                self.len += n as u64;
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.source_error = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
        }
    }
}

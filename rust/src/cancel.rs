//! Cancellation handle shared by every blocking network operation of a run.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::error::VerifyError;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Modeled on `GCancellable`: cheap to clone, all clones observe the
/// same state.  Optionally carries an absolute deadline after which it
/// reports itself as cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancellable {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle which expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Default::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the matching error if this handle has been cancelled.
    pub fn set_error_if_cancelled(&self) -> Result<(), VerifyError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(VerifyError::Cancelled)
        } else if self.deadline_passed() {
            Err(VerifyError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Like [`Self::set_error_if_cancelled`], for use inside [`io::Read`] implementations.
    /// Not `ErrorKind::Interrupted`, which `read_exact()` and `io::copy()` retry.
    pub(crate) fn check_io(&self) -> io::Result<()> {
        self.set_error_if_cancelled()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

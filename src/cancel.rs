//! External cancellation of a synchronization run.
//!
//! Entries that haven't started when the token trips are reported as
//! `failed(cancelled)`. Backends poll the token between transfer steps and
//! abort; the transaction then discards staging and leaves the destination
//! untouched.

use crate::error::FetchError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(FetchError::Cancelled)` once the token has tripped.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Trips `token` on the first Ctrl-C; a second one exits immediately.
pub fn install_signal_handler(token: &CancelToken) {
    let token = token.clone();
    let result = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!("\ncancel requested, finishing in-flight fetches...");
    });
    if let Err(e) = result {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }
}

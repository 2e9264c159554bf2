//! Cooperative shutdown.
//!
//! The signal handler only stores into the flag. The pipeline loop polls it between
//! frames, so the frame in flight always completes before resources are released.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "stop after this frame" request.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pipeline to stop. Repeated requests are harmless.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Route SIGINT into `flag`. No other signal is intercepted.
pub fn install_signal_handlers(flag: &ShutdownFlag) -> Result<()> {
    let flag = flag.clone();
    ctrlc::set_handler(move || {
        if !flag.is_requested() {
            log::info!("interrupt received, finishing current frame");
        }
        flag.request();
    })
    .context("install interrupt handler")
}

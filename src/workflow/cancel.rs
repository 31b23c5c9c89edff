use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;

/// Cooperative cancellation, checked by the engine between steps
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancel `flag` on the first SIGINT/SIGTERM and exit on the second
///
/// The running step finishes before the engine observes the flag.
pub fn setup_interrupt_handlers(flag: CancellationFlag) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            if flag.is_cancelled() {
                std::process::exit(128 + sig);
            }
            warn!("Received signal {}, stopping after the current step", sig);
            flag.cancel();
        }
    });

    Ok(())
}

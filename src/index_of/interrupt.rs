use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Exit code used when the user interrupts the program outside a batch.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared flag a running batch polls between chunks.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Routes Ctrl-C either to the running batch or to process exit.
pub(crate) struct InterruptHandler {
    cancel: CancelFlag,
    batch_active: Arc<AtomicBool>,
}

impl InterruptHandler {
    /// Starts the thread that waits for Ctrl-C.
    ///
    /// If the signal listener cannot be set up the default behavior (immediate exit) stays in place.
    pub(crate) fn install() -> Self {
        let handler = Self {
            cancel: CancelFlag::default(),
            batch_active: Arc::new(AtomicBool::new(false)),
        };

        let cancel = handler.cancel.clone();
        let batch_active = Arc::clone(&handler.batch_active);
        let spawned = thread::Builder::new()
            .name("interrupt-listener".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!("Unable to start interrupt listener: {}", e);
                        return;
                    }
                };

                runtime.block_on(async move {
                    loop {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            warn!("Unable to listen for Ctrl-C: {}", e);
                            return;
                        }

                        if batch_active.load(Ordering::SeqCst) {
                            warn!("Interrupt received, cancelling the remaining downloads...");
                            cancel.cancel();
                        } else {
                            info!("Interrupted, exiting...");
                            exit(INTERRUPTED_EXIT_CODE);
                        }
                    }
                });
            });

        if let Err(e) = spawned {
            warn!("Unable to spawn interrupt listener thread: {}", e);
        }

        handler
    }

    /// A handler with no signal listener behind it.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            cancel: CancelFlag::default(),
            batch_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag batches should poll.
    pub(crate) fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Marks a batch as running until the returned guard is dropped.
    ///
    /// Clears any cancellation left over from an earlier batch.
    pub(crate) fn begin_batch(&self) -> BatchGuard<'_> {
        self.cancel.reset();
        self.batch_active.store(true, Ordering::SeqCst);
        BatchGuard { handler: self }
    }
}

/// Keeps Ctrl-C routed to the batch while alive.
pub(crate) struct BatchGuard<'a> {
    handler: &'a InterruptHandler,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.handler.batch_active.store(false, Ordering::SeqCst);
    }
}

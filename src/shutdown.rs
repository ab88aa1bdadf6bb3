use tokio::sync::watch;
use tracing::{info, warn};

/// Cooperative cancellation shared by everything a shutdown should stop.
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Handle observed by pipeline runs at their stage boundaries
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn cancel(&self) {
        if !*self.sender.borrow() {
            info!("Cancellation requested");
        }
        self.sender.send_replace(true);
    }

    /// Cancel on Ctrl-C. The returned task ends after the first signal.
    pub fn install_signal_handler(&self) -> tokio::task::JoinHandle<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, cancelling in-flight verification");
                    sender.send_replace(true);
                }
                Err(e) => warn!("Failed to install Ctrl-C handler: {}", e),
            }
        })
    }
}

/// Read side of a [`ShutdownCoordinator`]. The default signal is never
/// cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancellationSignal {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }
}

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Signal that the host scheduler is quiescing toward shutdown.
///
/// While quiescing, the capacity strategy stops planning new workers; nodes
/// already bound to items finish their life cycle normally.
#[derive(Debug, Clone, Default)]
pub struct QuiesceSignal {
    token: CancellationToken,
}

impl QuiesceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_quiesce(&self) {
        self.token.cancel();
    }

    pub fn is_quiescing(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Install a handler that flips the quiesce signal on SIGTERM or SIGINT.
pub fn install_shutdown_handler() -> QuiesceSignal {
    let quiesce = QuiesceSignal::new();
    let token = quiesce.token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, quiescing provisioning");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, quiescing provisioning");
            }
        }

        token.cancel();
    });

    quiesce
}

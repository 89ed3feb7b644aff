use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One-shot cooperative stop flag shared by a run and whoever may interrupt it.
///
/// Once requested it stays requested; use a fresh `Shutdown` for the next run.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop admitting items. In-flight items are not interrupted.
    pub fn request(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    /// Turn SIGINT (and SIGTERM on unix) into [`Shutdown::request`] until the guard drops.
    pub(crate) fn listen_os_signals(&self) -> SignalGuard {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => this.request(),
                _ = this.requested() => {}
            }
        });
        SignalGuard { handle }
    }
}

/// Stops listening for OS signals when dropped.
pub(crate) struct SignalGuard {
    handle: JoinHandle<()>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM; only SIGINT stops the run");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

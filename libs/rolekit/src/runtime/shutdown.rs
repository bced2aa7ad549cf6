//! What stops the runner: OS signals, an external token or a future.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// OS signal that ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wait for Ctrl+C or (on unix) SIGTERM and report which one arrived.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| ShutdownSignal::Interrupt),
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| ShutdownSignal::Interrupt)
    }
}

impl ShutdownOptions {
    /// Token that is cancelled when this trigger fires.
    ///
    /// Signal and future triggers get a background waiter; must be called
    /// inside a Tokio runtime.
    pub(crate) fn arm(self) -> CancellationToken {
        match self {
            Self::Token(token) => {
                tracing::info!("shutdown: external token will control lifecycle");
                token
            }
            Self::Future(waiter) => {
                let cancel = CancellationToken::new();
                let trigger = cancel.clone();
                tokio::spawn(async move {
                    waiter.await;
                    tracing::info!("shutdown: external future completed");
                    trigger.cancel();
                });
                cancel
            }
            Self::Signals => {
                let cancel = CancellationToken::new();
                let trigger = cancel.clone();
                tokio::spawn(async move {
                    match wait_for_signal().await {
                        Ok(sig) => tracing::info!(signal = %sig, "Shutdown signal received, stopping services"),
                        Err(e) => {
                            tracing::warn!(error = %e, "shutdown: signal handlers unavailable; waiting for Ctrl+C only");
                            if let Err(e) = signal::ctrl_c().await {
                                tracing::error!(error = %e, "shutdown: Ctrl+C handler failed; only an external kill stops the process");
                                return;
                            }
                        }
                    }
                    trigger.cancel();
                });
                cancel
            }
        }
    }
}

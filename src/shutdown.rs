//! Shutdown signalling between the signal listener and the poll loop.

use tokio::sync::watch;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Receiving half of the shutdown flag, handed to long-running loops.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create the flag. Sending `true` on the returned sender stops every
    /// [`Shutdown::wait`].
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// If the sender is dropped without triggering, this never resolves.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for Ctrl-C or SIGTERM, then flip the shutdown flag.
///
/// Returns an error when the signal handlers cannot be installed.
pub async fn listen_for_signals(trigger: watch::Sender<bool>) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;

    #[cfg(unix)]
    let sigterm_fut = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_fut = std::future::pending::<Option<()>>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received SIGINT, shutting down");
        }
        _ = sigterm_fut => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    let _ = trigger.send(true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let (tx, mut shutdown) = Shutdown::channel();
        assert!(!shutdown.is_triggered());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_never_resolves() {
        let (tx, mut shutdown) = Shutdown::channel();
        drop(tx);

        let result = tokio::time::timeout(Duration::from_secs(3600), shutdown.wait()).await;
        assert!(result.is_err());
    }
}

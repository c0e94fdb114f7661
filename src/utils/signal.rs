//! Interrupt handling
//!
//! SIGINT, SIGTERM and SIGHUP all cancel one shared token. Once the
//! listener is installed, further signals no longer kill the process; they
//! only re-cancel the token, so teardown always gets to finish.

use tokio_util::sync::CancellationToken;

/// Spawn the signal listener and return the token it cancels
///
/// Must be called from within a tokio runtime.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        let (mut term, mut hup) = {
            use tokio::signal::unix::{signal, SignalKind};
            (
                signal(SignalKind::terminate()).ok(),
                signal(SignalKind::hangup()).ok(),
            )
        };

        loop {
            #[cfg(unix)]
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                        return;
                    }
                    tracing::info!("Ctrl-C received, shutting down...");
                }
                _ = async {
                    match term.as_mut() {
                        Some(t) => { t.recv().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    tracing::info!("SIGTERM received, shutting down...");
                }
                _ = async {
                    match hup.as_mut() {
                        Some(h) => { h.recv().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    tracing::info!("SIGHUP received, shutting down...");
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::info!("Ctrl-C received, shutting down...");
            }

            trigger.cancel();
        }
    });

    token
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::signal::unix::{signal, SignalKind};

    #[tokio::test]
    async fn test_repeated_interrupts_only_cancel() {
        // keeps SIGINT from killing the test binary even before the listener runs
        let _guard = signal(SignalKind::interrupt()).unwrap();
        let token = shutdown_token();
        tokio::time::sleep(Duration::from_millis(100)).await;

        unsafe { libc::raise(libc::SIGINT) };
        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .unwrap();

        unsafe { libc::raise(libc::SIGINT) };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(token.is_cancelled());

        // runtime still schedules work
        assert_eq!(tokio::spawn(async { 7 }).await.unwrap(), 7);
    }
}

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::LimitError;

/// Close flag shared by a limiter and everyone blocked on it.
#[derive(Debug, Default)]
pub(crate) struct Shutdown {
    closed: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    /// Returns `true` only for the call that actually closed.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        first
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the limiter is closed.
    pub(crate) async fn closed(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before reading the flag so a concurrent close cannot slip between.
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Waits for `wake`, unless the caller cancels or the limiter closes first.
    pub(crate) async fn wait<F>(
        &self,
        wake: F,
        cancel: &mut BoxFuture<'_, ()>,
    ) -> Result<(), LimitError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = self.closed() => Err(LimitError::Closed),
            _ = cancel => Err(LimitError::Cancelled),
            _ = wake => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future;

    use super::*;

    #[tokio::test]
    async fn close_wakes_waiters() {
        tokio::time::pause();
        let shutdown = std::sync::Arc::new(Shutdown::default());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut cancel: BoxFuture<'_, ()> = Box::pin(future::pending());
                shutdown
                    .wait(tokio::time::sleep(Duration::from_secs(3600)), &mut cancel)
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(shutdown.close());
        assert!(!shutdown.close(), "second close is a no-op");
        assert_eq!(waiter.await.unwrap(), Err(LimitError::Closed));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        tokio::time::pause();
        let shutdown = Shutdown::default();
        let mut cancel: BoxFuture<'_, ()> = Box::pin(tokio::time::sleep(Duration::from_secs(1)));

        let outcome = shutdown
            .wait(tokio::time::sleep(Duration::from_secs(60)), &mut cancel)
            .await;
        assert_eq!(outcome, Err(LimitError::Cancelled));
    }

    #[tokio::test]
    async fn wake_wins_when_nothing_interrupts() {
        let shutdown = Shutdown::default();
        let mut cancel: BoxFuture<'_, ()> = Box::pin(future::pending());

        assert_eq!(shutdown.wait(future::ready(()), &mut cancel).await, Ok(()));
    }
}

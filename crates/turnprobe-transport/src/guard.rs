//! Close signal and deadlines shared by the transport variants.
//!
//! Neither tokio sockets nor DTLS connections carry Go-style deadlines, and
//! closing them does not reliably wake a task parked in a read. `IoGuard`
//! wraps each I/O future so that a close, an elapsed deadline or a deadline
//! moved while the operation is pending all resolve it.

use crate::transport::{TransportError, TransportResult};
use std::future::Future;
use std::time::Instant;
use tokio::sync::watch;

/// Shared close flag plus read and write deadlines.
#[derive(Debug)]
pub struct IoGuard {
    closed: watch::Sender<bool>,
    read_deadline: watch::Sender<Option<Instant>>,
    write_deadline: watch::Sender<Option<Instant>>,
}

impl Default for IoGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IoGuard {
    /// Create an open guard with no deadlines
    #[must_use]
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        let (read_deadline, _) = watch::channel(None);
        let (write_deadline, _) = watch::channel(None);
        Self {
            closed,
            read_deadline,
            write_deadline,
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark the guard closed and wake every pending operation.
    ///
    /// Returns `true` only for the call that performed the transition, so the
    /// owner can release the underlying resource exactly once.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Set the read deadline, re-arming reads already in flight
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.read_deadline.send_replace(deadline);
    }

    /// Set the write deadline, re-arming writes already in flight
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.write_deadline.send_replace(deadline);
    }

    /// Run a read under the close signal and the read deadline
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] or [`TransportError::Timeout`] when
    /// those fire first, otherwise whatever `op` returns.
    pub async fn read<T, F>(&self, op: F) -> TransportResult<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        self.guarded(&self.read_deadline, op).await
    }

    /// Run a write under the close signal and the write deadline
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] or [`TransportError::Timeout`] when
    /// those fire first, otherwise whatever `op` returns.
    pub async fn write<T, F>(&self, op: F) -> TransportResult<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        self.guarded(&self.write_deadline, op).await
    }

    async fn guarded<T, F>(
        &self,
        deadline: &watch::Sender<Option<Instant>>,
        op: F,
    ) -> TransportResult<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        let mut closed_rx = self.closed.subscribe();
        let mut deadline_rx = deadline.subscribe();
        tokio::pin!(op);

        loop {
            if *closed_rx.borrow_and_update() {
                return Err(TransportError::Closed);
            }
            let current = *deadline_rx.borrow_and_update();
            if current.is_some_and(|at| at <= Instant::now()) {
                return Err(TransportError::Timeout);
            }

            let expiry = async move {
                match current {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                changed = closed_rx.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
                _ = deadline_rx.changed() => {}
                result = &mut op => {
                    // The underlying resource may fail on its own once closed
                    return match result {
                        Err(_) if self.is_closed() => Err(TransportError::Closed),
                        other => other,
                    };
                }
                () = expiry => return Err(TransportError::Timeout),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let guard = IoGuard::new();
        let value = guard.read(async { Ok::<_, TransportError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_close_is_single_transition() {
        let guard = IoGuard::new();
        assert!(!guard.is_closed());
        assert!(guard.close());
        assert!(!guard.close());
        assert!(guard.is_closed());
    }

    #[tokio::test]
    async fn test_guard_close_unblocks_pending_read() {
        let guard = Arc::new(IoGuard::new());

        let reader = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .read(std::future::pending::<TransportResult<()>>())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.close();

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("read did not unblock")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_guard_read_deadline_elapses() {
        let guard = IoGuard::new();
        guard.set_read_deadline(Some(Instant::now() + Duration::from_millis(30)));

        let result = timeout(
            Duration::from_secs(1),
            guard.read(std::future::pending::<TransportResult<()>>()),
        )
        .await
        .expect("deadline did not fire");
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_guard_past_deadline_fails_immediately() {
        let guard = IoGuard::new();
        guard.set_write_deadline(Some(Instant::now()));

        let result = guard.write(async { Ok::<_, TransportError>(()) }).await;
        assert!(matches!(result, Err(TransportError::Timeout)));

        // Reads have their own deadline
        assert!(guard.read(async { Ok::<_, TransportError>(()) }).await.is_ok());

        // Clearing the deadline restores writes
        guard.set_write_deadline(None);
        assert!(guard.write(async { Ok::<_, TransportError>(()) }).await.is_ok());
    }

    #[tokio::test]
    async fn test_guard_deadline_set_while_pending() {
        let guard = Arc::new(IoGuard::new());

        let reader = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .read(std::future::pending::<TransportResult<()>>())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.set_read_deadline(Some(Instant::now() + Duration::from_millis(20)));

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("re-armed deadline did not fire")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Timeout)));
    }
}

//! One-shot countdown used to wait for every subscriber of a dispatch.
//!
//! A fresh barrier is built for each dispatch and consumed by [`wait`], so
//! a barrier is never reused across events.
//!
//! [`wait`]: CompletionBarrier::wait

use std::sync::Arc;

use tokio::sync::Semaphore;

/// Counts outstanding [`CompletionToken`]s for one dispatch.
pub(crate) struct CompletionBarrier {
    expected: u32,
    signals: Arc<Semaphore>,
}

impl CompletionBarrier {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected: u32::try_from(expected).unwrap_or(u32::MAX),
            signals: Arc::new(Semaphore::new(0)),
        }
    }

    /// Mint the token for one subscriber. Call exactly `expected` times.
    pub(crate) fn token(&self) -> CompletionToken {
        CompletionToken {
            signals: Some(Arc::clone(&self.signals)),
        }
    }

    /// Resolve once every minted token has signalled.
    pub(crate) async fn wait(self) {
        if self.expected == 0 {
            return;
        }
        // The semaphore is never closed, so acquisition only fails if that
        // invariant is broken; there is nothing left to wait for then.
        let _ = self.signals.acquire_many(self.expected).await;
    }
}

/// Acknowledgement owed by one subscriber for one message.
///
/// Signals exactly once: on [`ack`](CompletionToken::ack), or when dropped
/// without an ack (a panicking consumer, a message discarded in a closed
/// queue).
#[must_use = "dropping the token acknowledges the message immediately"]
pub struct CompletionToken {
    signals: Option<Arc<Semaphore>>,
}

impl CompletionToken {
    /// Mark the message as processed.
    pub fn ack(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(signals) = self.signals.take() {
            signals.add_permits(1);
        }
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.signal();
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("pending", &self.signals.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn empty_barrier_resolves_immediately() {
        let barrier = CompletionBarrier::new(0);

        assert!(tokio::time::timeout(SHORT, barrier.wait()).await.is_ok());
    }

    #[tokio::test]
    async fn waits_until_every_token_signals() {
        let barrier = CompletionBarrier::new(2);
        let first = barrier.token();
        let second = barrier.token();
        let wait = barrier.wait();
        tokio::pin!(wait);

        first.ack();
        assert!(
            tokio::time::timeout(SHORT, &mut wait).await.is_err(),
            "one outstanding token must keep the barrier closed"
        );

        second.ack();
        assert!(tokio::time::timeout(SHORT, &mut wait).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_token_counts_as_acknowledged() {
        let barrier = CompletionBarrier::new(1);
        let token = barrier.token();

        std::thread::spawn(move || {
            let _token = token;
            panic!("consumer died");
        })
        .join()
        .unwrap_err();

        assert!(tokio::time::timeout(SHORT, barrier.wait()).await.is_ok());
    }
}

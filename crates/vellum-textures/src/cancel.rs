//! Cooperative cancellation tokens.
//!
//! Load functions poll [`CancellationToken::is_cancelled`] (or call
//! [`CancellationToken::check`]) between expensive steps. Nothing is ever
//! aborted forcibly. Code that is only waiting can race its wait against
//! [`CancellationToken::cancelled`] instead.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

use parking_lot::Mutex;

use crate::error::{TextureError, TextureResult};

/// One cancellation flag and the signal that wakes its waiters.
struct CancelSource {
    cancelled: AtomicBool,
    /// Dropped on cancel, which disconnects `wait` for every waiter.
    signal: Mutex<Option<flume::Sender<()>>>,
    wait: flume::Receiver<()>,
}

impl CancelSource {
    fn new() -> Arc<Self> {
        let (signal, wait) = flume::bounded(0);
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            signal: Mutex::new(Some(signal)),
            wait,
        })
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.signal.lock().take();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancellation token for cooperative load cancellation.
///
/// Clones share the same state. A token created with [`CancellationToken::linked`]
/// observes its parents too, so it reports cancellation when either its own
/// flag or any parent flag is set.
///
/// # Example
///
/// ```
/// use vellum_textures::CancellationToken;
///
/// let shutdown = CancellationToken::new();
/// let caller = CancellationToken::new();
/// let linked = CancellationToken::linked(&[&shutdown, &caller]);
///
/// assert!(!linked.is_cancelled());
/// caller.cancel();
/// assert!(linked.is_cancelled());
/// assert!(!shutdown.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    /// Own flag first, followed by flags inherited from parents.
    flags: Arc<[Arc<CancelSource>]>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            flags: Arc::from([CancelSource::new()]),
        }
    }

    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Self {
            flags: Arc::from(Vec::new()),
        }
    }

    /// Create a token that is cancelled when it or any of `parents` is.
    ///
    /// Cancelling the linked token does not cancel its parents.
    pub fn linked(parents: &[&CancellationToken]) -> Self {
        let mut flags = Vec::with_capacity(1 + parents.iter().map(|p| p.flags.len()).sum::<usize>());
        flags.push(CancelSource::new());
        for parent in parents {
            flags.extend(parent.flags.iter().cloned());
        }
        Self {
            flags: Arc::from(flags),
        }
    }

    /// Cancel this token.
    ///
    /// Idempotent. Has no effect on a token created with [`CancellationToken::none`].
    pub fn cancel(&self) {
        if let Some(own) = self.flags.first() {
            own.cancel();
        }
    }

    /// Check if this token or any parent has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| flag.is_cancelled())
    }

    /// Resolve once this token or any parent is cancelled.
    ///
    /// Never resolves for a token created with [`CancellationToken::none`].
    pub async fn cancelled(&self) {
        let mut waits: Vec<_> = self
            .flags
            .iter()
            .map(|flag| Box::pin(flag.wait.recv_async()))
            .collect();

        futures_lite::future::poll_fn(|cx| {
            if self.is_cancelled() {
                return Poll::Ready(());
            }
            // Nothing is ever sent, so a wait only completes on disconnect.
            for wait in waits.iter_mut() {
                if wait.as_mut().poll(cx).is_ready() {
                    return Poll::Ready(());
                }
            }
            Poll::Pending
        })
        .await
    }

    /// Whether cancelling is possible at all.
    pub fn can_be_cancelled(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Return [`TextureError::Cancelled`] if the token has fired.
    pub fn check(&self) -> TextureResult<()> {
        if self.is_cancelled() {
            Err(TextureError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("sources", &self.flags.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.can_be_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(TextureError::Cancelled));
    }

    #[test]
    fn test_none_token_never_cancels() {
        let token = CancellationToken::none();
        token.cancel();
        assert!(!token.is_cancelled());
        assert!(!token.can_be_cancelled());
    }

    #[test]
    fn test_linked_observes_each_parent() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let linked = CancellationToken::linked(&[&a, &b]);
        assert!(!linked.is_cancelled());

        b.cancel();
        assert!(linked.is_cancelled());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_linked_cancel_does_not_propagate_up() {
        let parent = CancellationToken::new();
        let linked = CancellationToken::linked(&[&parent]);
        linked.cancel();
        assert!(linked.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_linked_to_none_parent() {
        let shutdown = CancellationToken::new();
        let linked = CancellationToken::linked(&[&shutdown, &CancellationToken::none()]);
        assert!(!linked.is_cancelled());
        shutdown.cancel();
        assert!(linked.is_cancelled());
    }

    #[test]
    fn test_cancelled_resolves_for_parent_cancel() {
        let parent = CancellationToken::new();
        let linked = CancellationToken::linked(&[&parent]);

        let waiter = std::thread::spawn({
            let linked = linked.clone();
            move || pollster::block_on(linked.cancelled())
        });
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!waiter.is_finished());

        parent.cancel();
        waiter.join().unwrap();
    }

    #[test]
    fn test_cancelled_ready_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        pollster::block_on(token.cancelled());
    }

    #[test]
    fn test_none_token_cancelled_stays_pending() {
        let token = CancellationToken::none();
        let raced = pollster::block_on(futures_lite::future::or(
            async {
                token.cancelled().await;
                false
            },
            async { true },
        ));
        assert!(raced);
    }

    #[test]
    fn test_nested_links() {
        let root = CancellationToken::new();
        let mid = CancellationToken::linked(&[&root]);
        let leaf = CancellationToken::linked(&[&mid]);
        root.cancel();
        assert!(leaf.is_cancelled());
    }
}

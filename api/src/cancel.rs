//! Request cancellation.
//!
//! A [`CancellationSource`] pairs a cloneable [`CancelToken`] with a
//! `cancel(reason)` trigger. The token is handed to a call through
//! [`RequestOptions::cancel_token`](crate::RequestOptions::cancel_token); once
//! the source is canceled the in-flight transport future resolves to
//! [`ClientError::Canceled`](crate::ClientError::Canceled) carrying the reason.

use std::sync::Arc;

use tokio::sync::watch;

/// Token observed by the transport while a request is in flight.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<Option<String>>,
}

impl CancelToken {
    /// Returns `true` once the owning source has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The cancellation reason, if the source has been canceled.
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves with the reason once the source is canceled.
    ///
    /// If the source is dropped without canceling, this never resolves.
    pub async fn canceled(&self) -> String {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|reason| reason.clone());
        match outcome {
            Ok(reason) => reason.unwrap_or_default(),
            Err(_) => std::future::pending().await,
        }
    }
}

/// Producer half of a cancellation pair.
///
/// ## Examples
///
/// ```rust
/// use api_module::CancellationSource;
///
/// let source = CancellationSource::new();
/// let token = source.token();
/// source.cancel("Canceled by the user");
/// assert_eq!(token.reason().as_deref(), Some("Canceled by the user"));
/// ```
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: Arc<watch::Sender<Option<String>>>,
    token: CancelToken,
}

impl CancellationSource {
    /// Creates a fresh, uncanceled source.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            token: CancelToken { rx },
        }
    }

    /// Returns a token bound to this source.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Cancels every call carrying this source's token.
    ///
    /// Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

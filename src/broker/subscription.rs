use std::panic::AssertUnwindSafe;
use std::sync::Weak;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Removal side of the broker registry, as seen from a subscription handle.
///
/// The handle needs the broker only to remove itself, so it keeps a weak
/// reference to this trait instead of owning the broker state: an outstanding
/// handle never extends the broker's lifetime.
pub(crate) trait Deregister: Send + Sync {
    fn deregister(&self, topic: &str, id: u64);
}

/// Handle to one handler's registration on one topic.
///
/// Returned by [`Broker::subscribe`](crate::Broker::subscribe). The
/// registration stays active until [`Subscription::unsubscribe`] is called or
/// the broker itself is dropped; dropping the handle alone does not cancel it.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    id: u64,
    owner: Weak<dyn Deregister>,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        topic: String,
        id: u64,
        owner: Weak<dyn Deregister>,
        token: CancellationToken,
    ) -> Self {
        Self {
            topic,
            id,
            owner,
            token,
        }
    }

    /// The topic this subscription is registered on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identifier of this subscription, unique within its broker.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the registration.
    ///
    /// Removes the subscription from the broker registry, then signals its
    /// delivery worker to stop. After this returns, no later publish will
    /// look the subscription up, and in-flight publishes that still hold it in
    /// a snapshot resolve as skipped instead of blocking. Consuming the handle
    /// makes a second cancellation unrepresentable.
    pub fn unsubscribe(self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.deregister(&self.topic, self.id);
        }
        self.token.cancel();
        tracing::debug!(topic = %self.topic, id = self.id, "unsubscribed");
    }
}

/// Delivery loop bound to one subscription.
///
/// Waits for either the termination signal or the next message, invoking the
/// handler synchronously per message. A panicking handler is logged and the
/// message dropped; the subscription itself stays alive.
pub(crate) async fn delivery_worker<M, F>(
    mut mailbox: mpsc::Receiver<M>,
    token: CancellationToken,
    mut handler: F,
) where
    M: Send + 'static,
    F: FnMut(M) + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            msg = mailbox.recv() => match msg {
                Some(msg) => {
                    let call = AssertUnwindSafe(|| handler(msg));
                    if let Err(panic) = std::panic::catch_unwind(call) {
                        let reason = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_string());
                        tracing::error!(%reason, "message handler panicked");
                    }
                }
                None => break,
            },
        }
    }
    tracing::debug!("delivery worker stopped");
}

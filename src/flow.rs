//! Push-based streaming protocol.
//!
//! Bodies travel between the client, the request publishers and the response
//! subscribers through a publisher/subscriber handshake: a publisher hands the
//! subscriber a [`Subscription`], the subscriber signals demand on it, and the
//! publisher pushes items until demand is exhausted, then signals completion or
//! an error.
//!
//! Subscriptions are shared handles rather than callbacks into the subscriber,
//! so a subscriber may request more data from inside `on_next` without the
//! publisher re-entering it. Publishers drive the emission loop themselves.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Demand channel from a subscriber back to its publisher.
pub trait Subscription: Send + Sync {
    /// Ask for up to `n` more items. Demand accumulates and saturates at `u64::MAX`.
    fn request(&self, n: u64);

    /// Stop receiving items.
    fn cancel(&self);
}

/// Receiver of a stream of `T` items.
pub trait Subscriber<T>: Send {
    /// Called once, before any other signal.
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>);

    /// Called once per item, never more often than requested.
    fn on_next(&mut self, item: T);

    /// Terminal failure signal.
    fn on_error(&mut self, error: io::Error);

    /// Terminal success signal.
    fn on_complete(&mut self);
}

/// Source of a stream of `T` items.
pub trait Publisher<T>: Send + Sync {
    /// Start a new, independent stream towards `subscriber`.
    ///
    /// Publishers may deliver synchronously from within this call or later from
    /// another thread.
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>);
}

#[derive(Debug, Default)]
struct DemandState {
    requested: AtomicU64,
    cancelled: AtomicBool,
}

/// Subscription that counts outstanding demand for a publisher to consume.
#[derive(Debug, Clone, Default)]
pub struct DemandSubscription {
    state: Arc<DemandState>,
}

impl DemandSubscription {
    /// Create a subscription with no outstanding demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one unit of demand, if any is outstanding and the subscription is live.
    pub fn try_take(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.state
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Outstanding demand.
    pub fn outstanding(&self) -> u64 {
        self.state.requested.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl Subscription for DemandSubscription {
    fn request(&self, n: u64) {
        let _ = self
            .state
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            });
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct OneShotState {
    requested: AtomicBool,
    released: AtomicBool,
}

/// Subscription for a payload that is fully materialized before subscription.
///
/// Any demand, whatever its size and whenever it arrives, releases the whole
/// payload at once. Cancelling is a no-op: there is nothing in flight to
/// interrupt.
#[derive(Debug, Clone, Default)]
pub struct OneShotSubscription {
    state: Arc<OneShotState>,
}

impl OneShotSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the subscriber has asked for data at least once.
    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// True exactly once, the first time this is called after demand arrived.
    /// The caller then owns emitting the payload.
    pub fn take_release(&self) -> bool {
        self.is_requested()
            && self
                .state
                .released
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

impl Subscription for OneShotSubscription {
    fn request(&self, _n: u64) {
        self.state.requested.store(true, Ordering::Release);
    }

    fn cancel(&self) {}
}

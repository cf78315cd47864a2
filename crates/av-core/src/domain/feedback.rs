//! Observable device and room state values ("feedbacks").
//!
//! A feedback is a single value that changes over time: whether a display is
//! powered on, whether it is warming up, the name of the room's current
//! source.  Other components watch feedbacks instead of polling the device.
//!
//! # Delivery model (for beginners)
//!
//! Each feedback is backed by a `tokio::sync::watch` channel.  A watch channel
//! keeps only the most recent value, so a slow subscriber never sees a queue
//! of stale updates: it simply reads the latest value when it wakes up.  This
//! gives the two delivery properties the rest of the system relies on:
//!
//! - **last-value-wins**: intermediate values may be skipped;
//! - **at-least-once**: [`Feedback::fire_update`] re-notifies subscribers
//!   even when the value did not change, so an aggregate can always be
//!   re-published.

use tokio::sync::watch;

/// An observable value with last-value-wins change notification.
#[derive(Debug)]
pub struct Feedback<T> {
    tx: watch::Sender<T>,
}

/// Boolean feedback, e.g. "power is on".
pub type BoolFeedback = Feedback<bool>;
/// Analog feedback, e.g. a volume level or an input number.
pub type IntFeedback = Feedback<u16>;
/// Serial feedback, e.g. the current source name.
pub type StringFeedback = Feedback<String>;

impl<T> Feedback<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a feedback holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Returns a clone of the current value.
    pub fn value(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Stores `value` and notifies subscribers if it differs from the current value.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Notifies every subscriber with the current value, changed or not.
    pub fn fire_update(&self) {
        self.tx.send_modify(|_| {});
    }

    /// Returns a receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T> Default for Feedback<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

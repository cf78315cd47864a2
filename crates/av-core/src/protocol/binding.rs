//! Binding helpers shared by every bridgeable device.
//!
//! # Deferred binding (for beginners)
//!
//! Some devices cannot build their join map until a driver has loaded, for
//! example an IR port whose command list comes from a file read in the
//! background.  A bridge may call `link_to_api` before that happens.
//! [`DeferredBinding`] is a small state machine that remembers the request and
//! hands it back exactly once, when the driver-loaded event arrives:
//!
//! ```text
//!            request (driver not loaded)
//!   Unbound ─────────────────────────────▶ Pending(request)
//!      │                                        │ driver loaded
//!      │ request (driver loaded)                ▼
//!      └──────────────────────────────────▶  Bound
//! ```
//!
//! The driver-loaded flag lives inside the same lock as the state, so a
//! request racing with the driver-loaded event is never lost.
//!
//! # Join binder
//!
//! [`JoinBinder`] wires named signals to a link using a join map.  Names that
//! are missing from the map are skipped silently, which is what allows a
//! partial override map to bridge only part of a device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::feedback::Feedback;
use crate::protocol::bridge::LinkRequest;
use crate::protocol::join_map::JoinMap;
use crate::protocol::link::ControlLink;

enum BindingState {
    Unbound,
    Pending(LinkRequest),
    Bound,
}

struct BindingInner {
    driver_loaded: bool,
    state: BindingState,
}

/// Per-device deferred-binding state machine.
pub struct DeferredBinding {
    inner: Mutex<BindingInner>,
}

impl Default for DeferredBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredBinding {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BindingInner {
                driver_loaded: false,
                state: BindingState::Unbound,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BindingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers a link request.
    ///
    /// Returns the request back when the driver is loaded and binding should
    /// proceed now; returns `None` when the request was stored for later.  A
    /// newer pending request replaces an older one.
    pub fn request(&self, request: LinkRequest) -> Option<LinkRequest> {
        let mut inner = self.lock();
        if inner.driver_loaded {
            inner.state = BindingState::Bound;
            return Some(request);
        }
        if matches!(inner.state, BindingState::Pending(_)) {
            warn!("replacing pending link request for '{}'", request.link.key());
        }
        inner.state = BindingState::Pending(request);
        None
    }

    /// Records a driver-loaded event.
    ///
    /// Returns the pending request, if any, exactly once.  Repeated events
    /// return `None`.
    pub fn driver_loaded(&self) -> Option<LinkRequest> {
        let mut inner = self.lock();
        inner.driver_loaded = true;
        match std::mem::replace(&mut inner.state, BindingState::Bound) {
            BindingState::Pending(request) => Some(request),
            BindingState::Unbound => {
                inner.state = BindingState::Unbound;
                None
            }
            BindingState::Bound => None,
        }
    }

    pub fn is_driver_loaded(&self) -> bool {
        self.lock().driver_loaded
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.lock().state, BindingState::Pending(_))
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.lock().state, BindingState::Bound)
    }
}

/// Binds named actions and feedback to a link through a join map.
pub struct JoinBinder<'a> {
    device_key: &'a str,
    link: Arc<dyn ControlLink>,
    map: &'a JoinMap,
    runtime: Option<Handle>,
    tasks: Vec<JoinHandle<()>>,
}

impl<'a> JoinBinder<'a> {
    pub fn new(device_key: &'a str, link: Arc<dyn ControlLink>, map: &'a JoinMap) -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            debug!("[{device_key}] no async runtime; feedback will not be pushed after binding");
        }
        Self {
            device_key,
            link,
            map,
            runtime,
            tasks: Vec::new(),
        }
    }

    fn join(&self, name: &str) -> Option<u32> {
        let join = self.map.join_number(name);
        if join.is_none() {
            debug!("[{}] '{name}' not in join map; not bridged", self.device_key);
        }
        join
    }

    /// Routes inbound digital writes at `name` to `action`.
    pub fn on_bool<F>(&mut self, name: &str, action: F) -> bool
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let Some(join) = self.join(name) else {
            return false;
        };
        self.link.set_bool_action(join, Arc::new(action));
        true
    }

    pub fn on_ushort<F>(&mut self, name: &str, action: F) -> bool
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        let Some(join) = self.join(name) else {
            return false;
        };
        self.link.set_ushort_action(join, Arc::new(action));
        true
    }

    pub fn on_string<F>(&mut self, name: &str, action: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let Some(join) = self.join(name) else {
            return false;
        };
        self.link.set_string_action(join, Arc::new(action));
        true
    }

    /// Publishes `feedback` at `name` now and on every later change.
    pub fn publish_bool(&mut self, name: &str, feedback: &Feedback<bool>) -> bool {
        self.publish(name, feedback, |link, join, v: &bool| link.set_bool(join, *v))
    }

    pub fn publish_ushort(&mut self, name: &str, feedback: &Feedback<u16>) -> bool {
        self.publish(name, feedback, |link, join, v: &u16| link.set_ushort(join, *v))
    }

    pub fn publish_string(&mut self, name: &str, feedback: &Feedback<String>) -> bool {
        self.publish(name, feedback, |link, join, v: &String| link.set_string(join, v))
    }

    fn publish<T, F>(&mut self, name: &str, feedback: &Feedback<T>, write: F) -> bool
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&dyn ControlLink, u32, &T) + Send + Sync + 'static,
    {
        let Some(join) = self.join(name) else {
            return false;
        };
        let mut rx: watch::Receiver<T> = feedback.subscribe();
        let initial = rx.borrow_and_update().clone();
        write(self.link.as_ref(), join, &initial);

        if let Some(runtime) = &self.runtime {
            let link = Arc::clone(&self.link);
            self.tasks.push(runtime.spawn(async move {
                while rx.changed().await.is_ok() {
                    let value = rx.borrow_and_update().clone();
                    write(link.as_ref(), join, &value);
                }
            }));
        }
        true
    }

    /// Finishes binding and returns the feedback pump tasks.
    pub fn finish(self) -> Vec<JoinHandle<()>> {
        self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::join_map::{JoinCapabilities, JoinData, JoinKind};
    use crate::protocol::link::MemoryLink;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(link: &Arc<MemoryLink>) -> LinkRequest {
        LinkRequest::new(link.clone() as Arc<dyn ControlLink>, 0)
    }

    // ── Deferred binding ──────────────────────────────────────────────────────

    #[test]
    fn test_request_before_driver_is_deferred() {
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let binding = DeferredBinding::new();

        assert!(binding.request(request(&link)).is_none());
        assert!(binding.is_pending());
    }

    #[test]
    fn test_driver_loaded_releases_pending_request_once() {
        // Arrange
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let binding = DeferredBinding::new();
        binding.request(request(&link));

        // Act
        let first = binding.driver_loaded();
        let second = binding.driver_loaded();

        // Assert
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(binding.is_bound());
    }

    #[test]
    fn test_driver_loaded_without_request_stays_unbound() {
        let binding = DeferredBinding::new();
        assert!(binding.driver_loaded().is_none());
        assert!(!binding.is_bound());
        assert!(binding.is_driver_loaded());
    }

    #[test]
    fn test_request_after_driver_proceeds_immediately() {
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let binding = DeferredBinding::new();
        binding.driver_loaded();

        assert!(binding.request(request(&link)).is_some());
        assert!(binding.is_bound());
    }

    #[test]
    fn test_newer_pending_request_replaces_older() {
        let binding = DeferredBinding::new();
        let a = Arc::new(MemoryLink::new("a"));
        let b = Arc::new(MemoryLink::new("b"));
        binding.request(request(&a));
        binding.request(request(&b));

        let released = binding.driver_loaded().unwrap();

        assert_eq!(released.link.key(), "b");
    }

    // ── Join binder ───────────────────────────────────────────────────────────

    fn map() -> JoinMap {
        JoinMap::from_joins([
            ("press", JoinData::new(3, JoinKind::Digital, JoinCapabilities::FromRemote)),
            ("level", JoinData::new(4, JoinKind::Analog, JoinCapabilities::ToRemote)),
        ])
    }

    #[test]
    fn test_binder_skips_names_missing_from_map() {
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let map = map();
        let mut binder = JoinBinder::new("dev", link.clone(), &map);

        assert!(!binder.on_bool("absent", |_| {}));
        assert!(binder.on_bool("press", |_| {}));
        assert_eq!(link.bool_action_joins(), vec![3]);
    }

    #[test]
    fn test_binder_routes_press_to_action() {
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let map = map();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let mut binder = JoinBinder::new("dev", link.clone(), &map);
        binder.on_bool("press", move |v| {
            if v {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        link.press_bool(3, true);
        link.press_bool(3, false);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_published_feedback_follows_changes() {
        // Arrange
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let map = map();
        let level = Feedback::new(10u16);
        let mut binder = JoinBinder::new("dev", link.clone(), &map);

        // Act
        binder.publish_ushort("level", &level);
        let tasks = binder.finish();
        assert_eq!(link.ushort_output(4), Some(10));
        level.set(55);
        for _ in 0..50 {
            if link.ushort_output(4) == Some(55) {
                break;
            }
            tokio::task::yield_now().await;
        }

        // Assert
        assert_eq!(link.ushort_output(4), Some(55));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_publish_without_runtime_sets_initial_value() {
        let link = Arc::new(MemoryLink::new("bridge-1"));
        let map = map();
        let level = Feedback::new(7u16);
        let mut binder = JoinBinder::new("dev", link.clone(), &map);

        binder.publish_ushort("level", &level);

        assert_eq!(link.ushort_output(4), Some(7));
        assert!(binder.finish().is_empty());
    }
}

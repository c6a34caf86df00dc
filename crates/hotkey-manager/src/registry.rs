use crate::dispatch::Dispatcher;
use crate::error::RegistrationError;
use crate::key::Key;
use crate::platform::HotkeyBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

/// Type alias for hotkey callbacks that receive the hotkey's ID
pub type HotkeyCallback = Arc<dyn Fn(HotkeyId) + Send + Sync>;

/// Registry-allocated hotkey identifier, unique for the registry's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotkeyId(u32);

impl HotkeyId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HotkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Edge reported for a hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyState {
    Pressed,
    Released,
}

/// An accepted press or release edge, as seen by subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub id: HotkeyId,
    pub state: HotkeyState,
}

struct Registration {
    key: Key,
    on_down: Option<HotkeyCallback>,
    on_up: Option<HotkeyCallback>,
    pressed: bool,
}

/// State shared between the registry owner, the notification thread and the
/// release detector. Every read-modify-write of `pressed` happens under
/// `entries`; callbacks run only after the lock is dropped.
struct Shared {
    entries: Mutex<HashMap<HotkeyId, Registration>>,
    listeners: Mutex<Vec<UnboundedSender<HotkeyEvent>>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Shared {
    fn emit(&self, event: HotkeyEvent) {
        self.listeners.lock().retain(|tx| tx.send(event).is_ok());
    }

    fn fire(&self, id: HotkeyId, callback: Option<HotkeyCallback>) {
        if let Some(callback) = callback {
            self.dispatcher.dispatch(Box::new(move || callback(id)));
        }
    }

    /// A registration removed while held still gets its release edge.
    fn release_removed(&self, id: HotkeyId, entry: Registration) {
        if entry.pressed {
            debug!(%id, key = %entry.key, "hotkey released by unregister");
            self.emit(HotkeyEvent {
                id,
                state: HotkeyState::Released,
            });
            self.fire(id, entry.on_up);
        }
    }
}

/// Cloneable handle through which other threads report key edges
#[derive(Clone)]
pub struct RegistryHandle {
    shared: Arc<Shared>,
}

impl RegistryHandle {
    /// Report an OS notification for `id`.
    ///
    /// Only a not-pressed to pressed transition fires `on_down`; repeated
    /// press notifications while held are swallowed. A release notification
    /// is handled exactly like a poll-detected release. Returns whether the
    /// notification changed state.
    pub fn notify(&self, id: HotkeyId, state: HotkeyState) -> bool {
        let callback = {
            let mut entries = self.shared.entries.lock();
            let Some(entry) = entries.get_mut(&id) else {
                debug!(%id, ?state, "notification for unregistered hotkey");
                return false;
            };
            let pressed = state == HotkeyState::Pressed;
            if entry.pressed == pressed {
                trace!(%id, ?state, "duplicate notification suppressed");
                return false;
            }
            entry.pressed = pressed;
            debug!(%id, key = %entry.key, ?state, "hotkey edge");
            if pressed {
                entry.on_down.clone()
            } else {
                entry.on_up.clone()
            }
        };

        self.shared.emit(HotkeyEvent { id, state });
        self.shared.fire(id, callback);
        true
    }

    /// Release every pressed registration for which `held` reports false.
    /// Returns the number of registrations released.
    pub(crate) fn release_unheld(&self, held: impl Fn(&Key) -> bool) -> usize {
        let mut released = Vec::new();
        {
            let mut entries = self.shared.entries.lock();
            for (id, entry) in entries.iter_mut() {
                if entry.pressed && !held(&entry.key) {
                    entry.pressed = false;
                    debug!(%id, key = %entry.key, "hotkey released (polled)");
                    released.push((*id, entry.on_up.clone()));
                }
            }
        }
        released.sort_by_key(|(id, _)| *id);

        let count = released.len();
        for (id, on_up) in released {
            self.shared.emit(HotkeyEvent {
                id,
                state: HotkeyState::Released,
            });
            self.shared.fire(id, on_up);
        }
        count
    }
}

/// Single owner of every hotkey registered with the operating system.
pub struct HotkeyRegistry {
    backend: Option<Box<dyn HotkeyBackend>>,
    shared: Arc<Shared>,
    next_id: u32,
}

impl HotkeyRegistry {
    /// Creates a registry bound to `backend`. Callbacks are handed to
    /// `dispatcher` rather than run on the thread that observed the edge.
    pub fn new(backend: Box<dyn HotkeyBackend>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        info!("hotkey registry created");
        Self {
            backend: Some(backend),
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                dispatcher,
            }),
            next_id: 1,
        }
    }

    /// Registers `key` with the operating system.
    ///
    /// A fresh ID is allocated for every attempt. If the backend refuses the
    /// combination nothing is recorded and the error is returned.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Conflict`] or [`RegistrationError::Invalid`] from
    /// the backend, or [`RegistrationError::NotInitialized`] after
    /// [`shutdown`](Self::shutdown).
    pub fn register(
        &mut self,
        key: Key,
        on_down: Option<HotkeyCallback>,
        on_up: Option<HotkeyCallback>,
    ) -> Result<HotkeyId, RegistrationError> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(RegistrationError::NotInitialized);
        };

        let id = HotkeyId(self.next_id);
        self.next_id += 1;

        if key.modifiers.is_empty() {
            warn!(%key, "hotkey has no modifiers; some platforms reject bare-key global hotkeys");
        }

        if let Err(e) = backend.register(id, &key) {
            debug!(%id, %key, error = %e, "backend refused hotkey");
            return Err(e);
        }

        self.shared.entries.lock().insert(
            id,
            Registration {
                key,
                on_down,
                on_up,
                pressed: false,
            },
        );
        debug!(%id, %key, "registered hotkey");
        Ok(id)
    }

    /// Unregisters a hotkey. Unknown IDs are tolerated with a warning.
    /// A hotkey that is held at the time is released first: subscribers see
    /// the `Released` edge and `on_up` is dispatched. Returns whether a
    /// registration was removed.
    pub fn unregister(&mut self, id: HotkeyId) -> bool {
        let removed = self.shared.entries.lock().remove(&id);
        let Some(entry) = removed else {
            warn!(%id, "unregister of unknown hotkey");
            return false;
        };
        self.release_from_backend(id, &entry.key);
        debug!(%id, key = %entry.key, "unregistered hotkey");
        self.shared.release_removed(id, entry);
        true
    }

    /// Unregisters every tracked hotkey, returning how many were removed.
    pub fn unregister_all(&mut self) -> usize {
        let mut drained: Vec<(HotkeyId, Registration)> =
            self.shared.entries.lock().drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        let count = drained.len();
        for (id, entry) in drained {
            self.release_from_backend(id, &entry.key);
            self.shared.release_removed(id, entry);
        }
        if count > 0 {
            debug!(count, "unregistered all hotkeys");
        }
        count
    }

    /// Unregisters everything and detaches from the backend. Later
    /// registrations fail with [`RegistrationError::NotInitialized`].
    pub fn shutdown(&mut self) {
        self.unregister_all();
        if self.backend.take().is_some() {
            info!("hotkey registry shut down");
        }
    }

    fn release_from_backend(&mut self, id: HotkeyId, key: &Key) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.unregister(id, key) {
                // The entry is already gone from our table; keep going.
                warn!(%id, %key, error = %e, "backend failed to unregister hotkey");
            }
        }
    }

    /// A handle for threads that report key edges
    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            shared: self.shared.clone(),
        }
    }

    /// Receive every accepted press and release edge from now on
    pub fn subscribe(&self) -> UnboundedReceiver<HotkeyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.listeners.lock().push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: HotkeyId) -> bool {
        self.shared.entries.lock().contains_key(&id)
    }

    pub fn key(&self, id: HotkeyId) -> Option<Key> {
        self.shared.entries.lock().get(&id).map(|e| e.key)
    }

    pub fn is_pressed(&self, id: HotkeyId) -> bool {
        self.shared
            .entries
            .lock()
            .get(&id)
            .is_some_and(|e| e.pressed)
    }

    /// All registrations as (ID, key), in ID order
    pub fn registrations(&self) -> Vec<(HotkeyId, Key)> {
        let mut list: Vec<(HotkeyId, Key)> = self
            .shared
            .entries
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.key))
            .collect();
        list.sort_by_key(|(id, _)| *id);
        list
    }
}

impl Drop for HotkeyRegistry {
    fn drop(&mut self) {
        // Clean up all hotkeys when the registry is dropped
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Immediate, Job};
    use crate::testing::FakeBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, HotkeyCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn registry() -> (HotkeyRegistry, FakeBackend) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let backend = FakeBackend::new();
        let registry = HotkeyRegistry::new(Box::new(backend.clone()), Arc::new(Immediate));
        (registry, backend)
    }

    fn key(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn test_register_allocates_increasing_ids() {
        let (mut registry, backend) = registry();
        let a = registry.register(key("ctrl+f1"), None, None).unwrap();
        let b = registry.register(key("ctrl+f2"), None, None).unwrap();
        assert!(b > a);
        assert_eq!(registry.len(), 2);
        assert_eq!(backend.bound_count(), 2);
        assert_eq!(registry.key(a), Some(key("ctrl+f1")));
        assert_eq!(
            registry.registrations(),
            vec![(a, key("ctrl+f1")), (b, key("ctrl+f2"))]
        );
    }

    #[test]
    fn test_conflict_records_nothing() {
        let (mut registry, backend) = registry();
        registry.register(key("alt+p"), None, None).unwrap();
        let err = registry.register(key("alt+p"), None, None).unwrap_err();
        assert!(matches!(err, RegistrationError::Conflict(_)));

        backend.claim_elsewhere(key("alt+q"));
        let err = registry.register(key("alt+q"), None, None).unwrap_err();
        assert!(matches!(err, RegistrationError::Conflict(_)));

        backend.reject(key("win+l"));
        let err = registry.register(key("win+l"), None, None).unwrap_err();
        assert!(matches!(err, RegistrationError::Invalid(_)));

        assert_eq!(registry.len(), 1);
        assert_eq!(backend.bound_count(), 1);
    }

    #[test]
    fn test_ids_are_not_reused_after_failure() {
        let (mut registry, backend) = registry();
        let first = registry.register(key("ctrl+1"), None, None).unwrap();
        backend.reject(key("ctrl+2"));
        assert!(registry.register(key("ctrl+2"), None, None).is_err());
        let third = registry.register(key("ctrl+3"), None, None).unwrap();
        assert_eq!(third.get(), first.get() + 2);
    }

    #[test]
    fn test_bare_key_is_accepted() {
        let (mut registry, _) = registry();
        assert!(registry.register(key("f8"), None, None).is_ok());
    }

    #[test]
    fn test_repeated_press_fires_once() {
        let (mut registry, _) = registry();
        let (downs, on_down) = counter();
        let id = registry.register(key("ctrl+t"), Some(on_down), None).unwrap();
        let handle = registry.handle();

        assert!(handle.notify(id, HotkeyState::Pressed));
        for _ in 0..10 {
            assert!(!handle.notify(id, HotkeyState::Pressed));
        }
        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert!(registry.is_pressed(id));
    }

    #[test]
    fn test_native_release_rearms_press() {
        let (mut registry, _) = registry();
        let (downs, on_down) = counter();
        let (ups, on_up) = counter();
        let id = registry
            .register(key("ctrl+t"), Some(on_down), Some(on_up))
            .unwrap();
        let handle = registry.handle();

        handle.notify(id, HotkeyState::Pressed);
        handle.notify(id, HotkeyState::Released);
        handle.notify(id, HotkeyState::Released);
        handle.notify(id, HotkeyState::Pressed);

        assert_eq!(downs.load(Ordering::SeqCst), 2);
        assert_eq!(ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notification_for_unknown_id_is_ignored() {
        let (mut registry, _) = registry();
        let id = registry.register(key("ctrl+t"), None, None).unwrap();
        registry.unregister(id);
        assert!(!registry.handle().notify(id, HotkeyState::Pressed));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (mut registry, backend) = registry();
        let id = registry.register(key("ctrl+u"), None, None).unwrap();
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
        assert_eq!(backend.bound_count(), 0);
    }

    #[test]
    fn test_unregister_all_drains() {
        let (mut registry, backend) = registry();
        for k in ["ctrl+1", "ctrl+2", "ctrl+3"] {
            registry.register(key(k), None, None).unwrap();
        }
        assert_eq!(registry.unregister_all(), 3);
        assert_eq!(registry.unregister_all(), 0);
        assert_eq!(backend.bound_count(), 0);
    }

    #[test]
    fn test_shutdown_detaches_backend() {
        let (mut registry, backend) = registry();
        registry.register(key("ctrl+1"), None, None).unwrap();
        registry.shutdown();
        registry.shutdown();
        assert_eq!(backend.bound_count(), 0);
        assert_eq!(
            registry.register(key("ctrl+2"), None, None),
            Err(RegistrationError::NotInitialized)
        );
    }

    #[test]
    fn test_drop_unregisters() {
        let (mut registry, backend) = registry();
        registry.register(key("ctrl+1"), None, None).unwrap();
        drop(registry);
        assert_eq!(backend.bound_count(), 0);
    }

    #[test]
    fn test_subscribers_see_edges() {
        let (mut registry, _) = registry();
        let mut events = registry.subscribe();
        let id = registry.register(key("ctrl+e"), None, None).unwrap();
        let handle = registry.handle();
        handle.notify(id, HotkeyState::Pressed);
        handle.notify(id, HotkeyState::Pressed);
        handle.notify(id, HotkeyState::Released);

        assert_eq!(
            events.try_recv().unwrap(),
            HotkeyEvent {
                id,
                state: HotkeyState::Pressed
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            HotkeyEvent {
                id,
                state: HotkeyState::Released
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_callbacks_go_through_dispatcher() {
        let backend = FakeBackend::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Job>();
        let mut registry = HotkeyRegistry::new(Box::new(backend), Arc::new(tx));
        let (downs, on_down) = counter();
        let id = registry.register(key("ctrl+d"), Some(on_down), None).unwrap();

        registry.handle().notify(id, HotkeyState::Pressed);
        assert_eq!(downs.load(Ordering::SeqCst), 0);

        while let Ok(job) = rx.try_recv() {
            job();
        }
        assert_eq!(downs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        let (mut registry, _) = registry();
        let handle = registry.handle();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let id = registry
            .register(
                key("ctrl+r"),
                Some(Arc::new(move |id| {
                    // Would deadlock if invoked under the table lock
                    handle.notify(id, HotkeyState::Pressed);
                    s.fetch_add(1, Ordering::SeqCst);
                })),
                None,
            )
            .unwrap();
        registry.handle().notify(id, HotkeyState::Pressed);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_while_held_releases() {
        let (mut registry, _) = registry();
        let mut events = registry.subscribe();
        let (ups, on_up) = counter();
        let held = registry.register(key("ctrl+f1"), None, Some(on_up)).unwrap();
        let idle = registry.register(key("ctrl+f2"), None, None).unwrap();
        registry.handle().notify(held, HotkeyState::Pressed);
        events.try_recv().unwrap();

        assert!(registry.unregister(idle));
        assert!(events.try_recv().is_err());

        assert!(registry.unregister(held));
        assert_eq!(ups.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            HotkeyEvent {
                id: held,
                state: HotkeyState::Released
            }
        );
        assert!(!registry.unregister(held));
        assert_eq!(ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_releases_held_hotkeys() {
        let (mut registry, _) = registry();
        let (ups, on_up) = counter();
        let a = registry
            .register(key("alt+1"), None, Some(on_up.clone()))
            .unwrap();
        let b = registry.register(key("alt+2"), None, Some(on_up)).unwrap();
        registry.register(key("alt+3"), None, None).unwrap();
        registry.handle().notify(a, HotkeyState::Pressed);
        registry.handle().notify(b, HotkeyState::Pressed);
        registry.handle().notify(b, HotkeyState::Released);

        registry.shutdown();
        assert_eq!(ups.load(Ordering::SeqCst), 2);
        registry.shutdown();
        assert_eq!(ups.load(Ordering::SeqCst), 2);
    }
}

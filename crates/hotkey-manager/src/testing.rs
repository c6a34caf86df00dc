//! In-memory stand-ins for the OS capability seam.

use crate::error::RegistrationError;
use crate::key::{Key, PhysicalKey};
use crate::platform::{HotkeyBackend, KeyStateSource};
use crate::registry::HotkeyId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct FakeOs {
    bound: HashMap<Key, HotkeyId>,
    claimed: HashSet<Key>,
    rejected: HashSet<Key>,
}

/// A hotkey backend that behaves like the OS: one owner per combination.
///
/// Clones share state, so a test can keep one and hand the other to a registry.
#[derive(Clone, Default)]
pub struct FakeBackend {
    os: Arc<Mutex<FakeOs>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another process already owns `key`
    pub fn claim_elsewhere(&self, key: Key) {
        self.os.lock().claimed.insert(key);
    }

    /// Make the OS reject `key` outright
    pub fn reject(&self, key: Key) {
        self.os.lock().rejected.insert(key);
    }

    pub fn is_bound(&self, key: &Key) -> bool {
        self.os.lock().bound.contains_key(key)
    }

    pub fn bound_count(&self) -> usize {
        self.os.lock().bound.len()
    }
}

impl HotkeyBackend for FakeBackend {
    fn register(&mut self, id: HotkeyId, key: &Key) -> Result<(), RegistrationError> {
        let mut os = self.os.lock();
        if os.rejected.contains(key) {
            return Err(RegistrationError::Invalid(key.to_string()));
        }
        if os.claimed.contains(key) || os.bound.contains_key(key) {
            return Err(RegistrationError::Conflict(key.to_string()));
        }
        os.bound.insert(*key, id);
        Ok(())
    }

    fn unregister(&mut self, id: HotkeyId, key: &Key) -> Result<(), RegistrationError> {
        let mut os = self.os.lock();
        match os.bound.get(key) {
            Some(owner) if *owner == id => {
                os.bound.remove(key);
                Ok(())
            }
            _ => Err(RegistrationError::Invalid(format!("{key} is not bound to {id}"))),
        }
    }
}

/// A keyboard whose physical state is set by the test
#[derive(Clone, Default)]
pub struct FakeKeyboard {
    down: Arc<Mutex<HashSet<PhysicalKey>>>,
}

impl FakeKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold down every physical key of `key`
    pub fn hold(&self, key: &Key) {
        self.down.lock().extend(key.physical_keys());
    }

    pub fn release(&self, key: PhysicalKey) {
        self.down.lock().remove(&key);
    }

    pub fn release_all(&self) {
        self.down.lock().clear();
    }
}

impl KeyStateSource for FakeKeyboard {
    fn is_down(&self, key: PhysicalKey) -> bool {
        self.down.lock().contains(&key)
    }
}

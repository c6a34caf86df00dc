//! The narrow seam between the registry and the operating system.
//!
//! [`HotkeyBackend`] binds combinations to this process and [`KeyStateSource`]
//! answers whether a physical key is held right now. Production builds use
//! `global-hotkey` and `device_query`; tests use the fakes in `testing`.

use crate::error::RegistrationError;
use crate::key::{Key, PhysicalKey};
use crate::registry::{HotkeyId, HotkeyState, RegistryHandle};
use device_query::{DeviceQuery, DeviceState, Keycode};
use global_hotkey::hotkey::Code;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How long the listener blocks before re-checking its stop flag
const LISTEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Binds and unbinds global key combinations.
///
/// Implementations report refusals as [`RegistrationError::Conflict`] or
/// [`RegistrationError::Invalid`]; the registry does no bookkeeping for them.
pub trait HotkeyBackend {
    fn register(&mut self, id: HotkeyId, key: &Key) -> Result<(), RegistrationError>;
    fn unregister(&mut self, id: HotkeyId, key: &Key) -> Result<(), RegistrationError>;
}

/// Answers whether a physical key is currently held down.
pub trait KeyStateSource: Send + Sync {
    fn is_down(&self, key: PhysicalKey) -> bool;
}

/// Backend built on `global_hotkey::GlobalHotKeyManager`.
///
/// On macOS this must be created on the main thread, after the event loop.
pub struct GlobalHotkeyBackend {
    manager: GlobalHotKeyManager,
    /// global-hotkey's combination hash -> our allocated ID
    os_ids: Arc<RwLock<HashMap<u32, HotkeyId>>>,
}

impl GlobalHotkeyBackend {
    /// Connect to the OS hotkey facility.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotInitialized`] if the platform manager
    /// cannot be created.
    pub fn new() -> Result<Self, RegistrationError> {
        let manager = GlobalHotKeyManager::new().map_err(|e| {
            warn!(error = %e, "failed to create global hotkey manager");
            RegistrationError::NotInitialized
        })?;
        Ok(Self {
            manager,
            os_ids: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Routing table for this backend's notifications. Take it before the
    /// backend is handed to a registry.
    pub fn routes(&self) -> NotificationRoutes {
        NotificationRoutes {
            os_ids: self.os_ids.clone(),
        }
    }
}

/// Maps OS notifications back to the IDs of a [`GlobalHotkeyBackend`]
#[derive(Clone)]
pub struct NotificationRoutes {
    os_ids: Arc<RwLock<HashMap<u32, HotkeyId>>>,
}

impl NotificationRoutes {
    /// Start forwarding OS notifications to `handle`.
    pub fn listen(&self, handle: RegistryHandle) -> NotificationListener {
        NotificationListener::spawn(self.os_ids.clone(), handle)
    }
}

impl HotkeyBackend for GlobalHotkeyBackend {
    fn register(&mut self, id: HotkeyId, key: &Key) -> Result<(), RegistrationError> {
        let hotkey = key.to_hotkey();
        self.manager.register(hotkey)?;
        self.os_ids.write().insert(hotkey.id(), id);
        Ok(())
    }

    fn unregister(&mut self, _id: HotkeyId, key: &Key) -> Result<(), RegistrationError> {
        let hotkey = key.to_hotkey();
        self.os_ids.write().remove(&hotkey.id());
        self.manager.unregister(hotkey)?;
        Ok(())
    }
}

/// Background thread translating `GlobalHotKeyEvent`s into registry notifications
pub struct NotificationListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NotificationListener {
    fn spawn(os_ids: Arc<RwLock<HashMap<u32, HotkeyId>>>, handle: RegistryHandle) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let thread = thread::spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            while !stop_clone.load(Ordering::SeqCst) {
                match receiver.recv_timeout(LISTEN_TIMEOUT) {
                    Ok(event) => {
                        let Some(id) = os_ids.read().get(&event.id).copied() else {
                            trace!(os_id = event.id, "notification for unknown hotkey");
                            continue;
                        };
                        let state = match event.state {
                            global_hotkey::HotKeyState::Pressed => HotkeyState::Pressed,
                            global_hotkey::HotKeyState::Released => HotkeyState::Released,
                        };
                        handle.notify(id, state);
                    }
                    Err(e) if e.is_timeout() => {}
                    Err(_) => {
                        warn!("hotkey event channel disconnected");
                        break;
                    }
                }
            }
            debug!("notification listener exiting");
        });
        info!("notification listener started");

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop the listener thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("notification listener panicked");
            }
        }
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        self.stop();
    }
}

thread_local! {
    // device_query state is per thread (the X11 connection is not `Send`).
    static DEVICE: Option<DeviceState> = DeviceState::checked_new();
}

/// Live key state read through `device_query`.
///
/// Construct with [`DeviceQueryKeyState::new`], which fails where the
/// keyboard cannot be queried: no X display, a Wayland session, or macOS
/// without Input Monitoring permission.
#[derive(Debug, Clone, Copy)]
pub struct DeviceQueryKeyState {
    _checked: (),
}

impl DeviceQueryKeyState {
    /// Check that physical key state can be read from this process.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotInitialized`] if polling is unsupported
    /// or not permitted here.
    pub fn new() -> Result<Self, RegistrationError> {
        if let Some(reason) = unsupported_session(
            std::env::var("XDG_SESSION_TYPE").ok().as_deref(),
            std::env::var("DISPLAY").ok().as_deref(),
        ) {
            warn!(reason, "key state polling unavailable");
            return Err(RegistrationError::NotInitialized);
        }
        if DeviceState::checked_new().is_none() {
            warn!("key state polling unavailable: keyboard cannot be queried");
            return Err(RegistrationError::NotInitialized);
        }
        Ok(Self { _checked: () })
    }
}

impl KeyStateSource for DeviceQueryKeyState {
    /// Reports `false` if this thread cannot reach the keyboard, so held
    /// hotkeys release rather than stick.
    fn is_down(&self, key: PhysicalKey) -> bool {
        let wanted = keycodes(key);
        if wanted.is_empty() {
            debug!(?key, "no device keycode; treating as released");
            return false;
        }
        DEVICE.with(|device| match device {
            Some(device) => device.get_keys().iter().any(|k| wanted.contains(k)),
            None => {
                trace!(?key, "no keyboard connection on this thread");
                false
            }
        })
    }
}

/// Why `device_query` cannot work in this session, if it cannot.
///
/// Only Linux is checked here; the macOS permission check happens in
/// `DeviceState::checked_new`.
fn unsupported_session(session_type: Option<&str>, display: Option<&str>) -> Option<&'static str> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    if session_type.is_some_and(|t| t.eq_ignore_ascii_case("wayland")) {
        return Some("Wayland sessions do not expose global key state");
    }
    if display.is_none_or(str::is_empty) {
        return Some("no X display");
    }
    None
}

fn keycodes(key: PhysicalKey) -> Vec<Keycode> {
    let code = match key {
        PhysicalKey::Control => return vec![Keycode::LControl, Keycode::RControl],
        PhysicalKey::Alt => return vec![Keycode::LAlt, Keycode::RAlt],
        PhysicalKey::Shift => return vec![Keycode::LShift, Keycode::RShift],
        PhysicalKey::Win => return vec![Keycode::LMeta, Keycode::RMeta],
        PhysicalKey::Code(code) => code,
    };

    let keycode = match code {
        Code::KeyA => Keycode::A,
        Code::KeyB => Keycode::B,
        Code::KeyC => Keycode::C,
        Code::KeyD => Keycode::D,
        Code::KeyE => Keycode::E,
        Code::KeyF => Keycode::F,
        Code::KeyG => Keycode::G,
        Code::KeyH => Keycode::H,
        Code::KeyI => Keycode::I,
        Code::KeyJ => Keycode::J,
        Code::KeyK => Keycode::K,
        Code::KeyL => Keycode::L,
        Code::KeyM => Keycode::M,
        Code::KeyN => Keycode::N,
        Code::KeyO => Keycode::O,
        Code::KeyP => Keycode::P,
        Code::KeyQ => Keycode::Q,
        Code::KeyR => Keycode::R,
        Code::KeyS => Keycode::S,
        Code::KeyT => Keycode::T,
        Code::KeyU => Keycode::U,
        Code::KeyV => Keycode::V,
        Code::KeyW => Keycode::W,
        Code::KeyX => Keycode::X,
        Code::KeyY => Keycode::Y,
        Code::KeyZ => Keycode::Z,
        Code::Digit0 => Keycode::Key0,
        Code::Digit1 => Keycode::Key1,
        Code::Digit2 => Keycode::Key2,
        Code::Digit3 => Keycode::Key3,
        Code::Digit4 => Keycode::Key4,
        Code::Digit5 => Keycode::Key5,
        Code::Digit6 => Keycode::Key6,
        Code::Digit7 => Keycode::Key7,
        Code::Digit8 => Keycode::Key8,
        Code::Digit9 => Keycode::Key9,
        Code::F1 => Keycode::F1,
        Code::F2 => Keycode::F2,
        Code::F3 => Keycode::F3,
        Code::F4 => Keycode::F4,
        Code::F5 => Keycode::F5,
        Code::F6 => Keycode::F6,
        Code::F7 => Keycode::F7,
        Code::F8 => Keycode::F8,
        Code::F9 => Keycode::F9,
        Code::F10 => Keycode::F10,
        Code::F11 => Keycode::F11,
        Code::F12 => Keycode::F12,
        Code::F13 => Keycode::F13,
        Code::F14 => Keycode::F14,
        Code::F15 => Keycode::F15,
        Code::F16 => Keycode::F16,
        Code::F17 => Keycode::F17,
        Code::F18 => Keycode::F18,
        Code::F19 => Keycode::F19,
        Code::F20 => Keycode::F20,
        Code::CapsLock => Keycode::CapsLock,
        Code::Space => Keycode::Space,
        Code::Enter => Keycode::Enter,
        Code::Tab => Keycode::Tab,
        Code::Escape => Keycode::Escape,
        Code::Backspace => Keycode::Backspace,
        Code::Delete => Keycode::Delete,
        Code::Insert => Keycode::Insert,
        Code::Home => Keycode::Home,
        Code::End => Keycode::End,
        Code::PageUp => Keycode::PageUp,
        Code::PageDown => Keycode::PageDown,
        Code::ArrowUp => Keycode::Up,
        Code::ArrowDown => Keycode::Down,
        Code::ArrowLeft => Keycode::Left,
        Code::ArrowRight => Keycode::Right,
        Code::Minus => Keycode::Minus,
        Code::Equal => Keycode::Equal,
        Code::BracketLeft => Keycode::LeftBracket,
        Code::BracketRight => Keycode::RightBracket,
        Code::Backslash => Keycode::BackSlash,
        Code::Semicolon => Keycode::Semicolon,
        Code::Quote => Keycode::Apostrophe,
        Code::Comma => Keycode::Comma,
        Code::Period => Keycode::Dot,
        Code::Slash => Keycode::Slash,
        Code::Backquote => Keycode::Grave,
        Code::Numpad0 => Keycode::Numpad0,
        Code::Numpad1 => Keycode::Numpad1,
        Code::Numpad2 => Keycode::Numpad2,
        Code::Numpad3 => Keycode::Numpad3,
        Code::Numpad4 => Keycode::Numpad4,
        Code::Numpad5 => Keycode::Numpad5,
        Code::Numpad6 => Keycode::Numpad6,
        Code::Numpad7 => Keycode::Numpad7,
        Code::Numpad8 => Keycode::Numpad8,
        Code::Numpad9 => Keycode::Numpad9,
        Code::NumpadAdd => Keycode::NumpadAdd,
        Code::NumpadSubtract => Keycode::NumpadSubtract,
        Code::NumpadMultiply => Keycode::NumpadMultiply,
        Code::NumpadDivide => Keycode::NumpadDivide,
        Code::NumpadDecimal => Keycode::NumpadDecimal,
        Code::NumpadEnter => Keycode::NumpadEnter,
        Code::NumpadEqual => Keycode::NumpadEquals,
        _ => return Vec::new(),
    };
    vec![keycode]
}

//! A global hotkey registry with press/release edge tracking.
//!
//! The OS is asked to bind key combinations through a [`HotkeyBackend`];
//! its press notifications are de-duplicated by the [`HotkeyRegistry`], and
//! the missing release notifications are synthesized by the
//! [`ReleaseDetector`], which polls physical key state.

// Re-export commonly used types
pub use global_hotkey::hotkey::{Code, Modifiers};

pub mod dispatch;
mod error;
mod key;
pub mod platform;
pub mod registry;
pub mod release;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatch::{Dispatcher, Immediate, Job};
pub use error::{ParseError, RegistrationError};
pub use key::{Key, PhysicalKey};
pub use platform::{
    DeviceQueryKeyState, GlobalHotkeyBackend, HotkeyBackend, KeyStateSource, NotificationListener,
    NotificationRoutes,
};
pub use registry::{
    HotkeyCallback, HotkeyEvent, HotkeyId, HotkeyRegistry, HotkeyState, RegistryHandle,
};
pub use release::{DetectorConfig, DetectorThread, MIN_POLL_INTERVAL, ReleaseDetector};

//! Per-channel push-to-talk and toggle hotkeys for codeplug-driven radios.
//!
//! Keybindings are persisted per codeplug in a [`KeybindingStore`], keyed by
//! an identifier from [`derive_identifier`]. The [`ChannelHotkeyRouter`]
//! registers the active codeplug's bindings with a
//! [`hotkey_manager::HotkeyRegistry`] and reports every hotkey edge as a
//! [`ChannelEvent`].

mod channel;
mod error;
mod identifier;
mod router;
mod store;

pub use channel::{Channel, ChannelEvent};
pub use error::{Error, Result};
pub use identifier::{DEFAULT_IDENTIFIER, derive_identifier};
pub use router::{ChannelHotkeyRouter, ChannelHotkeys};
pub use store::{
    JsonFileStorage, KeybindingProfile, KeybindingStore, MemoryStorage, ProfileStorage, Profiles,
};

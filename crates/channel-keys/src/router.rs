use crate::channel::{Channel, ChannelEvent};
use crate::error::{Error, Result};
use crate::store::KeybindingStore;
use hotkey_manager::{HotkeyCallback, HotkeyId, HotkeyRegistry, Key};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// The hotkeys currently bound for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelHotkeys {
    pub ptt: Option<HotkeyId>,
    pub toggle: Option<HotkeyId>,
}

impl ChannelHotkeys {
    fn ids(self) -> impl Iterator<Item = HotkeyId> {
        self.ptt.into_iter().chain(self.toggle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Ptt,
    Toggle,
}

/// Binds the active codeplug's channels to global hotkeys and turns hotkey
/// edges into [`ChannelEvent`]s.
///
/// PTT hotkeys report both edges. Toggle hotkeys fire once per discrete
/// press; holding the key does not re-fire and releasing it does nothing.
pub struct ChannelHotkeyRouter {
    registry: HotkeyRegistry,
    store: KeybindingStore,
    events: UnboundedSender<ChannelEvent>,
    codeplug: Option<String>,
    channels: Vec<Channel>,
    bindings: HashMap<String, ChannelHotkeys>,
}

impl ChannelHotkeyRouter {
    pub fn new(
        registry: HotkeyRegistry,
        store: KeybindingStore,
        events: UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            codeplug: None,
            channels: Vec::new(),
            bindings: HashMap::new(),
        }
    }

    /// Rebuild every channel binding for `codeplug`.
    ///
    /// All previously tracked channel hotkeys are unregistered first, even
    /// when `codeplug` is unchanged. Channels whose keybinding is missing,
    /// blank, unparsable or refused by the OS are left unbound. When several
    /// channels share a name only the first is bound. Returns the number of
    /// hotkeys registered.
    pub fn initialize(&mut self, codeplug: &str, channels: &[Channel]) -> usize {
        let removed = self.unregister_all();

        self.codeplug = Some(codeplug.to_string());
        self.channels.clear();
        let mut seen = HashSet::new();
        for channel in channels {
            if seen.insert(channel.name.as_str()) {
                self.channels.push(channel.clone());
            } else {
                debug!(channel = %channel, "duplicate channel name; not bound");
            }
        }

        let mut registered = 0;
        for channel in self.channels.clone() {
            registered += self.bind_channel(codeplug, &channel);
        }

        info!(
            codeplug,
            channels = self.channels.len(),
            registered,
            removed,
            "channel hotkeys initialized"
        );
        registered
    }

    /// Unregister every channel hotkey. Returns how many were removed.
    ///
    /// A PTT hotkey held at the time still reports `PttReleased`.
    pub fn unregister_all(&mut self) -> usize {
        let mut count = 0;
        for (_, hotkeys) in self.bindings.drain() {
            for id in hotkeys.ids() {
                self.registry.unregister(id);
                count += 1;
            }
        }
        count
    }

    /// Unregister one channel's hotkeys. Returns how many were removed.
    pub fn unregister(&mut self, channel_name: &str) -> usize {
        let Some(hotkeys) = self.bindings.remove(channel_name) else {
            return 0;
        };
        let mut count = 0;
        for id in hotkeys.ids() {
            self.registry.unregister(id);
            count += 1;
        }
        debug!(channel = channel_name, count, "channel hotkeys unregistered");
        count
    }

    /// Re-read one channel's keybindings from the store and register them
    /// again. Returns the number of hotkeys registered.
    pub fn rebind(&mut self, channel_name: &str) -> usize {
        self.unregister(channel_name);

        let Some(codeplug) = self.codeplug.clone() else {
            warn!(channel = channel_name, "rebind before any codeplug was initialized");
            return 0;
        };
        let Some(channel) = self.channels.iter().find(|c| c.name == channel_name).cloned() else {
            debug!(channel = channel_name, "rebind of channel not in active codeplug");
            return 0;
        };
        self.bind_channel(&codeplug, &channel)
    }

    /// Validate, persist and apply a PTT keybinding for a channel of the
    /// active codeplug. A blank value removes the binding.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] if the value is not a valid keybinding (nothing is
    /// saved), [`Error::NotInitialized`] without an active codeplug, or a
    /// persistence error from the store.
    pub fn set_ptt_keybinding(&mut self, channel_name: &str, value: &str) -> Result<()> {
        self.set_keybinding(BindingKind::Ptt, channel_name, value)
    }

    /// Validate, persist and apply a toggle keybinding. See
    /// [`set_ptt_keybinding`](Self::set_ptt_keybinding).
    pub fn set_toggle_keybinding(&mut self, channel_name: &str, value: &str) -> Result<()> {
        self.set_keybinding(BindingKind::Toggle, channel_name, value)
    }

    fn set_keybinding(&mut self, kind: BindingKind, channel_name: &str, value: &str) -> Result<()> {
        let codeplug = self.codeplug.clone().ok_or(Error::NotInitialized)?;
        if !value.trim().is_empty() {
            Key::parse(value)?;
        }
        match kind {
            BindingKind::Ptt => self.store.set_ptt_keybinding(&codeplug, channel_name, value)?,
            BindingKind::Toggle => {
                self.store.set_toggle_keybinding(&codeplug, channel_name, value)?
            }
        }
        self.rebind(channel_name);
        Ok(())
    }

    /// Unregister every channel hotkey and detach the registry from the OS
    pub fn shutdown(&mut self) {
        self.unregister_all();
        self.registry.shutdown();
    }

    pub fn bindings(&self, channel_name: &str) -> Option<ChannelHotkeys> {
        self.bindings.get(channel_name).copied()
    }

    /// The codeplug identifier of the last `initialize`
    pub fn codeplug(&self) -> Option<&str> {
        self.codeplug.as_deref()
    }

    /// Channels of the active codeplug, duplicates removed
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn registry(&self) -> &HotkeyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &KeybindingStore {
        &self.store
    }

    fn bind_channel(&mut self, codeplug: &str, channel: &Channel) -> usize {
        let ptt = self
            .store
            .ptt_keybinding(codeplug, &channel.name)
            .map(str::to_owned);
        let toggle = self
            .store
            .toggle_keybinding(codeplug, &channel.name)
            .map(str::to_owned);

        let hotkeys = ChannelHotkeys {
            ptt: ptt.and_then(|b| self.register_binding(BindingKind::Ptt, channel, &b)),
            toggle: toggle.and_then(|b| self.register_binding(BindingKind::Toggle, channel, &b)),
        };

        let count = hotkeys.ids().count();
        if count > 0 {
            self.bindings.insert(channel.name.clone(), hotkeys);
        }
        count
    }

    fn register_binding(
        &mut self,
        kind: BindingKind,
        channel: &Channel,
        binding: &str,
    ) -> Option<HotkeyId> {
        if binding.trim().is_empty() {
            return None;
        }
        let key = match Key::parse(binding) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    channel = %channel,
                    binding,
                    ?kind,
                    error = %e,
                    "unparsable keybinding; left unbound"
                );
                return None;
            }
        };

        let (on_down, on_up) = match kind {
            BindingKind::Ptt => (
                self.emitter(ChannelEvent::PttEngaged, channel),
                Some(self.emitter(ChannelEvent::PttReleased, channel)),
            ),
            BindingKind::Toggle => (self.emitter(ChannelEvent::ToggleFired, channel), None),
        };

        match self.registry.register(key, Some(on_down), on_up) {
            Ok(id) => {
                debug!(channel = %channel, %key, %id, ?kind, "channel hotkey bound");
                Some(id)
            }
            Err(e) => {
                warn!(
                    channel = %channel,
                    %key,
                    ?kind,
                    error = %e,
                    "hotkey registration failed; left unbound"
                );
                None
            }
        }
    }

    fn emitter(&self, make: fn(Channel) -> ChannelEvent, channel: &Channel) -> HotkeyCallback {
        let events = self.events.clone();
        let channel = channel.clone();
        Arc::new(move |_| {
            if events.send(make(channel.clone())).is_err() {
                debug!("channel event receiver dropped");
            }
        })
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// A channel identity supplied by the active codeplug.
///
/// Keybindings are keyed by `name`; `zone` tells apart channels that share a
/// name in different zones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub zone: String,
}

impl Channel {
    pub fn new(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.zone.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.zone, self.name)
        }
    }
}

/// What a channel hotkey asks the channel-behavior layer to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel's PTT hotkey went down
    PttEngaged(Channel),
    /// The channel's PTT hotkey was released
    PttReleased(Channel),
    /// The channel's toggle hotkey was pressed
    ToggleFired(Channel),
}

impl ChannelEvent {
    pub fn channel(&self) -> &Channel {
        match self {
            ChannelEvent::PttEngaged(c)
            | ChannelEvent::PttReleased(c)
            | ChannelEvent::ToggleFired(c) => c,
        }
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::PttEngaged(c) => write!(f, "PTT engaged: {c}"),
            ChannelEvent::PttReleased(c) => write!(f, "PTT released: {c}"),
            ChannelEvent::ToggleFired(c) => write!(f, "toggle: {c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Channel::new("Dispatch", "North").to_string(), "North/Dispatch");
        assert_eq!(Channel::new("Dispatch", "").to_string(), "Dispatch");
        assert_eq!(
            ChannelEvent::ToggleFired(Channel::new("Tac 2", "")).to_string(),
            "toggle: Tac 2"
        );
    }

    #[test]
    fn test_ron_channel_list() {
        let ron_text = r#"[
            (name: "Dispatch", zone: "North"),
            (name: "Tac 1"),
        ]"#;
        let channels: Vec<Channel> = ron::from_str(ron_text).unwrap();
        assert_eq!(
            channels,
            vec![Channel::new("Dispatch", "North"), Channel::new("Tac 1", "")]
        );
        assert_eq!(
            ChannelEvent::PttEngaged(channels[1].clone()).channel(),
            &channels[1]
        );
    }
}

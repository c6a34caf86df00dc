use thiserror::Error;

/// Errors produced while parsing a keybinding string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A token in modifier position is not a recognized modifier
    #[error("Invalid modifier: {0:?}")]
    InvalidModifier(String),

    /// The key token is unknown, empty, or names the null key
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

/// Errors produced while registering a hotkey with the operating system
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The combination is already owned by another registration or process
    #[error("Hotkey conflict: {0}")]
    Conflict(String),

    /// The operating system rejected the combination outright
    #[error("Invalid hotkey: {0}")]
    Invalid(String),

    /// The registry is not bound to a live hotkey backend
    #[error("Hotkey registry is not initialized")]
    NotInitialized,
}

impl From<global_hotkey::Error> for RegistrationError {
    fn from(err: global_hotkey::Error) -> Self {
        match err {
            global_hotkey::Error::AlreadyRegistered(hotkey) => {
                RegistrationError::Conflict(format!("already registered (os id {})", hotkey.id()))
            }
            global_hotkey::Error::FailedToRegister(msg) => RegistrationError::Conflict(msg),
            other => RegistrationError::Invalid(other.to_string()),
        }
    }
}

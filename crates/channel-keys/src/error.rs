use hotkey_manager::ParseError;
use thiserror::Error;

/// The main error type for channel keybinding operations
#[derive(Error, Debug)]
pub enum Error {
    /// A keybinding string could not be parsed
    #[error("Invalid keybinding: {0}")]
    Parse(#[from] ParseError),

    /// Reading or writing persisted keybindings failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted keybindings could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A keybinding was edited before any codeplug was initialized
    #[error("No active codeplug")]
    NotInitialized,
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

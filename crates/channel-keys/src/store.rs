use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Per-codeplug keybindings, channel name -> keybinding string.
///
/// A missing entry means no binding; blank strings are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeybindingProfile {
    #[serde(default)]
    pub ptt_keybindings: BTreeMap<String, String>,
    #[serde(default)]
    pub toggle_keybindings: BTreeMap<String, String>,
}

/// Every known profile, keyed by codeplug identifier
pub type Profiles = BTreeMap<String, KeybindingProfile>;

/// Where the whole profile map is loaded from and written back to
pub trait ProfileStorage: Send {
    fn load(&self) -> Result<Profiles>;
    fn save(&self, profiles: &Profiles) -> Result<()>;
}

/// Profiles stored as one JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileStorage for JsonFileStorage {
    fn load(&self) -> Result<Profiles> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no keybinding file yet");
            return Ok(Profiles::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes to a sibling temporary file and renames it into place, so a
    /// failed write never leaves a truncated document behind.
    fn save(&self, profiles: &Profiles) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(profiles)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Profiles kept in memory. Clones share the same document.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    profiles: Arc<Mutex<Profiles>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document
    pub fn with_profiles(profiles: Profiles) -> Self {
        Self {
            profiles: Arc::new(Mutex::new(profiles)),
            saves: Arc::default(),
        }
    }

    /// The document as last saved
    pub fn snapshot(&self) -> Profiles {
        self.profiles.lock().clone()
    }

    /// How many times the document has been saved
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ProfileStorage for MemoryStorage {
    fn load(&self) -> Result<Profiles> {
        Ok(self.profiles.lock().clone())
    }

    fn save(&self, profiles: &Profiles) -> Result<()> {
        *self.profiles.lock() = profiles.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Persistent channel keybindings for every known codeplug.
///
/// Loaded once, then mutated one field at a time; each mutation is followed by
/// a full save of all profiles.
pub struct KeybindingStore {
    storage: Box<dyn ProfileStorage>,
    profiles: Profiles,
}

#[derive(Clone, Copy)]
enum Kind {
    Ptt,
    Toggle,
}

impl KeybindingStore {
    /// Load every profile from `storage`
    pub fn load(storage: impl ProfileStorage + 'static) -> Result<Self> {
        let profiles = storage.load()?;
        info!(codeplugs = profiles.len(), "keybindings loaded");
        Ok(Self {
            storage: Box::new(storage),
            profiles,
        })
    }

    pub fn profile(&self, codeplug: &str) -> Option<&KeybindingProfile> {
        self.profiles.get(codeplug)
    }

    /// Identifiers of every codeplug with a stored profile
    pub fn codeplugs(&self) -> impl Iterator<Item = &str> + '_ {
        self.profiles.keys().map(String::as_str)
    }

    pub fn ptt_keybinding(&self, codeplug: &str, channel: &str) -> Option<&str> {
        self.get(Kind::Ptt, codeplug, channel)
    }

    pub fn toggle_keybinding(&self, codeplug: &str, channel: &str) -> Option<&str> {
        self.get(Kind::Toggle, codeplug, channel)
    }

    /// Store a PTT keybinding; a blank value removes it. Persists immediately.
    pub fn set_ptt_keybinding(&mut self, codeplug: &str, channel: &str, value: &str) -> Result<()> {
        self.set(Kind::Ptt, codeplug, channel, value)
    }

    /// Store a toggle keybinding; a blank value removes it. Persists immediately.
    pub fn set_toggle_keybinding(
        &mut self,
        codeplug: &str,
        channel: &str,
        value: &str,
    ) -> Result<()> {
        self.set(Kind::Toggle, codeplug, channel, value)
    }

    fn get(&self, kind: Kind, codeplug: &str, channel: &str) -> Option<&str> {
        let profile = self.profiles.get(codeplug)?;
        let map = match kind {
            Kind::Ptt => &profile.ptt_keybindings,
            Kind::Toggle => &profile.toggle_keybindings,
        };
        map.get(channel).map(String::as_str)
    }

    /// The edit is applied to a copy; memory only changes once it is saved.
    fn set(&mut self, kind: Kind, codeplug: &str, channel: &str, value: &str) -> Result<()> {
        let mut profiles = self.profiles.clone();
        let profile = profiles.entry(codeplug.to_string()).or_default();
        let map = match kind {
            Kind::Ptt => &mut profile.ptt_keybindings,
            Kind::Toggle => &mut profile.toggle_keybindings,
        };

        let value = value.trim();
        if value.is_empty() {
            map.remove(channel);
        } else {
            map.insert(channel.to_string(), value.to_string());
        }

        self.storage.save(&profiles)?;
        self.profiles = profiles;
        debug!(codeplug, channel, value, "keybinding updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let storage = MemoryStorage::new();
        let mut store = KeybindingStore::load(storage.clone()).unwrap();

        store.set_ptt_keybinding("plug_1", "Dispatch", "Ctrl+F1").unwrap();
        store.set_toggle_keybinding("plug_1", "Dispatch", " Alt+1 ").unwrap();

        assert_eq!(store.ptt_keybinding("plug_1", "Dispatch"), Some("Ctrl+F1"));
        assert_eq!(store.toggle_keybinding("plug_1", "Dispatch"), Some("Alt+1"));
        assert_eq!(store.ptt_keybinding("plug_1", "Tac 1"), None);
        assert_eq!(store.ptt_keybinding("plug_2", "Dispatch"), None);
        assert_eq!(store.codeplugs().collect::<Vec<_>>(), vec!["plug_1"]);
    }

    #[test]
    fn test_blank_removes() {
        let storage = MemoryStorage::new();
        let mut store = KeybindingStore::load(storage.clone()).unwrap();

        store.set_ptt_keybinding("plug", "Dispatch", "F1").unwrap();
        store.set_ptt_keybinding("plug", "Dispatch", "   ").unwrap();
        assert_eq!(store.ptt_keybinding("plug", "Dispatch"), None);

        let saved = storage.snapshot();
        assert!(!saved["plug"].ptt_keybindings.contains_key("Dispatch"));
    }

    #[test]
    fn test_every_mutation_persists() {
        let storage = MemoryStorage::new();
        let mut store = KeybindingStore::load(storage.clone()).unwrap();
        store.set_ptt_keybinding("a", "One", "F1").unwrap();
        store.set_toggle_keybinding("b", "Two", "F2").unwrap();
        store.set_toggle_keybinding("b", "Two", "").unwrap();
        assert_eq!(storage.saves(), 3);

        // The whole map is written each time, not just the touched profile
        let saved = storage.snapshot();
        assert_eq!(saved["a"].ptt_keybindings["One"], "F1");
        assert!(saved["b"].toggle_keybindings.is_empty());
    }

    #[test]
    fn test_json_document_shape() {
        let mut profiles = Profiles::new();
        let mut profile = KeybindingProfile::default();
        profile
            .ptt_keybindings
            .insert("Dispatch".to_string(), "Ctrl+F1".to_string());
        profiles.insert("site_0011aabb".to_string(), profile);

        let json = serde_json::to_value(&profiles).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "site_0011aabb": {
                    "pttKeybindings": { "Dispatch": "Ctrl+F1" },
                    "toggleKeybindings": {}
                }
            })
        );

        let partial: Profiles =
            serde_json::from_str(r#"{"x": {"toggleKeybindings": {"A": "F3"}}}"#).unwrap();
        assert!(partial["x"].ptt_keybindings.is_empty());
        assert_eq!(partial["x"].toggle_keybindings["A"], "F3");
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keybindings.json");

        let mut store = KeybindingStore::load(JsonFileStorage::new(&path)).unwrap();
        assert!(store.profile("plug").is_none());
        store.set_ptt_keybinding("plug", "Dispatch", "Ctrl+F1").unwrap();
        store.set_toggle_keybinding("plug", "Tac 1", "Alt+T").unwrap();
        assert!(path.exists());

        let reloaded = KeybindingStore::load(JsonFileStorage::new(&path)).unwrap();
        assert_eq!(reloaded.profile("plug"), store.profile("plug"));
        assert_eq!(reloaded.toggle_keybinding("plug", "Tac 1"), Some("Alt+T"));
    }

    #[test]
    fn test_json_file_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keybindings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            KeybindingStore::load(JsonFileStorage::new(&path)),
            Err(crate::Error::Serialization(_))
        ));
    }

    /// Storage whose saves can be made to fail
    #[derive(Clone, Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing: Arc<std::sync::atomic::AtomicBool>,
    }

    impl ProfileStorage for FlakyStorage {
        fn load(&self) -> Result<Profiles> {
            self.inner.load()
        }

        fn save(&self, profiles: &Profiles) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save(profiles)
        }
    }

    #[test]
    fn test_failed_save_leaves_store_unchanged() {
        let storage = FlakyStorage::default();
        let mut store = KeybindingStore::load(storage.clone()).unwrap();
        store.set_ptt_keybinding("plug", "Dispatch", "F1").unwrap();

        storage.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.set_ptt_keybinding("plug", "Dispatch", "F2"),
            Err(crate::Error::Io(_))
        ));
        assert!(store.set_toggle_keybinding("other", "Tac 1", "F3").is_err());
        assert_eq!(store.ptt_keybinding("plug", "Dispatch"), Some("F1"));
        assert!(store.profile("other").is_none());

        // A later successful save does not carry the rejected edits
        storage.failing.store(false, Ordering::SeqCst);
        store.set_toggle_keybinding("plug", "Tac 1", "Alt+1").unwrap();
        let saved = storage.inner.snapshot();
        assert_eq!(saved["plug"].ptt_keybindings["Dispatch"], "F1");
        assert!(!saved.contains_key("other"));
    }
}

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Identifier used when no codeplug path is available
pub const DEFAULT_IDENTIFIER: &str = "default";

/// Derive the keybinding-profile identifier for a codeplug file.
///
/// The result is `{stem}_{hash}` where `hash` is the first four bytes of the
/// SHA-256 of the lowercased absolute path, as eight hex digits. The path is
/// lowercased as a whole, so the same file spelled with different case maps
/// to one identifier, while same-named files in different folders differ by
/// their hash suffix.
pub fn derive_identifier(path: Option<&Path>) -> String {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return DEFAULT_IDENTIFIER.to_string();
    };

    let full: PathBuf = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let lowered = PathBuf::from(full.to_string_lossy().to_lowercase());

    let Some(stem) = lowered.file_stem() else {
        return DEFAULT_IDENTIFIER.to_string();
    };

    let digest = Sha256::digest(lowered.to_string_lossy().as_bytes());
    format!("{}_{}", stem.to_string_lossy(), hex::encode(&digest[..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_is_default() {
        assert_eq!(derive_identifier(None), "default");
        assert_eq!(derive_identifier(Some(Path::new(""))), "default");
    }

    #[test]
    fn test_deterministic_and_case_insensitive() {
        let a = derive_identifier(Some(Path::new("/radios/Site A.xml")));
        let b = derive_identifier(Some(Path::new("/radios/Site A.xml")));
        let c = derive_identifier(Some(Path::new("/RADIOS/site a.XML")));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[cfg(unix)]
    #[test]
    fn test_format() {
        assert_eq!(
            derive_identifier(Some(Path::new("/radios/Site A.xml"))),
            "site a_bc586d78"
        );
    }

    #[test]
    fn test_same_name_different_folder() {
        let a = derive_identifier(Some(Path::new("/radios/site a.xml")));
        let b = derive_identifier(Some(Path::new("/radios/archive/site a.xml")));
        assert_ne!(a, b);
        let (stem_a, hash_a) = a.rsplit_once('_').unwrap();
        let (stem_b, hash_b) = b.rsplit_once('_').unwrap();
        assert_eq!(stem_a, stem_b);
        assert_eq!(hash_a.len(), 8);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let relative = derive_identifier(Some(Path::new("plug.xml")));
        let absolute = derive_identifier(Some(
            &std::env::current_dir().unwrap().join("plug.xml"),
        ));
        assert_eq!(relative, absolute);
    }
}

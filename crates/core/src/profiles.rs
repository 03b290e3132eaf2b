//! Stored network credentials: a flat JSON map of SSID to password,
//! read and written whole on each access. Only touched from UI-driven
//! single-shot actions, never from the concurrent core.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All stored profiles. A missing or unreadable file reads as empty.
    pub fn load(&self) -> BTreeMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn save(&self, profiles: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(profiles).context("encode profiles")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("write {}", self.path.display()))
    }

    pub fn password(&self, ssid: &str) -> Option<String> {
        self.load().get(ssid).cloned()
    }

    pub fn store(&self, ssid: &str, password: &str) -> Result<()> {
        let mut profiles = self.load();
        profiles.insert(ssid.to_string(), password.to_string());
        self.save(&profiles)
    }

    pub fn forget(&self, ssid: &str) -> Result<()> {
        let mut profiles = self.load();
        if profiles.remove(ssid).is_some() {
            self.save(&profiles)?;
        }
        Ok(())
    }

    pub fn is_known(&self, ssid: &str) -> bool {
        self.load().contains_key(ssid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(tag: &str) -> ProfileStore {
        let path = std::env::temp_dir().join(format!(
            "opsdeck-profiles-{}-{tag}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        ProfileStore::new(path)
    }

    #[test]
    fn missing_file_reads_empty() {
        let store = scratch_store("empty");
        assert!(store.load().is_empty());
        assert!(!store.is_known("corp"));
        assert!(store.password("corp").is_none());
    }

    #[test]
    fn store_and_forget_round_trip() {
        let store = scratch_store("roundtrip");
        store.store("corp", "hunter2").expect("store");
        store.store("guest", "open sesame").expect("store");

        assert!(store.is_known("corp"));
        assert_eq!(store.password("guest").as_deref(), Some("open sesame"));

        store.store("corp", "rotated").expect("update");
        assert_eq!(store.password("corp").as_deref(), Some("rotated"));

        store.forget("corp").expect("forget");
        assert!(!store.is_known("corp"));
        assert!(store.is_known("guest"));

        // forgetting an unknown ssid is fine
        store.forget("corp").expect("forget again");
        let _ = std::fs::remove_file(&store.path);
    }

    #[test]
    fn corrupt_file_reads_empty() {
        let store = scratch_store("corrupt");
        std::fs::write(&store.path, "not json").expect("write");
        assert!(store.load().is_empty());
        let _ = std::fs::remove_file(&store.path);
    }
}

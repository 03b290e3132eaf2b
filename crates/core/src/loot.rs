//! Loot directory layout and timestamped capture paths.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use crate::settings::{Settings, LOOT_SUBDIRS};

/// Filename-safe timestamp, second resolution.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Create the loot tree under the configured home.
pub fn create_loot_dirs(settings: &Settings) -> Result<()> {
    for subdir in LOOT_SUBDIRS {
        let path = settings.loot_dir().join(subdir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create loot dir {}", path.display()))?;
    }
    Ok(())
}

/// Timestamped output path inside a loot category, creating the category
/// directory on demand.
pub fn loot_path(settings: &Settings, category: &str, prefix: &str, extension: &str) -> PathBuf {
    let dir = settings.loot_dir().join(category);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        tracing::warn!(dir = %dir.display(), %err, "loot dir create failed");
    }
    dir.join(format!("{prefix}_{}.{extension}", timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_settings() -> Settings {
        let mut settings = Settings::default();
        settings.home = std::env::temp_dir().join(format!("opsdeck-loot-{}", std::process::id()));
        settings
    }

    #[test]
    fn timestamp_is_filename_safe() {
        let stamp = timestamp();
        assert_eq!(stamp.len(), 15);
        assert!(stamp.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn loot_path_lands_in_category_dir() {
        let settings = scratch_settings();
        let path = loot_path(&settings, "nmap", "quick", "txt");
        assert!(path.starts_with(settings.loot_dir().join("nmap")));
        let name = path.file_name().expect("name").to_string_lossy().to_string();
        assert!(name.starts_with("quick_"));
        assert!(name.ends_with(".txt"));
        assert!(path.parent().expect("parent").is_dir());
        let _ = std::fs::remove_dir_all(&settings.home);
    }

    #[test]
    fn create_loot_dirs_builds_the_whole_tree() {
        let settings = scratch_settings();
        create_loot_dirs(&settings).expect("create");
        for subdir in LOOT_SUBDIRS {
            assert!(settings.loot_dir().join(subdir).is_dir());
        }
        let _ = std::fs::remove_dir_all(&settings.home);
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Loot subdirectories created at startup and browsed by the loot screen.
pub const LOOT_SUBDIRS: &[&str] = &[
    "nmap",
    "responder",
    "mitm",
    "deauth",
    "wifi",
    "shells",
    "captures",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub home: PathBuf,
    pub interfaces: Interfaces,
    pub timing: Timing,
    pub tuning: Tuning,
    pub ui: Ui,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Interfaces {
    pub wifi: String,
    pub monitor: String,
    pub ethernet: String,
    pub usb: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub backlight_timeout_secs: u64,
    pub render_interval_ms: u64,
    pub render_interval_active_ms: u64,
    pub data_refresh_secs: u64,
    pub payload_timeout_secs: u64,
    pub confirm_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub nmap_timing: String,
    pub deauth_count: u32,
    pub deauth_timeout_secs: u64,
    pub responder_timeout_secs: u64,
    pub mitm_timeout_secs: u64,
    pub capture_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ui {
    pub alert_capacity: usize,
    pub menu_visible_rows: usize,
    pub process_list_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: default_home(),
            interfaces: Interfaces::default(),
            timing: Timing::default(),
            tuning: Tuning::default(),
            ui: Ui::default(),
        }
    }
}

impl Default for Interfaces {
    fn default() -> Self {
        Self {
            wifi: "wlan0".to_string(),
            monitor: "wlan1".to_string(),
            ethernet: "eth0".to_string(),
            usb: "usb0".to_string(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            backlight_timeout_secs: 60,
            render_interval_ms: 500,
            render_interval_active_ms: 100,
            data_refresh_secs: 2,
            payload_timeout_secs: 300,
            confirm_window_secs: 3,
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            nmap_timing: "-T4".to_string(),
            deauth_count: 10,
            deauth_timeout_secs: 30,
            responder_timeout_secs: 300,
            mitm_timeout_secs: 60,
            capture_timeout_secs: 30,
        }
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            alert_capacity: 50,
            menu_visible_rows: 7,
            process_list_count: 20,
        }
    }
}

fn default_home() -> PathBuf {
    std::env::var_os("OPSDECK_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/var/lib/opsdeck"))
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        let settings: Settings =
            toml::from_str(&raw).with_context(|| format!("parse settings {}", path.display()))?;
        Ok(settings)
    }

    pub fn loot_dir(&self) -> PathBuf {
        self.home.join("loot")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.home.join("wifi_profiles.json")
    }

    /// Monitor-mode interface name airmon-ng derives from the adapter.
    pub fn monitor_iface(&self) -> String {
        format!("{}mon", self.interfaces.monitor)
    }

    pub fn payload_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.payload_timeout_secs)
    }

    pub fn confirm_window(&self) -> Duration {
        Duration::from_secs(self.timing.confirm_window_secs)
    }

    pub fn backlight_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.backlight_timeout_secs)
    }

    pub fn render_interval(&self, payload_running: bool) -> Duration {
        if payload_running {
            Duration::from_millis(self.timing.render_interval_active_ms)
        } else {
            Duration::from_millis(self.timing.render_interval_ms)
        }
    }
}

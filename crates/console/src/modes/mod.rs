//! The operational screens, in panel display order.

mod alerts;
mod loot;
mod mitm;
mod network;
mod nmap;
mod processes;
mod profiles;
mod responder;
mod shells;
mod system;
mod tools;
mod usb;
mod wifi;

use std::sync::Arc;

use opsdeck_core::{Mode, Settings};

pub use alerts::AlertsMode;
pub use loot::LootMode;
pub use mitm::MitmMode;
pub use network::NetworkMode;
pub use nmap::NmapMode;
pub use processes::ProcessesMode;
pub use profiles::ProfilesMode;
pub use responder::ResponderMode;
pub use shells::ShellsMode;
pub use system::SystemMode;
pub use tools::ToolsMode;
pub use usb::UsbMode;
pub use wifi::WifiMode;

/// All modes in display order.
pub fn all_modes(settings: &Settings) -> Vec<Arc<dyn Mode>> {
    vec![
        SystemMode::new(settings),
        NetworkMode::new(settings),
        NmapMode::new(settings),
        WifiMode::new(settings),
        ResponderMode::new(settings),
        MitmMode::new(settings),
        ShellsMode::new(settings),
        UsbMode::new(settings),
        ProcessesMode::new(settings),
        LootMode::new(settings),
        ProfilesMode::new(settings),
        ToolsMode::new(settings),
        AlertsMode::new(settings),
    ]
}

/// Modes with actionable menus, addressable from the headless CLI.
pub const CLI_MODES: &[&str] = &[
    "system",
    "nmap",
    "wifi",
    "responder",
    "mitm",
    "shells",
    "usb",
    "profiles",
    "tools",
];

/// Build one CLI-addressable mode by short name.
pub fn cli_mode(name: &str, settings: &Settings) -> Option<Arc<dyn Mode>> {
    let mode: Arc<dyn Mode> = match name.to_ascii_lowercase().as_str() {
        "system" => SystemMode::new(settings),
        "nmap" => NmapMode::new(settings),
        "wifi" => WifiMode::new(settings),
        "responder" => ResponderMode::new(settings),
        "mitm" => MitmMode::new(settings),
        "shells" => ShellsMode::new(settings),
        "usb" => UsbMode::new(settings),
        "profiles" => ProfilesMode::new(settings),
        "tools" => ToolsMode::new(settings),
        _ => return None,
    };
    Some(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_modes_in_display_order() {
        let modes = all_modes(&Settings::default());
        assert_eq!(modes.len(), 13);
        assert_eq!(modes[0].name(), "SYSTEM");
        assert_eq!(modes[12].name(), "ALERTS");
    }

    #[test]
    fn cli_names_all_resolve() {
        let settings = Settings::default();
        for name in CLI_MODES {
            assert!(cli_mode(name, &settings).is_some(), "unresolved: {name}");
        }
        assert!(cli_mode("SYSTEM", &settings).is_some());
        assert!(cli_mode("bogus", &settings).is_none());
    }
}

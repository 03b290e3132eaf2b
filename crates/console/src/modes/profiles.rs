//! Mission profiles: pre-configured action sets for operational
//! postures. One profile executes at a time, in the background, with
//! per-step tolerance.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, Settings};

#[derive(Clone, Debug)]
enum ProfileAction {
    Service { name: &'static str, verb: &'static str },
    RfKill { device: &'static str, verb: &'static str },
    Exec { cmd: &'static str },
    LedOff,
    CpuGovernor { governor: &'static str },
}

#[derive(Clone)]
struct MissionProfile {
    name: &'static str,
    desc: &'static str,
    icon: &'static str,
    actions: Vec<ProfileAction>,
}

fn mission_profiles() -> Vec<MissionProfile> {
    use ProfileAction::*;
    vec![
        MissionProfile {
            name: "Stealth",
            desc: "Silent - radio off, min services",
            icon: "🔇",
            actions: vec![
                RfKill { device: "wifi", verb: "block" },
                RfKill { device: "bluetooth", verb: "block" },
                Service { name: "bluetooth", verb: "stop" },
                LedOff,
            ],
        },
        MissionProfile {
            name: "Network",
            desc: "Full connectivity enabled",
            icon: "🌐",
            actions: vec![
                RfKill { device: "all", verb: "unblock" },
                Service { name: "NetworkManager", verb: "start" },
                Service { name: "ssh", verb: "start" },
            ],
        },
        MissionProfile {
            name: "Recon",
            desc: "Monitor mode + scanning",
            icon: "🔍",
            actions: vec![
                RfKill { device: "wifi", verb: "unblock" },
                Exec { cmd: "airmon-ng start wlan1" },
            ],
        },
        MissionProfile {
            name: "USB-Eth",
            desc: "USB Ethernet gadget mode",
            icon: "🔌",
            actions: vec![
                Exec { cmd: "modprobe g_ether" },
                Exec { cmd: "ip link set usb0 up" },
                Exec { cmd: "ip addr add 192.168.7.2/24 dev usb0" },
            ],
        },
        MissionProfile {
            name: "AP Mode",
            desc: "Start access point",
            icon: "📡",
            actions: vec![
                Service { name: "hostapd", verb: "start" },
                Service { name: "dnsmasq", verb: "start" },
            ],
        },
        MissionProfile {
            name: "Low Power",
            desc: "Minimum power consumption",
            icon: "🔋",
            actions: vec![
                RfKill { device: "all", verb: "block" },
                Service { name: "bluetooth", verb: "stop" },
                LedOff,
                CpuGovernor { governor: "powersave" },
            ],
        },
        MissionProfile {
            name: "Performance",
            desc: "Maximum performance",
            icon: "⚡",
            actions: vec![CpuGovernor { governor: "performance" }],
        },
        MissionProfile {
            name: "Kill All",
            desc: "Stop all tools and services",
            icon: "🛑",
            actions: vec![
                Exec { cmd: "pkill -9 tcpdump bettercap nmap responder airmon-ng" },
                Service { name: "hostapd", verb: "stop" },
                Exec { cmd: "airmon-ng stop wlan1mon 2>/dev/null" },
            ],
        },
    ]
}

pub struct ProfilesMode {
    menu: Mutex<Menu>,
    profiles: Vec<MissionProfile>,
    executing: Arc<Mutex<Option<&'static str>>>,
}

impl ProfilesMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let profiles = mission_profiles();
        let executing: Arc<Mutex<Option<&'static str>>> = Arc::new(Mutex::new(None));
        let items = profiles
            .iter()
            .map(|profile| {
                let profile = profile.clone();
                let executing = Arc::clone(&executing);
                MenuItem::action(profile.icon, profile.name, move |ctx| {
                    execute_profile(ctx, &profile, &executing);
                    Ok(())
                })
            })
            .collect();
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            profiles,
            executing,
        })
    }
}

fn execute_profile(ctx: &Ctx, profile: &MissionProfile, executing: &Arc<Mutex<Option<&'static str>>>) {
    {
        let mut slot = executing.lock().expect("executing lock");
        if slot.is_some() {
            ctx.state
                .add_alert("Profile already executing", AlertLevel::Warning);
            return;
        }
        *slot = Some(profile.name);
    }
    ctx.state.set_render_needed(true);
    ctx.state
        .add_alert(format!("Running: {}", profile.name), AlertLevel::Info);

    let state = Arc::clone(&ctx.state);
    let executing = Arc::clone(executing);
    let profile = profile.clone();
    tokio::spawn(async move {
        let total = profile.actions.len();
        let mut succeeded = 0;
        for action in &profile.actions {
            if execute_action(action).await {
                succeeded += 1;
            }
        }
        if succeeded == total {
            state.add_alert(format!("✓ {} complete", profile.name), AlertLevel::Ok);
        } else {
            state.add_alert(
                format!("⚠ {}: {succeeded}/{total}", profile.name),
                AlertLevel::Warning,
            );
        }
        *executing.lock().expect("executing lock") = None;
        state.set_render_needed(true);
    });
}

async fn run_step(program: &str, args: &[&str], timeout: Duration) -> bool {
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::null()).stderr(Stdio::null());
    matches!(
        tokio::time::timeout(timeout, cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

async fn execute_action(action: &ProfileAction) -> bool {
    match action {
        ProfileAction::Service { name, verb } => {
            run_step("sudo", &["systemctl", verb, name], Duration::from_secs(10)).await
        }
        ProfileAction::RfKill { device, verb } => {
            run_step("sudo", &["rfkill", verb, device], Duration::from_secs(5)).await
        }
        ProfileAction::Exec { cmd } => {
            run_step(
                "/bin/bash",
                &["-c", &format!("sudo {cmd}")],
                Duration::from_secs(30),
            )
            .await
        }
        ProfileAction::LedOff => std::fs::write("/sys/class/leds/ACT/brightness", "0").is_ok(),
        ProfileAction::CpuGovernor { governor } => {
            let mut any = false;
            for cpu in 0..4 {
                let path = format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/scaling_governor");
                if !std::path::Path::new(&path).exists() {
                    continue;
                }
                let ok = match std::fs::write(&path, governor) {
                    Ok(()) => true,
                    Err(_) => {
                        run_step(
                            "/bin/bash",
                            &["-c", &format!("echo {governor} | sudo tee {path}")],
                            Duration::from_secs(5),
                        )
                        .await
                    }
                };
                any = any || ok;
            }
            any
        }
    }
}

impl Mode for ProfilesMode {
    fn name(&self) -> &'static str {
        "PROFILES"
    }

    fn icon(&self) -> &'static str {
        "📋"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "MISSION PROFILE");
        if let Some(name) = *self.executing.lock().expect("executing lock") {
            canvas.pair("Executing:", name, Tone::Highlight);
        }
        let menu = self.menu.lock().expect("menu lock");
        canvas.menu(&menu);
        if let Some(profile) = self.profiles.get(menu.selected()) {
            canvas.footer(profile.desc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{AppState, PayloadRunner};

    #[test]
    fn every_profile_becomes_a_menu_action() {
        let mode = ProfilesMode::new(&Settings::default());
        assert_eq!(mode.action_labels().len(), mode.profiles.len());
        assert_eq!(mode.action_labels()[0], "Stealth");
    }

    #[tokio::test]
    async fn second_profile_is_refused_while_one_runs() {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        let ctx = Ctx::new(state, runner, Arc::new(Settings::default()));
        let executing: Arc<Mutex<Option<&'static str>>> = Arc::new(Mutex::new(Some("Stealth")));
        let profile = mission_profiles().remove(1);

        execute_profile(&ctx, &profile, &executing);
        assert!(ctx
            .state
            .alerts()
            .iter()
            .any(|alert| alert.message.contains("already executing")));
    }
}

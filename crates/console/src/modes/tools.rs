//! Quick tool launcher: start/stop common services and captures with a
//! live status column.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::profiles::ProfileStore;
use opsdeck_core::{AlertLevel, Settings};

use crate::net;

const REFRESH_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy)]
struct ToolDef {
    name: &'static str,
    desc: &'static str,
    start: &'static str,
    stop: &'static str,
    check: &'static str,
}

const TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "tcpdump",
        desc: "Packet capture",
        start: "sudo tcpdump -i any -w /tmp/capture.pcap &",
        stop: "sudo killall tcpdump",
        check: "pgrep tcpdump",
    },
    ToolDef {
        name: "bettercap",
        desc: "Network attack",
        start: "sudo bettercap -caplet /root/recon.cap &",
        stop: "sudo killall bettercap",
        check: "pgrep bettercap",
    },
    ToolDef {
        name: "hostapd",
        desc: "Access point",
        start: "sudo systemctl start hostapd",
        stop: "sudo systemctl stop hostapd",
        check: "systemctl is-active hostapd --quiet",
    },
    ToolDef {
        name: "dnsmasq",
        desc: "DNS/DHCP server",
        start: "sudo systemctl start dnsmasq",
        stop: "sudo systemctl stop dnsmasq",
        check: "systemctl is-active dnsmasq --quiet",
    },
    ToolDef {
        name: "tshark",
        desc: "Wireshark CLI",
        start: "sudo tshark -i wlan0 -w /tmp/tshark.pcap &",
        stop: "sudo killall tshark",
        check: "pgrep tshark",
    },
    ToolDef {
        name: "ncat",
        desc: "Netcat listener",
        start: "ncat -lvnp 4444 &",
        stop: "pkill -f 'ncat -l'",
        check: "pgrep -f 'ncat -l'",
    },
    ToolDef {
        name: "ssh",
        desc: "SSH server",
        start: "sudo systemctl start ssh",
        stop: "sudo systemctl stop ssh",
        check: "systemctl is-active ssh --quiet",
    },
];

type StatusMap = BTreeMap<&'static str, bool>;

pub struct ToolsMode {
    menu: Mutex<Menu>,
    status: Arc<Mutex<StatusMap>>,
    refreshed: Mutex<Option<Instant>>,
}

impl ToolsMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let status: Arc<Mutex<StatusMap>> = Arc::new(Mutex::new(StatusMap::new()));
        Arc::new(Self {
            menu: Mutex::new(Menu::new(
                build_items(&status, &StatusMap::new(), false),
                settings.ui.menu_visible_rows,
            )),
            status,
            refreshed: Mutex::new(None),
        })
    }

    fn refresh_status(&self, ctx: &Ctx) {
        let snapshot: StatusMap = TOOLS
            .iter()
            .map(|tool| (tool.name, is_tool_running(tool)))
            .collect();
        *self.status.lock().expect("status lock") = snapshot.clone();
        *self.refreshed.lock().expect("refresh lock") = Some(Instant::now());
        self.menu.lock().expect("menu lock").set_items(build_items(
            &self.status,
            &snapshot,
            ctx.state.tools_on_target(),
        ));
    }
}

fn build_items(
    status: &Arc<Mutex<StatusMap>>,
    snapshot: &StatusMap,
    on_target: bool,
) -> Vec<MenuItem> {
    let mut items: Vec<MenuItem> = TOOLS
        .iter()
        .map(|tool| {
            let running = snapshot.get(tool.name).copied().unwrap_or(false);
            let status = Arc::clone(status);
            let tool = *tool;
            MenuItem::action(
                if running { "■" } else { "▶" },
                tool.name,
                move |ctx| {
                    toggle_tool(ctx, &tool, &status);
                    Ok(())
                },
            )
            .with_status(
                if running { "RUN" } else { "---" },
                if running { Tone::Ok } else { Tone::Dim },
            )
        })
        .collect();
    items.push(
        MenuItem::action("◎", "Tools on target", |ctx| {
            toggle_tools_on_target(ctx);
            Ok(())
        })
        .with_status(
            if on_target { "ON" } else { "OFF" },
            if on_target { Tone::Ok } else { Tone::Dim },
        ),
    );
    items
}

/// Pin network-layer tools to the current wireless network: remember it
/// as the target (with the stored key, so the adapter can reconnect
/// after monitor-mode work) and route tools through the monitor adapter.
fn toggle_tools_on_target(ctx: &Ctx) {
    let enable = !ctx.state.tools_on_target();
    if enable {
        match net::current_ssid() {
            Some(ssid) => {
                let key = ProfileStore::new(ctx.settings.profiles_file()).password(&ssid);
                if key.is_none() {
                    ctx.state
                        .add_alert(format!("No stored key for {ssid}"), AlertLevel::Warning);
                }
                ctx.state
                    .add_alert(format!("Target: {ssid}"), AlertLevel::Info);
                ctx.state.set_target_network(Some(ssid), key);
            }
            None => {
                ctx.state
                    .add_alert("No current network", AlertLevel::Warning);
            }
        }
    } else {
        ctx.state
            .add_alert("Tools on target off", AlertLevel::Info);
    }
    ctx.state.set_tools_on_target(enable);
}

fn shell_status(command: &str) -> bool {
    Command::new("/bin/bash")
        .arg("-c")
        .arg(command)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn is_tool_running(tool: &ToolDef) -> bool {
    shell_status(tool.check)
}

fn toggle_tool(ctx: &Ctx, tool: &ToolDef, status: &Arc<Mutex<StatusMap>>) {
    let running = status
        .lock()
        .expect("status lock")
        .get(tool.name)
        .copied()
        .unwrap_or(false);

    let (command, verb) = if running {
        (tool.stop, "Stopped")
    } else {
        (tool.start, "Started")
    };
    shell_status(command);
    std::thread::sleep(Duration::from_millis(500));

    let now_running = is_tool_running(tool);
    let changed = now_running != running;
    if changed {
        ctx.state
            .add_alert(format!("{verb}: {}", tool.name), AlertLevel::Ok);
    } else {
        ctx.state.add_alert(
            format!(
                "Failed to {}: {}",
                if running { "stop" } else { "start" },
                tool.name
            ),
            AlertLevel::Error,
        );
    }
    status.lock().expect("status lock").insert(tool.name, now_running);
    ctx.state.set_render_needed(true);
}

impl Mode for ToolsMode {
    fn name(&self) -> &'static str {
        "TOOLS"
    }

    fn icon(&self) -> &'static str {
        "🔧"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        self.refresh_status(ctx);
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        self.refresh_status(ctx);
        ctx.state.add_alert("Status refreshed", AlertLevel::Info);
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        let stale = self
            .refreshed
            .lock()
            .expect("refresh lock")
            .map(|at| at.elapsed() > REFRESH_INTERVAL)
            .unwrap_or(true);
        if stale {
            self.refresh_status(ctx);
        }

        draw_header(canvas, ctx, "TOOLS");
        let running = self
            .status
            .lock()
            .expect("status lock")
            .values()
            .filter(|up| **up)
            .count();
        canvas.pair(
            "Running:",
            running.to_string(),
            if running > 0 { Tone::Ok } else { Tone::Dim },
        );
        let menu = self.menu.lock().expect("menu lock");
        canvas.menu(&menu);
        let desc = TOOLS
            .get(menu.selected())
            .map(|tool| tool.desc)
            .unwrap_or("Pin tools to this net");
        canvas.footer(format!("{desc} ●:Toggle K3:Refresh"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_carries_a_status_column() {
        let status: Arc<Mutex<StatusMap>> = Arc::new(Mutex::new(StatusMap::new()));
        let mut snapshot = StatusMap::new();
        snapshot.insert("tcpdump", true);
        let items = build_items(&status, &snapshot, false);
        assert_eq!(items.len(), TOOLS.len() + 1);
        let tcpdump = &items[0];
        assert_eq!(tcpdump.icon, "■");
        assert_eq!(
            tcpdump.status.as_ref().map(|(text, _)| text.as_str()),
            Some("RUN")
        );
        let idle = &items[1];
        assert_eq!(idle.icon, "▶");
        let pin = items.last().expect("pin row");
        assert_eq!(
            pin.status.as_ref().map(|(text, _)| text.as_str()),
            Some("OFF")
        );
    }

    #[test]
    fn every_tool_is_toggleable_from_the_cli() {
        let mode = ToolsMode::new(&Settings::default());
        assert_eq!(mode.action_labels().len(), TOOLS.len() + 1);
    }

    #[tokio::test]
    async fn disabling_tools_on_target_needs_no_network() {
        use opsdeck_core::{AppState, Ctx, PayloadRunner};
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        let ctx = Ctx::new(state, runner, Arc::new(Settings::default()));
        ctx.state.set_tools_on_target(true);
        toggle_tools_on_target(&ctx);
        assert!(!ctx.state.tools_on_target());
        assert!(ctx
            .state
            .alerts()
            .iter()
            .any(|alert| alert.message.contains("off")));
    }
}

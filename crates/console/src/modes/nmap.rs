//! Network reconnaissance: nmap scans against the auto-detected network,
//! results written to the loot tree.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::loot::loot_path;
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

const FALLBACK_NETWORK: &str = "192.168.1.0/24";

pub struct NmapMode {
    menu: Mutex<Menu>,
    network: Arc<Mutex<Option<String>>>,
}

struct Scan {
    label: &'static str,
    prefix: &'static str,
    timeout_secs: u64,
    /// nmap arguments with `{net}` standing in for the target and
    /// `{timing}` for the configured timing template.
    args: &'static str,
}

const SCANS: &[Scan] = &[
    Scan {
        label: "Quick Scan",
        prefix: "quick",
        timeout_secs: 180,
        args: "nmap {timing} -F {net}",
    },
    Scan {
        label: "Full Port Scan",
        prefix: "full",
        timeout_secs: 600,
        args: "nmap -p- {net}",
    },
    Scan {
        label: "Service Scan",
        prefix: "service",
        timeout_secs: 300,
        args: "nmap -sV -sC {net}",
    },
    Scan {
        label: "Vuln Scan",
        prefix: "vuln",
        timeout_secs: 600,
        args: "nmap --script vuln {net}",
    },
    Scan {
        label: "OS Detection",
        prefix: "os",
        timeout_secs: 300,
        args: "sudo nmap -O {net}",
    },
    Scan {
        label: "Stealth SYN",
        prefix: "stealth",
        timeout_secs: 600,
        args: "sudo nmap -sS -T2 {net}",
    },
    Scan {
        label: "UDP Scan",
        prefix: "udp",
        timeout_secs: 600,
        args: "sudo nmap -sU --top-ports 100 {net}",
    },
];

impl NmapMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let network: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let mut items: Vec<MenuItem> = SCANS
            .iter()
            .map(|scan| {
                let network = Arc::clone(&network);
                MenuItem::action("●", scan.label, move |ctx| {
                    launch_scan(ctx, scan, &network)
                })
            })
            .collect();
        items.push(MenuItem::action("📄", "View Loot", |ctx| {
            ctx.state.add_alert(
                format!("Loot: {}", ctx.settings.loot_dir().join("nmap").display()),
                AlertLevel::Info,
            );
            Ok(())
        }));
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            network,
        })
    }

    fn refresh_network(&self) {
        *self.network.lock().expect("network lock") = net::network_cidr();
    }

    fn current_network(&self) -> String {
        self.network
            .lock()
            .expect("network lock")
            .clone()
            .unwrap_or_else(|| FALLBACK_NETWORK.to_string())
    }
}

fn build_scan_command(scan: &Scan, timing: &str, target: &str, outfile: &str) -> String {
    format!(
        "{} -oN {outfile}",
        scan.args
            .replace("{timing}", timing)
            .replace("{net}", target)
    )
}

fn launch_scan(ctx: &Ctx, scan: &Scan, network: &Arc<Mutex<Option<String>>>) -> Result<()> {
    let target = network
        .lock()
        .expect("network lock")
        .clone()
        .unwrap_or_else(|| FALLBACK_NETWORK.to_string());
    let outfile = loot_path(&ctx.settings, "nmap", scan.prefix, "txt");
    let command = build_scan_command(
        scan,
        &ctx.settings.tuning.nmap_timing,
        &target,
        &outfile.display().to_string(),
    );
    ctx.runner.run(PayloadRequest::new(
        scan.label,
        command,
        Duration::from_secs(scan.timeout_secs),
    ));
    Ok(())
}

impl Mode for NmapMode {
    fn name(&self) -> &'static str {
        "NMAP"
    }

    fn icon(&self) -> &'static str {
        "🔍"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, _ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        self.refresh_network();
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "NMAP RECON");
        canvas.pair("Target:", self.current_network(), Tone::Info);
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Refresh/Cancel");
        Ok(())
    }

    /// Refresh the target network (the dispatcher already turned KEY3
    /// into a cancel while a scan runs).
    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        self.refresh_network();
        ctx.state.add_alert(
            format!("Network: {}", self.current_network()),
            AlertLevel::Info,
        );
        ctx.state.set_render_needed(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_scans_and_loot_are_projected_for_the_cli() {
        let mode = NmapMode::new(&Settings::default());
        let labels = mode.action_labels();
        assert_eq!(labels.len(), SCANS.len() + 1);
        assert_eq!(labels[0], "Quick Scan");
        assert_eq!(labels.last().map(String::as_str), Some("View Loot"));
    }

    #[test]
    fn scan_command_substitutes_target_and_timing() {
        let cmd = build_scan_command(&SCANS[0], "-T4", "10.9.8.0/24", "/tmp/quick.txt");
        assert_eq!(cmd, "nmap -T4 -F 10.9.8.0/24 -oN /tmp/quick.txt");

        let cmd = build_scan_command(&SCANS[6], "-T4", "10.9.8.0/24", "/tmp/udp.txt");
        assert!(cmd.starts_with("sudo nmap -sU"));
        assert!(!cmd.contains("{net}"));
        assert!(!cmd.contains("{timing}"));
    }
}

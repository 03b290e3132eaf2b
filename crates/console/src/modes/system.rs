//! System screen: CPU/RAM/temperature at a glance, power control, and
//! the kill-everything hatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use sysinfo::System;

use opsdeck_core::canvas::{tone_for_percent, Canvas, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::util::format_bytes;
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

pub struct SystemMode {
    menu: Mutex<Menu>,
    updating: Arc<AtomicBool>,
    sys: Mutex<System>,
}

impl SystemMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let updating = Arc::new(AtomicBool::new(false));
        let items = vec![
            MenuItem::action("⟳", "Reboot", |ctx| {
                confirm_power(ctx, "reboot", "Rebooting...", "sudo reboot")
            }),
            MenuItem::action("⏻", "Shutdown", |ctx| {
                confirm_power(ctx, "shutdown", "Shutting down...", "sudo shutdown -h now")
            }),
            MenuItem::action("✕", "Kill All Tools", |ctx| {
                ctx.runner.kill_all_tools();
                Ok(())
            }),
            MenuItem::action("↓", "Update&Relaunch", {
                let updating = Arc::clone(&updating);
                move |ctx| update_and_reboot(ctx, &updating)
            }),
        ];
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            updating,
            sys: Mutex::new(System::new()),
        })
    }
}

fn confirm_power(ctx: &Ctx, action: &str, notice: &str, command: &str) -> Result<()> {
    if ctx.state.request_confirm(action, ctx.settings.confirm_window()) {
        ctx.state.add_alert(notice, AlertLevel::Warning);
        ctx.runner.run(PayloadRequest::new(
            action,
            command,
            Duration::from_secs(30),
        ));
    } else {
        ctx.state
            .add_alert(format!("Press again to {action}"), AlertLevel::Warning);
    }
    Ok(())
}

fn update_and_reboot(ctx: &Ctx, updating: &Arc<AtomicBool>) -> Result<()> {
    if !ctx
        .state
        .request_confirm("update", ctx.settings.confirm_window())
    {
        ctx.state
            .add_alert("Press again to update", AlertLevel::Warning);
        return Ok(());
    }
    updating.store(true, Ordering::SeqCst);
    ctx.state.set_render_needed(true);
    let command = format!(
        "cd {} && timeout 120 git fetch origin main && git reset --hard origin/main && sudo reboot",
        ctx.settings.home.display()
    );
    let done = Arc::clone(updating);
    ctx.runner.run_then(
        PayloadRequest::new("Update&Relaunch", command, Duration::from_secs(150)),
        move || done.store(false, Ordering::SeqCst),
    );
    Ok(())
}

fn cpu_temp() -> Option<f32> {
    let raw = std::fs::read_to_string("/sys/class/thermal/thermal_zone0/temp").ok()?;
    raw.trim().parse::<f32>().ok().map(|milli| milli / 1000.0)
}

impl Mode for SystemMode {
    fn name(&self) -> &'static str {
        "SYSTEM"
    }

    fn icon(&self) -> &'static str {
        "⚙"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        if self.updating.load(Ordering::SeqCst) {
            canvas.blank();
            canvas.text(Tone::Warning, "UPDATING");
            canvas.text(Tone::Error, "WAIT!");
            canvas.blank();
            canvas.text(Tone::Dim, "Do not power off");
            return Ok(());
        }

        draw_header(canvas, ctx, "SYSTEM");

        let (cpu, mem_pct, mem_used) = {
            let mut sys = self.sys.lock().expect("sysinfo lock");
            sys.refresh_cpu();
            sys.refresh_memory();
            let total = sys.total_memory();
            let used = sys.used_memory();
            let pct = if total > 0 {
                used as f32 / total as f32 * 100.0
            } else {
                0.0
            };
            (sys.global_cpu_info().cpu_usage(), pct, used)
        };

        let cpu_tone = tone_for_percent(cpu, (50.0, 80.0));
        canvas.gauge("CPU", cpu, cpu_tone);
        canvas.gauge("RAM", mem_pct, tone_for_percent(mem_pct, (50.0, 80.0)));
        if let Some(temp) = cpu_temp() {
            canvas.pair(
                "Temp",
                format!("{temp:.0}°C"),
                tone_for_percent(temp, (60.0, 70.0)),
            );
        }
        canvas.pair("RAM used", format_bytes(mem_used), Tone::Dim);
        canvas.pair(
            "IP",
            net::local_ip().unwrap_or_else(|| "No network".to_string()),
            Tone::Ok,
        );
        canvas.separator();
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Cancel payload");
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        // a running payload is cancelled by the dispatcher before this
        ctx.state.add_alert("No payload running", AlertLevel::Info);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{AppState, PayloadRunner};

    fn ctx() -> Ctx {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        Ctx::new(state, runner, Arc::new(Settings::default()))
    }

    #[tokio::test]
    async fn first_press_only_arms_the_confirmation() {
        let ctx = ctx();
        let mode = SystemMode::new(&ctx.settings);

        mode.invoke_action(&ctx, 0).expect("reboot arm");
        assert!(!ctx.state.is_payload_running());
        assert_eq!(ctx.state.pending_confirm().as_deref(), Some("reboot"));
        assert!(ctx
            .state
            .alerts()
            .iter()
            .any(|alert| alert.message.contains("Press again")));

        // a different destructive action resets the handshake
        mode.invoke_action(&ctx, 1).expect("shutdown arm");
        assert!(!ctx.state.is_payload_running());
        assert_eq!(ctx.state.pending_confirm().as_deref(), Some("shutdown"));
    }

    #[test]
    fn cli_projection_lists_all_actions() {
        let mode = SystemMode::new(&Settings::default());
        assert_eq!(
            mode.action_labels(),
            vec!["Reboot", "Shutdown", "Kill All Tools", "Update&Relaunch"]
        );
    }
}

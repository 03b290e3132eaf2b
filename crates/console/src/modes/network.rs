//! Network interface statistics and connectivity status.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use sysinfo::Networks;

use opsdeck_core::canvas::{Canvas, Span, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Mode};
use opsdeck_core::util::format_bytes;

use crate::net;

#[derive(Clone, Debug)]
struct IfaceRow {
    name: String,
    up: bool,
    ip: String,
    tx: u64,
    rx: u64,
}

#[derive(Default)]
struct NetData {
    interfaces: Vec<IfaceRow>,
    gateway: Option<String>,
    dns: Vec<String>,
    refreshed: Option<Instant>,
}

pub struct NetworkMode {
    data: Mutex<NetData>,
}

impl NetworkMode {
    pub fn new(_settings: &opsdeck_core::Settings) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            data: Mutex::new(NetData::default()),
        })
    }

    fn refresh(&self, ctx: &Ctx) {
        let watched = [
            ctx.settings.interfaces.ethernet.clone(),
            ctx.settings.interfaces.wifi.clone(),
            ctx.settings.interfaces.usb.clone(),
        ];
        let networks = Networks::new_with_refreshed_list();
        let interfaces = watched
            .iter()
            .filter_map(|name| {
                networks.iter().find(|(net_name, _)| *net_name == name).map(
                    |(_, data)| IfaceRow {
                        name: name.clone(),
                        up: net::iface_up(name),
                        ip: net::iface_ipv4(name).unwrap_or_else(|| "N/A".to_string()),
                        tx: data.total_transmitted(),
                        rx: data.total_received(),
                    },
                )
            })
            .collect();

        *self.data.lock().expect("net lock") = NetData {
            interfaces,
            gateway: net::default_gateway(),
            dns: net::dns_servers(),
            refreshed: Some(Instant::now()),
        };
    }
}

impl Mode for NetworkMode {
    fn name(&self) -> &'static str {
        "NETWORK"
    }

    fn icon(&self) -> &'static str {
        "🌐"
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        self.refresh(ctx);
        Ok(())
    }

    /// Force refresh.
    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        self.refresh(ctx);
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        let stale = self
            .data
            .lock()
            .expect("net lock")
            .refreshed
            .map(|at| at.elapsed() > Duration::from_secs(ctx.settings.timing.data_refresh_secs))
            .unwrap_or(true);
        if stale {
            self.refresh(ctx);
        }

        draw_header(canvas, ctx, "NETWORK");
        let data = self.data.lock().expect("net lock");
        for iface in &data.interfaces {
            canvas.spans(vec![
                Span::new(format!("{}: ", iface.name), Tone::Info),
                Span::new(
                    if iface.up { "▲ " } else { "▼ " },
                    if iface.up { Tone::Ok } else { Tone::Error },
                ),
                Span::new(iface.ip.clone(), Tone::Text),
            ]);
            canvas.text(
                Tone::Dim,
                format!("  ↑{} ↓{}", format_bytes(iface.tx), format_bytes(iface.rx)),
            );
        }
        canvas.blank();
        canvas.pair(
            "GW:",
            data.gateway.clone().unwrap_or_else(|| "N/A".to_string()),
            Tone::Highlight,
        );
        for (idx, server) in data.dns.iter().enumerate() {
            canvas.pair(if idx == 0 { "DNS:" } else { "    " }, server, Tone::Dim);
        }
        canvas.footer("K3:Refresh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{AppState, PayloadRunner, Settings};
    use std::sync::Arc;

    #[tokio::test]
    async fn refresh_stamps_the_snapshot() {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        let ctx = Ctx::new(state, runner, Arc::new(Settings::default()));
        let mode = NetworkMode::new(&ctx.settings);
        mode.refresh(&ctx);
        let data = mode.data.lock().expect("net lock");
        assert!(data.refreshed.is_some());
        // only the configured interfaces can appear
        for iface in &data.interfaces {
            assert!(["eth0", "wlan0", "usb0"].contains(&iface.name.as_str()));
        }
    }
}

//! Network inspection helpers: default route, addresses, wireless
//! interface state, and the managed/monitor routing used by the wireless
//! attack flows. One-off commands run blocking; callers only invoke them
//! from lifecycle hooks and actions, never while holding the state lock.

use std::net::UdpSocket;
use std::process::Command;
use std::sync::OnceLock;

use opsdeck_core::{AlertLevel, Ctx};
use regex::Regex;

fn regex(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Run a command and capture stdout; `None` on spawn failure or nonzero
/// exit.
pub fn run_capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn run_silent(command: &str) {
    let _ = Command::new("/bin/bash").arg("-c").arg(command).output();
}

// --- default route ----------------------------------------------------

pub fn parse_default_route(output: &str) -> (Option<String>, Option<String>) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"default via (\S+) dev (\S+)");
    match re.captures(output) {
        Some(caps) => (Some(caps[2].to_string()), Some(caps[1].to_string())),
        None => (None, None),
    }
}

/// Interface carrying the default route, or the supplied fallback.
pub fn default_interface(fallback: &str) -> String {
    run_capture("ip", &["route"])
        .and_then(|out| parse_default_route(&out).0)
        .unwrap_or_else(|| fallback.to_string())
}

pub fn default_gateway() -> Option<String> {
    run_capture("ip", &["route"]).and_then(|out| parse_default_route(&out).1)
}

// --- addresses --------------------------------------------------------

/// First non-loopback IPv4 CIDR from `ip -4 addr show`.
pub fn parse_cidr(output: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"inet (\d+\.\d+\.\d+\.\d+/\d+)");
    re.captures_iter(output)
        .map(|caps| caps[1].to_string())
        .find(|cidr| !cidr.starts_with("127."))
}

pub fn network_cidr() -> Option<String> {
    run_capture("ip", &["-4", "addr", "show"]).and_then(|out| parse_cidr(&out))
}

/// First IPv4 address of one interface, without the prefix length.
pub fn iface_ipv4(name: &str) -> Option<String> {
    let output = run_capture("ip", &["-4", "addr", "show", "dev", name])?;
    let cidr = parse_cidr(&output)?;
    Some(cidr.split('/').next().unwrap_or(&cidr).to_string())
}

/// Link state from sysfs; missing interfaces read as down.
pub fn iface_up(name: &str) -> bool {
    std::fs::read_to_string(format!("/sys/class/net/{name}/operstate"))
        .map(|state| state.trim() == "up")
        .unwrap_or(false)
}

/// Local address the default route would use; no packets are sent.
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

pub fn parse_dns(resolv_conf: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"(?m)^nameserver\s+(\d+\.\d+\.\d+\.\d+)");
    re.captures_iter(resolv_conf)
        .map(|caps| caps[1].to_string())
        .take(2)
        .collect()
}

pub fn dns_servers() -> Vec<String> {
    std::fs::read_to_string("/etc/resolv.conf")
        .map(|content| parse_dns(&content))
        .unwrap_or_default()
}

// --- wireless ---------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct IfaceInfo {
    pub name: String,
    pub exists: bool,
    pub mode: String,
    pub channel: Option<String>,
    pub mac: Option<String>,
}

pub fn parse_iface_info(name: &str, output: &str) -> IfaceInfo {
    static CHANNEL_RE: OnceLock<Regex> = OnceLock::new();
    static ADDR_RE: OnceLock<Regex> = OnceLock::new();
    let lower = output.to_lowercase();
    let mode = if lower.contains("type monitor") {
        "monitor"
    } else if lower.contains("type managed") {
        "managed"
    } else {
        "unknown"
    };
    IfaceInfo {
        name: name.to_string(),
        exists: true,
        mode: mode.to_string(),
        channel: regex(&CHANNEL_RE, r"channel (\d+)")
            .captures(output)
            .map(|caps| caps[1].to_string()),
        mac: regex(&ADDR_RE, r"addr ([0-9a-f:]{17})")
            .captures(&lower)
            .map(|caps| caps[1].to_string()),
    }
}

pub fn interface_info(name: &str) -> IfaceInfo {
    match run_capture("iw", &["dev", name, "info"]) {
        Some(output) => parse_iface_info(name, &output),
        None => IfaceInfo {
            name: name.to_string(),
            mode: "unknown".to_string(),
            ..IfaceInfo::default()
        },
    }
}

pub fn parse_wireless_interfaces(output: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"Interface (\S+)")
        .captures_iter(output)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn wireless_interfaces() -> Vec<String> {
    run_capture("iw", &["dev"])
        .map(|out| parse_wireless_interfaces(&out))
        .unwrap_or_default()
}

pub fn is_monitor(name: &str) -> bool {
    interface_info(name).mode == "monitor"
}

/// SSID of the currently associated network, if any.
pub fn current_ssid() -> Option<String> {
    let output = run_capture("iwgetid", &["-r"])?;
    let ssid = output.trim();
    if ssid.is_empty() {
        return None;
    }
    Some(ssid.to_string())
}

// --- managed/monitor routing (tools-on-target) ------------------------

/// Interface network-layer tools should use: the monitor adapter when the
/// operator pinned tools to the target network, the default-route
/// interface otherwise.
pub fn target_interface(ctx: &Ctx) -> String {
    if ctx.state.tools_on_target() {
        ensure_managed_connected(ctx);
        return ctx.settings.interfaces.monitor.clone();
    }
    default_interface(&ctx.settings.interfaces.wifi)
}

/// Switch the monitor adapter into monitor mode; returns the monitor
/// interface name, or `None` after an ERROR alert on failure.
pub fn prepare_monitor(ctx: &Ctx) -> Option<String> {
    let mon = ctx.settings.monitor_iface();
    if is_monitor(&mon) {
        return Some(mon);
    }
    run_silent(&format!(
        "sudo airmon-ng check kill && sudo airmon-ng start {}",
        ctx.settings.interfaces.monitor
    ));
    if is_monitor(&mon) {
        return Some(mon);
    }
    ctx.state
        .add_alert("Failed: monitor mode", AlertLevel::Error);
    None
}

/// Drop monitor mode after a monitor-mode tool finishes and, when pinned
/// to a target network, reconnect the adapter to it.
pub fn restore_after_monitor(ctx: &Ctx) {
    run_silent(&format!("sudo airmon-ng stop {}", ctx.settings.monitor_iface()));
    if ctx.state.tools_on_target() {
        ensure_managed_connected(ctx);
    }
}

fn ensure_managed_connected(ctx: &Ctx) {
    let mon = ctx.settings.monitor_iface();
    if is_monitor(&mon) {
        run_silent(&format!("sudo airmon-ng stop {mon}"));
    }
    run_silent("sudo systemctl restart NetworkManager");

    let Some((ssid, password)) = ctx.state.target_network() else {
        return;
    };
    let connect = format!(
        "nmcli device wifi connect {} password {} ifname {}",
        shell_quote(&ssid),
        shell_quote(&password),
        ctx.settings.interfaces.monitor
    );
    match Command::new("/bin/bash").arg("-c").arg(&connect).output() {
        Ok(output) if output.status.success() => {}
        _ => ctx
            .state
            .add_alert("Target reconnect failed", AlertLevel::Warning),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP_ROUTE: &str = "\
default via 192.168.8.1 dev wlan0 proto dhcp metric 600
192.168.8.0/24 dev wlan0 proto kernel scope link src 192.168.8.23";

    #[test]
    fn default_route_yields_iface_and_gateway() {
        let (iface, gw) = parse_default_route(IP_ROUTE);
        assert_eq!(iface.as_deref(), Some("wlan0"));
        assert_eq!(gw.as_deref(), Some("192.168.8.1"));
        assert_eq!(parse_default_route("no routes here"), (None, None));
    }

    #[test]
    fn cidr_skips_loopback() {
        let output = "\
    inet 127.0.0.1/8 scope host lo
    inet 192.168.8.23/24 brd 192.168.8.255 scope global dynamic wlan0";
        assert_eq!(parse_cidr(output).as_deref(), Some("192.168.8.23/24"));
        assert_eq!(parse_cidr("    inet 127.0.0.1/8 scope host lo"), None);
    }

    #[test]
    fn dns_takes_the_first_two() {
        let resolv = "# generated\nnameserver 1.1.1.1\nnameserver 8.8.8.8\nnameserver 9.9.9.9\n";
        assert_eq!(parse_dns(resolv), vec!["1.1.1.1", "8.8.8.8"]);
        assert!(parse_dns("search lan\n").is_empty());
    }

    #[test]
    fn iface_info_extracts_mode_channel_mac() {
        let output = "\
Interface wlan1mon
	ifindex 5
	addr aa:bb:cc:dd:ee:ff
	type monitor
	channel 6 (2437 MHz), width: 20 MHz";
        let info = parse_iface_info("wlan1mon", output);
        assert!(info.exists);
        assert_eq!(info.mode, "monitor");
        assert_eq!(info.channel.as_deref(), Some("6"));
        assert_eq!(info.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));

        let managed = parse_iface_info("wlan0", "Interface wlan0\n\ttype managed\n");
        assert_eq!(managed.mode, "managed");
        assert!(managed.channel.is_none());
    }

    #[test]
    fn wireless_interface_listing() {
        let output = "phy#0\n\tInterface wlan0\nphy#1\n\tInterface wlan1\n";
        assert_eq!(parse_wireless_interfaces(output), vec!["wlan0", "wlan1"]);
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("o'brien"), "'o'\\''brien'");
    }
}

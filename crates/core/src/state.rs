//! Thread-safe application state.
//!
//! One mutex guards every mutable field; snapshot accessors clone so
//! callers never hold the lock while doing slow work. Mode lifecycle
//! hooks are resolved under the lock but invoked outside it (see
//! [`crate::mode::Ctx::change_mode`]).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::watch;

use crate::mode::Mode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadStatus {
    Idle,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

impl PayloadStatus {
    pub fn label(self) -> &'static str {
        match self {
            PayloadStatus::Idle => "idle",
            PayloadStatus::Running => "running",
            PayloadStatus::Success => "success",
            PayloadStatus::Failed => "failed",
            PayloadStatus::Timeout => "timeout",
            PayloadStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Ok,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Ok => "ok",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Alert {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub level: AlertLevel,
}

impl Alert {
    pub fn time_str(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Descriptor of the in-flight payload. Exists only while one is running.
#[derive(Clone, Debug)]
pub struct PayloadInfo {
    pub name: String,
    pub command: String,
    pub start_time: Instant,
    pub pid: Option<u32>,
}

impl PayloadInfo {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

struct StateInner {
    running: bool,
    backlight_on: bool,
    render_needed: bool,
    last_activity: Instant,
    mode_index: usize,
    modes: Vec<Arc<dyn Mode>>,
    payload_status: PayloadStatus,
    payload: Option<PayloadInfo>,
    alerts: VecDeque<Alert>,
    alert_capacity: usize,
    pending_confirm: Option<(String, Instant)>,
    tools_on_target: bool,
    target_ssid: Option<String>,
    target_password: Option<String>,
}

pub struct AppState {
    inner: Mutex<StateInner>,
    status_tx: watch::Sender<PayloadStatus>,
}

impl AppState {
    pub fn new(alert_capacity: usize) -> Arc<Self> {
        let (status_tx, _) = watch::channel(PayloadStatus::Idle);
        Arc::new(Self {
            inner: Mutex::new(StateInner {
                running: true,
                backlight_on: true,
                render_needed: true,
                last_activity: Instant::now(),
                mode_index: 0,
                modes: Vec::new(),
                payload_status: PayloadStatus::Idle,
                payload: None,
                alerts: VecDeque::new(),
                alert_capacity: alert_capacity.max(1),
                pending_confirm: None,
                tools_on_target: false,
                target_ssid: None,
                target_password: None,
            }),
            status_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().expect("state lock")
    }

    // --- lifecycle ---------------------------------------------------

    pub fn running(&self) -> bool {
        self.lock().running
    }

    pub fn set_running(&self, value: bool) {
        self.lock().running = value;
    }

    // --- display flags -----------------------------------------------

    pub fn backlight_on(&self) -> bool {
        self.lock().backlight_on
    }

    pub fn set_backlight(&self, on: bool) {
        let mut inner = self.lock();
        inner.backlight_on = on;
        inner.render_needed = true;
    }

    /// Flip the backlight; returns the new state.
    pub fn toggle_backlight(&self) -> bool {
        let mut inner = self.lock();
        inner.backlight_on = !inner.backlight_on;
        inner.render_needed = true;
        inner.backlight_on
    }

    pub fn render_needed(&self) -> bool {
        self.lock().render_needed
    }

    pub fn set_render_needed(&self, value: bool) {
        self.lock().render_needed = value;
    }

    /// Check-and-clear the dirty bit. Mutations landing while a frame is
    /// being drawn re-set it and get picked up on the next tick.
    pub fn take_render_needed(&self) -> bool {
        let mut inner = self.lock();
        let needed = inner.render_needed;
        inner.render_needed = false;
        needed
    }

    pub fn last_activity(&self) -> Instant {
        self.lock().last_activity
    }

    pub fn reset_activity(&self) {
        self.lock().last_activity = Instant::now();
    }

    // --- mode registry -----------------------------------------------

    pub fn set_modes(&self, modes: Vec<Arc<dyn Mode>>) {
        let mut inner = self.lock();
        inner.modes = modes;
        inner.mode_index = 0;
        inner.render_needed = true;
    }

    pub fn mode_index(&self) -> usize {
        self.lock().mode_index
    }

    pub fn mode_count(&self) -> usize {
        self.lock().modes.len()
    }

    pub fn mode_names(&self) -> Vec<&'static str> {
        self.lock().modes.iter().map(|mode| mode.name()).collect()
    }

    pub fn current_mode(&self) -> Option<Arc<dyn Mode>> {
        let inner = self.lock();
        inner.modes.get(inner.mode_index).cloned()
    }

    /// Commit a relative mode change (wraparound) and hand back the old
    /// and new modes for lifecycle hooks. Callers invoke the hooks after
    /// this returns, outside the lock.
    pub fn resolve_mode_change(
        &self,
        delta: isize,
    ) -> (Option<Arc<dyn Mode>>, Option<Arc<dyn Mode>>) {
        let mut inner = self.lock();
        if inner.modes.is_empty() {
            return (None, None);
        }
        let len = inner.modes.len() as isize;
        let old = inner.modes.get(inner.mode_index).cloned();
        let next = (inner.mode_index as isize + delta).rem_euclid(len) as usize;
        inner.mode_index = next;
        let new = inner.modes.get(next).cloned();
        inner.render_needed = true;
        inner.last_activity = Instant::now();
        (old, new)
    }

    /// Commit an absolute switch by name (case-insensitive). `None` when
    /// no mode matches; `Some((None, None))` when the mode was already
    /// active (no hooks to run).
    #[allow(clippy::type_complexity)]
    pub fn resolve_mode_by_name(
        &self,
        name: &str,
    ) -> Option<(Option<Arc<dyn Mode>>, Option<Arc<dyn Mode>>)> {
        let mut inner = self.lock();
        let target = inner
            .modes
            .iter()
            .position(|mode| mode.name().eq_ignore_ascii_case(name))?;
        if inner.mode_index == target {
            return Some((None, None));
        }
        let old = inner.modes.get(inner.mode_index).cloned();
        inner.mode_index = target;
        let new = inner.modes.get(target).cloned();
        inner.render_needed = true;
        Some((old, new))
    }

    // --- alerts ------------------------------------------------------

    pub fn add_alert(&self, message: impl Into<String>, level: AlertLevel) {
        let message = message.into();
        {
            let mut inner = self.lock();
            if inner.alerts.len() >= inner.alert_capacity {
                inner.alerts.pop_front();
            }
            inner.alerts.push_back(Alert {
                timestamp: Local::now(),
                message: message.clone(),
                level,
            });
            inner.render_needed = true;
        }
        // Mirror to the log outside the lock; fire-and-forget.
        match level {
            AlertLevel::Info | AlertLevel::Ok => tracing::info!("{message}"),
            AlertLevel::Warning => tracing::warn!("{message}"),
            AlertLevel::Error | AlertLevel::Critical => tracing::error!("{message}"),
        }
    }

    /// Oldest-first snapshot, safe to iterate without the lock.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.iter().cloned().collect()
    }

    pub fn clear_alerts(&self) {
        let mut inner = self.lock();
        inner.alerts.clear();
        inner.render_needed = true;
    }

    // --- payload lifecycle -------------------------------------------

    pub fn is_payload_running(&self) -> bool {
        self.lock().payload_status == PayloadStatus::Running
    }

    pub fn payload_status(&self) -> PayloadStatus {
        self.lock().payload_status
    }

    /// Atomic single-flight guard: record the descriptor and flip to
    /// RUNNING, or refuse when a payload is already active. The check and
    /// the transition are one locked step so no caller can observe a torn
    /// state.
    pub fn begin_payload(&self, name: &str, command: &str) -> bool {
        let mut inner = self.lock();
        if inner.payload_status == PayloadStatus::Running {
            return false;
        }
        inner.payload = Some(PayloadInfo {
            name: name.to_string(),
            command: command.to_string(),
            start_time: Instant::now(),
            pid: None,
        });
        inner.payload_status = PayloadStatus::Running;
        inner.render_needed = true;
        // published under the lock so the watch side can never lag the
        // mutex-guarded status
        self.status_tx.send_replace(PayloadStatus::Running);
        true
    }

    pub fn set_payload_pid(&self, pid: u32) {
        if let Some(payload) = self.lock().payload.as_mut() {
            payload.pid = Some(pid);
        }
    }

    /// Record the terminal status, drop the descriptor, and wake waiters.
    pub fn end_payload(&self, status: PayloadStatus) {
        let mut inner = self.lock();
        inner.payload = None;
        inner.payload_status = status;
        inner.render_needed = true;
        self.status_tx.send_replace(status);
    }

    pub fn current_payload(&self) -> Option<PayloadInfo> {
        self.lock().payload.clone()
    }

    /// Watch channel signalled exactly on status transitions; replaces
    /// fixed-interval polling for payload completion.
    pub fn subscribe_payload(&self) -> watch::Receiver<PayloadStatus> {
        self.status_tx.subscribe()
    }

    /// Resolve once no payload is running.
    pub async fn wait_payload_idle(&self) {
        let mut rx = self.subscribe_payload();
        loop {
            if *rx.borrow_and_update() != PayloadStatus::Running {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // --- confirmation handshake --------------------------------------

    /// Two-phase destructive-action guard. First call arms a ticket and
    /// returns false; a matching call before the window expires clears it
    /// and returns true; anything else re-arms.
    pub fn request_confirm(&self, action: &str, window: Duration) -> bool {
        let mut inner = self.lock();
        let now = Instant::now();
        if let Some((pending, expires)) = &inner.pending_confirm {
            if pending == action && now < *expires {
                inner.pending_confirm = None;
                return true;
            }
        }
        inner.pending_confirm = Some((action.to_string(), now + window));
        false
    }

    pub fn cancel_confirm(&self) {
        self.lock().pending_confirm = None;
    }

    pub fn pending_confirm(&self) -> Option<String> {
        self.lock()
            .pending_confirm
            .as_ref()
            .map(|(action, _)| action.clone())
    }

    // --- target network routing --------------------------------------

    pub fn tools_on_target(&self) -> bool {
        self.lock().tools_on_target
    }

    pub fn set_tools_on_target(&self, value: bool) {
        let mut inner = self.lock();
        inner.tools_on_target = value;
        inner.render_needed = true;
    }

    pub fn target_network(&self) -> Option<(String, String)> {
        let inner = self.lock();
        match (&inner.target_ssid, &inner.target_password) {
            (Some(ssid), Some(password)) => Some((ssid.clone(), password.clone())),
            _ => None,
        }
    }

    pub fn set_target_network(&self, ssid: Option<String>, password: Option<String>) {
        let mut inner = self.lock();
        inner.target_ssid = ssid;
        inner.target_password = password;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::mode::{Ctx, Mode};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubMode {
        name: &'static str,
        entered: AtomicBool,
        exited: AtomicBool,
    }

    impl StubMode {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                entered: AtomicBool::new(false),
                exited: AtomicBool::new(false),
            })
        }
    }

    impl Mode for StubMode {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_enter(&self, _ctx: &Ctx) -> anyhow::Result<()> {
            self.entered.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn on_exit(&self, _ctx: &Ctx) -> anyhow::Result<()> {
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn render(&self, _ctx: &Ctx, _canvas: &mut Canvas) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn initial_state() {
        let state = AppState::new(50);
        assert!(state.running());
        assert!(state.backlight_on());
        assert!(state.render_needed());
        assert_eq!(state.mode_index(), 0);
        assert_eq!(state.payload_status(), PayloadStatus::Idle);
        assert!(state.alerts().is_empty());
    }

    #[test]
    fn backlight_toggle_marks_render() {
        let state = AppState::new(50);
        state.set_render_needed(false);
        assert!(!state.toggle_backlight());
        assert!(!state.backlight_on());
        assert!(state.render_needed());

        state.set_render_needed(false);
        assert!(state.toggle_backlight());
        assert!(state.render_needed());
    }

    #[test]
    fn take_render_needed_clears_the_bit() {
        let state = AppState::new(50);
        assert!(state.take_render_needed());
        assert!(!state.take_render_needed());
        state.add_alert("dirty again", AlertLevel::Info);
        assert!(state.take_render_needed());
    }

    #[test]
    fn alerts_append_and_clear() {
        let state = AppState::new(50);
        state.add_alert("first", AlertLevel::Info);
        state.add_alert("second", AlertLevel::Warning);
        state.add_alert("third", AlertLevel::Ok);

        let alerts = state.alerts();
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].message, "first");
        assert_eq!(alerts[1].level, AlertLevel::Warning);
        assert_eq!(alerts[2].message, "third");

        state.clear_alerts();
        assert!(state.alerts().is_empty());
        assert_eq!(state.alerts().len(), 0);
    }

    #[test]
    fn alert_buffer_is_bounded_oldest_first_out() {
        let state = AppState::new(50);
        for i in 0..60 {
            state.add_alert(format!("Alert {i}"), AlertLevel::Info);
        }
        let alerts = state.alerts();
        assert_eq!(alerts.len(), 50);
        assert_eq!(alerts.first().expect("first").message, "Alert 10");
        assert_eq!(alerts.last().expect("last").message, "Alert 59");
    }

    #[test]
    fn payload_begin_is_single_flight() {
        let state = AppState::new(50);
        assert!(!state.is_payload_running());

        assert!(state.begin_payload("Scan", "echo hello"));
        assert!(state.is_payload_running());
        assert_eq!(state.payload_status(), PayloadStatus::Running);
        assert_eq!(state.current_payload().expect("descriptor").name, "Scan");

        // second begin while running is refused, descriptor untouched
        assert!(!state.begin_payload("Other", "true"));
        assert_eq!(state.current_payload().expect("descriptor").name, "Scan");

        state.end_payload(PayloadStatus::Success);
        assert!(!state.is_payload_running());
        assert_eq!(state.payload_status(), PayloadStatus::Success);
        assert!(state.current_payload().is_none());

        // a new run may start after the terminal transition
        assert!(state.begin_payload("Next", "true"));
    }

    #[test]
    fn payload_pid_is_recorded_on_the_descriptor() {
        let state = AppState::new(50);
        assert!(state.begin_payload("Scan", "sleep 1"));
        state.set_payload_pid(4242);
        assert_eq!(state.current_payload().expect("descriptor").pid, Some(4242));
    }

    #[tokio::test]
    async fn watch_channel_signals_terminal_transition() {
        let state = AppState::new(50);
        let mut rx = state.subscribe_payload();
        assert!(state.begin_payload("Scan", "true"));
        rx.changed().await.expect("running");
        assert_eq!(*rx.borrow_and_update(), PayloadStatus::Running);

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_payload_idle().await })
        };
        state.end_payload(PayloadStatus::Timeout);
        waiter.await.expect("waiter");
        assert_eq!(state.payload_status(), PayloadStatus::Timeout);
    }

    #[test]
    fn confirm_handshake_arm_confirm_expire() {
        let state = AppState::new(50);
        assert!(!state.request_confirm("reboot", Duration::from_secs(1)));
        assert!(state.request_confirm("reboot", Duration::from_secs(1)));

        // expired window re-arms
        assert!(!state.request_confirm("reboot", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!state.request_confirm("reboot", Duration::from_secs(1)));

        // mismatched action resets to first-press semantics
        assert!(!state.request_confirm("shutdown", Duration::from_secs(1)));
        assert!(!state.request_confirm("reboot", Duration::from_secs(1)));
        assert!(state.request_confirm("reboot", Duration::from_secs(1)));

        state.request_confirm("reboot", Duration::from_secs(1));
        state.cancel_confirm();
        assert!(!state.request_confirm("reboot", Duration::from_secs(1)));
    }

    #[test]
    fn mode_change_wraps_and_fires_hooks() {
        let state = AppState::new(50);
        let a = StubMode::new("ALPHA");
        let b = StubMode::new("BRAVO");
        let c = StubMode::new("CHARLIE");
        state.set_modes(vec![a.clone(), b.clone(), c.clone()]);

        let (old, new) = state.resolve_mode_change(1);
        assert_eq!(state.mode_index(), 1);
        assert_eq!(old.expect("old").name(), "ALPHA");
        assert_eq!(new.expect("new").name(), "BRAVO");

        state.resolve_mode_change(-1);
        assert_eq!(state.mode_index(), 0);

        // advancing by the registry length returns to the start
        state.resolve_mode_change(3);
        assert_eq!(state.mode_index(), 0);

        // negative wraparound
        state.resolve_mode_change(-1);
        assert_eq!(state.mode_index(), 2);
    }

    #[test]
    fn mode_by_name_is_case_insensitive() {
        let state = AppState::new(50);
        state.set_modes(vec![StubMode::new("ALPHA"), StubMode::new("BRAVO")]);

        let hooks = state.resolve_mode_by_name("bravo").expect("found");
        assert_eq!(state.mode_index(), 1);
        assert!(hooks.0.is_some() && hooks.1.is_some());

        // already active: found, but no hooks
        let hooks = state.resolve_mode_by_name("BRAVO").expect("found");
        assert!(hooks.0.is_none() && hooks.1.is_none());

        assert!(state.resolve_mode_by_name("missing").is_none());
        assert_eq!(state.mode_index(), 1);
    }

    #[test]
    fn empty_registry_resolves_to_nothing() {
        let state = AppState::new(50);
        let (old, new) = state.resolve_mode_change(1);
        assert!(old.is_none() && new.is_none());
        assert_eq!(state.mode_index(), 0);
    }

    #[test]
    fn activity_timestamp_moves_forward() {
        let state = AppState::new(50);
        let before = state.last_activity();
        std::thread::sleep(Duration::from_millis(5));
        state.reset_activity();
        assert!(state.last_activity() > before);
    }

    #[test]
    fn target_network_requires_both_halves() {
        let state = AppState::new(50);
        assert!(state.target_network().is_none());
        state.set_target_network(Some("corp".into()), None);
        assert!(state.target_network().is_none());
        state.set_target_network(Some("corp".into()), Some("hunter2".into()));
        assert_eq!(
            state.target_network(),
            Some(("corp".to_string(), "hunter2".to_string()))
        );
    }
}

//! Background payload execution.
//!
//! One payload at a time, process-group-wide: the runner refuses to start
//! while another run is active, launches the command in its own process
//! group so the whole subtree dies on one signal, enforces a timeout, and
//! keeps [`AppState`] authoritative about the outcome.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::state::{AlertLevel, AppState, PayloadStatus};
use crate::util::truncate;

/// External tool binaries the best-effort sweep terminates by name,
/// whether or not this runner started them.
pub const KNOWN_TOOLS: &[&str] = &[
    "nmap",
    "responder",
    "arpspoof",
    "dnsspoof",
    "sslstrip",
    "tcpdump",
    "airodump-ng",
    "aireplay-ng",
    "airmon-ng",
    "bettercap",
    "tshark",
    "msfconsole",
];

const STDERR_SNIPPET_CHARS: usize = 50;
const DRAIN_CAP_BYTES: usize = 8 * 1024;
const SWEEP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct PayloadRequest {
    pub name: String,
    pub command: String,
    pub timeout: Duration,
}

impl PayloadRequest {
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
        }
    }
}

type CompleteFn = Box<dyn FnOnce() + Send + 'static>;

/// Resolves with the run's terminal status.
pub struct PayloadHandle {
    rx: oneshot::Receiver<PayloadStatus>,
}

impl PayloadHandle {
    pub async fn wait(self) -> PayloadStatus {
        self.rx.await.unwrap_or(PayloadStatus::Failed)
    }
}

pub struct PayloadRunner {
    state: Arc<AppState>,
    current: Mutex<Option<CancellationToken>>,
}

impl PayloadRunner {
    pub fn new(state: Arc<AppState>) -> Arc<Self> {
        Arc::new(Self {
            state,
            current: Mutex::new(None),
        })
    }

    /// Start a payload in the background. Returns `None` (after a WARNING
    /// alert) when a payload is already running.
    pub fn run(self: &Arc<Self>, request: PayloadRequest) -> Option<PayloadHandle> {
        self.start(request, None)
    }

    /// Like [`run`](Self::run), with a continuation invoked on every
    /// terminal branch after the tracked handle is released.
    pub fn run_then(
        self: &Arc<Self>,
        request: PayloadRequest,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Option<PayloadHandle> {
        self.start(request, Some(Box::new(on_complete)))
    }

    fn start(
        self: &Arc<Self>,
        request: PayloadRequest,
        on_complete: Option<CompleteFn>,
    ) -> Option<PayloadHandle> {
        if !self.state.begin_payload(&request.name, &request.command) {
            self.state
                .add_alert("Payload already running", AlertLevel::Warning);
            return None;
        }

        let token = CancellationToken::new();
        *self.current.lock().expect("runner lock") = Some(token.clone());
        self.state
            .add_alert(format!("Starting: {}", request.name), AlertLevel::Info);

        let (done_tx, done_rx) = oneshot::channel();
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let status = runner.execute(&request, &token).await;
            // Release the tracked handle before the terminal transition so
            // a follow-up run can never race a stale token.
            *runner.current.lock().expect("runner lock") = None;
            runner.state.end_payload(status);
            if let Some(hook) = on_complete {
                if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                    tracing::error!(payload = %request.name, "completion hook panicked");
                }
            }
            let _ = done_tx.send(status);
        });
        Some(PayloadHandle { rx: done_rx })
    }

    /// Cancel the running payload. Idempotent; no-op when idle. The worker
    /// observes the token immediately and kills the process group.
    pub fn cancel(&self) {
        if !self.state.is_payload_running() {
            return;
        }
        let token = self.current.lock().expect("runner lock").clone();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Best-effort kill-by-name sweep over [`KNOWN_TOOLS`], covering tools
    /// started outside this runner. Individual failures are swallowed;
    /// completion is reported with one OK alert.
    pub fn kill_all_tools(self: &Arc<Self>) {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            for tool in KNOWN_TOOLS {
                let mut sweep = Command::new("sudo");
                sweep
                    .args(["pkill", "-9", tool])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
                let _ = tokio::time::timeout(SWEEP_TIMEOUT, sweep.status()).await;
            }
            runner.state.add_alert("All tools killed", AlertLevel::Ok);
        });
    }

    async fn execute(&self, request: &PayloadRequest, cancel: &CancellationToken) -> PayloadStatus {
        match self.supervise(request, cancel).await {
            Ok(status) => status,
            Err(err) => {
                self.state.add_alert(
                    format!("Error: {}", truncate(&err.to_string(), 40)),
                    AlertLevel::Error,
                );
                PayloadStatus::Failed
            }
        }
    }

    async fn supervise(
        &self,
        request: &PayloadRequest,
        cancel: &CancellationToken,
    ) -> Result<PayloadStatus> {
        let mut cmd = Command::new("/bin/bash");
        cmd.arg("-c").arg(&request.command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        apply_process_group(&mut cmd);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", request.name))?;
        if let Some(pid) = child.id() {
            self.state.set_payload_pid(pid);
        }

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;
        let stdout_task = tokio::spawn(drain_capped(stdout));
        let stderr_task = tokio::spawn(drain_capped(stderr));

        let mut timed_out = false;
        let exit = tokio::select! {
            status = child.wait() => Some(status.context("wait on child")?),
            _ = cancel.cancelled() => {
                kill_group(&mut child).await;
                child.wait().await.ok()
            }
            _ = tokio::time::sleep(request.timeout) => {
                timed_out = true;
                kill_group(&mut child).await;
                child.wait().await.ok()
            }
        };

        let _ = stdout_task.await;
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let exit_code = exit.and_then(|status| status.code());
        let status = classify(cancel.is_cancelled(), timed_out, exit_code);
        self.report(request, status, &stderr_bytes);
        Ok(status)
    }

    fn report(&self, request: &PayloadRequest, status: PayloadStatus, stderr: &[u8]) {
        match status {
            PayloadStatus::Success => self.state.add_alert(
                format!("✓ {} complete", request.name),
                AlertLevel::Ok,
            ),
            PayloadStatus::Failed => {
                let raw = String::from_utf8_lossy(stderr);
                let snippet = raw.trim();
                let snippet = if snippet.is_empty() {
                    "Unknown error".to_string()
                } else {
                    truncate(snippet, STDERR_SNIPPET_CHARS)
                };
                self.state.add_alert(
                    format!("✗ {}: {snippet}", request.name),
                    AlertLevel::Error,
                );
            }
            PayloadStatus::Timeout => self.state.add_alert(
                format!("⏱ {} timeout ({}s)", request.name, request.timeout.as_secs()),
                AlertLevel::Warning,
            ),
            PayloadStatus::Cancelled => self.state.add_alert(
                format!("Cancelled: {}", request.name),
                AlertLevel::Warning,
            ),
            PayloadStatus::Idle | PayloadStatus::Running => {}
        }
    }
}

/// Cancellation beats everything, timeout beats exit-code interpretation.
/// A child killed by an unrelated signal reports no code and maps to
/// failure.
fn classify(cancelled: bool, timed_out: bool, exit_code: Option<i32>) -> PayloadStatus {
    if cancelled {
        PayloadStatus::Cancelled
    } else if timed_out {
        PayloadStatus::Timeout
    } else {
        match exit_code {
            Some(0) => PayloadStatus::Success,
            _ => PayloadStatus::Failed,
        }
    }
}

#[cfg(unix)]
fn apply_process_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
async fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
async fn kill_group(child: &mut Child) {
    let _ = child.kill().await;
}

/// Drain a captured stream to EOF, keeping at most the first
/// [`DRAIN_CAP_BYTES`] so a chatty tool cannot balloon memory.
async fn drain_capped<R: AsyncRead + Unpin>(mut stream: R) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < DRAIN_CAP_BYTES {
                    let take = (DRAIN_CAP_BYTES - captured.len()).min(n);
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fixture() -> (Arc<AppState>, Arc<PayloadRunner>) {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        (state, runner)
    }

    fn alerts_at(state: &AppState, level: AlertLevel) -> Vec<String> {
        state
            .alerts()
            .into_iter()
            .filter(|alert| alert.level == level)
            .map(|alert| alert.message)
            .collect()
    }

    #[test]
    fn classify_orders_the_terminal_branches() {
        // cancellation wins even over a clean exit that landed first
        assert_eq!(classify(true, false, Some(0)), PayloadStatus::Cancelled);
        assert_eq!(classify(true, true, Some(1)), PayloadStatus::Cancelled);
        assert_eq!(classify(false, true, Some(0)), PayloadStatus::Timeout);
        assert_eq!(classify(false, false, Some(0)), PayloadStatus::Success);
        assert_eq!(classify(false, false, Some(3)), PayloadStatus::Failed);
        // killed by a stray signal: no exit code
        assert_eq!(classify(false, false, None), PayloadStatus::Failed);
    }

    #[tokio::test]
    async fn instant_success_records_ok_alert() {
        let (state, runner) = fixture();
        let handle = runner
            .run(PayloadRequest::new("Truth", "true", Duration::from_secs(5)))
            .expect("started");
        assert_eq!(handle.wait().await, PayloadStatus::Success);
        assert!(!state.is_payload_running());
        assert_eq!(state.payload_status(), PayloadStatus::Success);
        assert!(alerts_at(&state, AlertLevel::Ok)
            .iter()
            .any(|msg| msg.contains("Truth")));
    }

    #[tokio::test]
    async fn nonzero_exit_records_error_alert_with_stderr() {
        let (state, runner) = fixture();
        let handle = runner
            .run(PayloadRequest::new(
                "Lies",
                "echo boom >&2; exit 3",
                Duration::from_secs(5),
            ))
            .expect("started");
        assert_eq!(handle.wait().await, PayloadStatus::Failed);
        assert_eq!(state.payload_status(), PayloadStatus::Failed);
        let errors = alerts_at(&state, AlertLevel::Error);
        assert!(errors.iter().any(|msg| msg.contains("boom")));
    }

    #[tokio::test]
    async fn plain_false_maps_to_failed() {
        let (state, runner) = fixture();
        let handle = runner
            .run(PayloadRequest::new("False", "false", Duration::from_secs(5)))
            .expect("started");
        assert_eq!(handle.wait().await, PayloadStatus::Failed);
        assert!(alerts_at(&state, AlertLevel::Error)
            .iter()
            .any(|msg| msg.contains("Unknown error")));
    }

    #[tokio::test]
    async fn timeout_kills_the_process_group() {
        let (state, runner) = fixture();
        let handle = runner
            .run(PayloadRequest::new(
                "Sleeper",
                "sleep 10",
                Duration::from_millis(300),
            ))
            .expect("started");

        // grab the pid once the worker has spawned the child
        let mut pid = None;
        for _ in 0..50 {
            pid = state.current_payload().and_then(|payload| payload.pid);
            if pid.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pid = pid.expect("pid");

        assert_eq!(handle.wait().await, PayloadStatus::Timeout);
        assert!(!state.is_payload_running());
        assert!(alerts_at(&state, AlertLevel::Warning)
            .iter()
            .any(|msg| msg.contains("timeout")));

        // the child has been reaped; signalling it must fail
        let alive = unsafe { libc::kill(pid as i32, 0) } == 0;
        assert!(!alive, "timed-out payload still alive");
    }

    #[tokio::test]
    async fn cancel_records_cancelled_even_near_natural_exit() {
        let (state, runner) = fixture();
        let handle = runner
            .run(PayloadRequest::new(
                "Capture",
                "sleep 5",
                Duration::from_secs(30),
            ))
            .expect("started");
        // let the process come up
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.cancel();
        runner.cancel(); // idempotent
        assert_eq!(handle.wait().await, PayloadStatus::Cancelled);
        assert_eq!(state.payload_status(), PayloadStatus::Cancelled);
        assert!(alerts_at(&state, AlertLevel::Warning)
            .iter()
            .any(|msg| msg.starts_with("Cancelled")));
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_noop() {
        let (state, runner) = fixture();
        runner.cancel();
        assert_eq!(state.payload_status(), PayloadStatus::Idle);
        assert!(state.alerts().is_empty());
    }

    #[tokio::test]
    async fn second_run_is_refused_with_one_warning() {
        let (state, runner) = fixture();
        let first = runner
            .run(PayloadRequest::new(
                "Long",
                "sleep 5",
                Duration::from_secs(30),
            ))
            .expect("started");

        assert!(runner
            .run(PayloadRequest::new("Second", "true", Duration::from_secs(5)))
            .is_none());

        let warnings = alerts_at(&state, AlertLevel::Warning);
        assert_eq!(
            warnings
                .iter()
                .filter(|msg| msg.contains("already running"))
                .count(),
            1
        );
        // the refused run never replaced the descriptor
        assert_eq!(state.current_payload().expect("descriptor").name, "Long");

        runner.cancel();
        assert_eq!(first.wait().await, PayloadStatus::Cancelled);
    }

    #[tokio::test]
    async fn completion_hook_runs_after_handle_release() {
        let (state, runner) = fixture();
        let fired = Arc::new(AtomicBool::new(false));
        let observed_idle = Arc::new(AtomicBool::new(false));
        let handle = {
            let fired = Arc::clone(&fired);
            let observed_idle = Arc::clone(&observed_idle);
            let state = Arc::clone(&state);
            runner
                .run_then(
                    PayloadRequest::new("Quick", "true", Duration::from_secs(5)),
                    move || {
                        observed_idle.store(!state.is_payload_running(), Ordering::SeqCst);
                        fired.store(true, Ordering::SeqCst);
                    },
                )
                .expect("started")
        };
        handle.wait().await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(observed_idle.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_hook_does_not_poison_the_runner() {
        let (state, runner) = fixture();
        let handle = runner
            .run_then(
                PayloadRequest::new("Quick", "true", Duration::from_secs(5)),
                || panic!("broken callback"),
            )
            .expect("started");
        assert_eq!(handle.wait().await, PayloadStatus::Success);

        // the runner keeps working after the hook blew up
        let handle = runner
            .run(PayloadRequest::new("Again", "true", Duration::from_secs(5)))
            .expect("restarted");
        assert_eq!(handle.wait().await, PayloadStatus::Success);
        assert_eq!(state.payload_status(), PayloadStatus::Success);
    }

    #[tokio::test]
    async fn spawn_failure_maps_to_failed() {
        let (state, runner) = fixture();
        // bash reports the missing binary on stderr and exits nonzero
        let handle = runner
            .run(PayloadRequest::new(
                "Ghost",
                "/nonexistent/binary-opsdeck-test",
                Duration::from_secs(5),
            ))
            .expect("started");
        assert_eq!(handle.wait().await, PayloadStatus::Failed);
        assert!(!state.is_payload_running());
    }

    #[tokio::test]
    async fn status_is_terminal_after_every_branch() {
        let (_state, runner) = fixture();
        for command in ["true", "false", "sleep 10"] {
            let timeout = if command.starts_with("sleep") {
                Duration::from_millis(200)
            } else {
                Duration::from_secs(5)
            };
            let handle = runner
                .run(PayloadRequest::new("Case", command, timeout))
                .expect("started");
            let status = handle.wait().await;
            assert!(
                matches!(
                    status,
                    PayloadStatus::Success
                        | PayloadStatus::Failed
                        | PayloadStatus::Timeout
                        | PayloadStatus::Cancelled
                ),
                "non-terminal status {status:?} for {command}"
            );
        }
    }
}

//! opsdeck-panel: the interactive appliance front end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use opsdeck_console::dispatch::handle_button;
use opsdeck_console::display::{DisplaySink, InputEvent};
use opsdeck_console::logging::init_tracing;
use opsdeck_console::modes::all_modes;
use opsdeck_console::term::TermDisplay;
use opsdeck_core::{loot, AlertLevel, AppState, Canvas, Ctx, PayloadRunner, Settings};

#[derive(Parser, Debug)]
#[command(name = "opsdeck-panel", about = "Portable security-testing console")]
struct Args {
    /// Settings file (TOML); defaults apply when absent.
    #[arg(long, default_value = "opsdeck.toml")]
    config: PathBuf,

    /// Mirror the log to stderr as well as the log file.
    #[arg(long)]
    log_to_stderr: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Arc::new(
        Settings::load(&args.config)
            .with_context(|| format!("load settings {}", args.config.display()))?,
    );

    let _log_guard = init_tracing(&settings.log_dir(), args.log_to_stderr)
        .context("logging init failed")?;
    loot::create_loot_dirs(&settings).context("create loot directories")?;

    let state = AppState::new(settings.ui.alert_capacity);
    let runner = PayloadRunner::new(Arc::clone(&state));
    let ctx = Ctx::new(Arc::clone(&state), runner, Arc::clone(&settings));

    let modes = all_modes(&settings);
    tracing::info!(count = modes.len(), "modes registered");
    state.set_modes(modes);
    if let Some(first) = state.current_mode() {
        if let Err(err) = first.on_enter(&ctx) {
            tracing::error!(%err, "initial mode enter failed");
        }
    }

    // Shutdown signals fold into the running flag the UI loop watches.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("sigterm handler");
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            state.set_running(false);
        });
    }

    // The display backend failing to come up is the one fatal error.
    let mut display = TermDisplay::new().context("display init failed")?;

    state.add_alert("opsdeck ready", AlertLevel::Ok);

    let result = run_ui(&ctx, &mut display).await;
    let _ = display.restore();
    shutdown(&ctx).await;
    result
}

async fn run_ui(ctx: &Ctx, display: &mut TermDisplay) -> anyhow::Result<()> {
    let mut last_forced_render = Instant::now();

    while ctx.state.running() {
        // backlight timeout from the last operator touch
        if ctx.state.backlight_on()
            && ctx.state.last_activity().elapsed() > ctx.settings.backlight_timeout()
        {
            ctx.state.set_backlight(false);
        }

        if ctx.state.take_render_needed() {
            if let Err(err) = render_frame(ctx, display) {
                tracing::error!(%err, "render failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        let tick = ctx
            .settings
            .render_interval(ctx.state.is_payload_running());
        match display.poll_event(tick) {
            Ok(Some(InputEvent::Button(button))) => handle_button(ctx, button),
            Ok(Some(InputEvent::Quit)) => break,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(%err, "input poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        // periodic re-render keeps live data (gauges, elapsed time) fresh
        if last_forced_render.elapsed() >= tick {
            ctx.state.set_render_needed(true);
            last_forced_render = Instant::now();
        }
    }
    Ok(())
}

fn render_frame(ctx: &Ctx, display: &mut TermDisplay) -> anyhow::Result<()> {
    display.set_backlight(ctx.state.backlight_on())?;
    let Some(mode) = ctx.state.current_mode() else {
        return Ok(());
    };
    let mut canvas = Canvas::new();
    mode.render(ctx, &mut canvas)?;
    display.show(&canvas.finish())
}

/// Cancel any running payload, give it a short grace period, then leave.
async fn shutdown(ctx: &Ctx) {
    tracing::info!("shutting down");
    ctx.state.set_running(false);
    if ctx.state.is_payload_running() {
        ctx.runner.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), ctx.state.wait_payload_idle()).await;
    }
}

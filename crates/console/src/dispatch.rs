//! Global button dispatcher: the single funnel between any input source
//! and the active mode. A failing handler degrades to one alert; the
//! input loop never dies with it.

use opsdeck_core::util::truncate;
use opsdeck_core::{AlertLevel, Ctx};

use crate::display::Button;

pub fn handle_button(ctx: &Ctx, button: Button) {
    if !ctx.state.running() {
        return;
    }
    ctx.state.set_render_needed(true);

    // A press on a dark display only wakes it.
    if !ctx.state.backlight_on() {
        ctx.state.set_backlight(true);
        ctx.state.reset_activity();
        return;
    }
    ctx.state.reset_activity();

    let Some(mode) = ctx.state.current_mode() else {
        return;
    };

    // Global KEY3: cancel a running payload before the mode sees the key.
    if button == Button::Key3 && ctx.state.is_payload_running() {
        ctx.runner.cancel();
        return;
    }

    let result = match button {
        Button::Up => mode.on_up(ctx),
        Button::Down => mode.on_down(ctx),
        Button::Left => mode.on_left(ctx),
        Button::Right => mode.on_right(ctx),
        Button::Press => mode.on_press(ctx),
        Button::Key1 => mode.on_key1(ctx),
        Button::Key2 => mode.on_key2(ctx),
        Button::Key3 => mode.on_key3(ctx),
    };
    if let Err(err) = result {
        tracing::error!(?button, mode = mode.name(), %err, "button handler failed");
        ctx.state.add_alert(
            format!("Error: {}", truncate(&err.to_string(), 30)),
            AlertLevel::Error,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use opsdeck_core::{AppState, Canvas, Mode, PayloadRequest, PayloadRunner, Settings};

    struct ProbeMode {
        key3_hits: AtomicUsize,
    }

    impl Mode for ProbeMode {
        fn name(&self) -> &'static str {
            "PROBE"
        }

        fn on_key3(&self, _ctx: &Ctx) -> anyhow::Result<()> {
            self.key3_hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_press(&self, _ctx: &Ctx) -> anyhow::Result<()> {
            anyhow::bail!("handler exploded")
        }

        fn render(&self, _ctx: &Ctx, _canvas: &mut Canvas) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fixture() -> (Ctx, Arc<ProbeMode>) {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        let mode = Arc::new(ProbeMode {
            key3_hits: AtomicUsize::new(0),
        });
        state.set_modes(vec![mode.clone()]);
        let ctx = Ctx::new(state, runner, Arc::new(Settings::default()));
        (ctx, mode)
    }

    #[tokio::test]
    async fn handler_error_becomes_one_alert_and_loop_survives() {
        let (ctx, _mode) = fixture();
        handle_button(&ctx, Button::Press);
        let alerts = ctx.state.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Error);
        assert!(alerts[0].message.contains("handler exploded"));

        // dispatch keeps working after the failure
        handle_button(&ctx, Button::Key3);
        assert_eq!(ctx.state.alerts().len(), 1);
    }

    #[tokio::test]
    async fn key3_cancels_running_payload_instead_of_routing() {
        let (ctx, mode) = fixture();
        let handle = ctx
            .runner
            .run(PayloadRequest::new(
                "Long",
                "sleep 5",
                Duration::from_secs(30),
            ))
            .expect("started");

        handle_button(&ctx, Button::Key3);
        assert_eq!(mode.key3_hits.load(Ordering::SeqCst), 0);
        assert_eq!(
            handle.wait().await,
            opsdeck_core::PayloadStatus::Cancelled
        );

        // idle again: KEY3 reaches the mode
        handle_button(&ctx, Button::Key3);
        assert_eq!(mode.key3_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dark_display_swallows_the_waking_press() {
        let (ctx, mode) = fixture();
        ctx.state.set_backlight(false);
        handle_button(&ctx, Button::Key3);
        assert!(ctx.state.backlight_on());
        assert_eq!(mode.key3_hits.load(Ordering::SeqCst), 0);

        handle_button(&ctx, Button::Key3);
        assert_eq!(mode.key3_hits.load(Ordering::SeqCst), 1);
    }
}

//! Alert history screen with level colours and scrollback.

use std::sync::Mutex;

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{Ctx, Mode};
use opsdeck_core::util::truncate;
use opsdeck_core::AlertLevel;

const VISIBLE_ALERTS: usize = 8;

fn level_tone(level: AlertLevel) -> Tone {
    match level {
        AlertLevel::Info => Tone::Info,
        AlertLevel::Ok => Tone::Ok,
        AlertLevel::Warning => Tone::Warning,
        AlertLevel::Error | AlertLevel::Critical => Tone::Error,
    }
}

pub struct AlertsMode {
    scroll: Mutex<usize>,
}

impl AlertsMode {
    pub fn new(_settings: &opsdeck_core::Settings) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            scroll: Mutex::new(0),
        })
    }

    fn scroll_to_end(&self, total: usize) {
        *self.scroll.lock().expect("scroll lock") = total.saturating_sub(VISIBLE_ALERTS);
    }
}

impl Mode for AlertsMode {
    fn name(&self) -> &'static str {
        "ALERTS"
    }

    fn icon(&self) -> &'static str {
        "⚠"
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        self.scroll_to_end(ctx.state.alerts().len());
        Ok(())
    }

    fn on_up(&self, ctx: &Ctx) -> Result<()> {
        let mut scroll = self.scroll.lock().expect("scroll lock");
        if *scroll > 0 {
            *scroll -= 1;
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_down(&self, ctx: &Ctx) -> Result<()> {
        let total = ctx.state.alerts().len();
        let mut scroll = self.scroll.lock().expect("scroll lock");
        if *scroll < total.saturating_sub(VISIBLE_ALERTS) {
            *scroll += 1;
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    /// Jump back to the newest entries.
    fn on_press(&self, ctx: &Ctx) -> Result<()> {
        self.scroll_to_end(ctx.state.alerts().len());
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        ctx.state.clear_alerts();
        *self.scroll.lock().expect("scroll lock") = 0;
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        let alerts = ctx.state.alerts();
        let total = alerts.len();
        canvas.title(format!("ALERTS ({total})"));

        if alerts.is_empty() {
            canvas.blank();
            canvas.text(Tone::Dim, "No alerts");
            return Ok(());
        }

        let scroll = (*self.scroll.lock().expect("scroll lock")).min(total.saturating_sub(1));
        let end = (scroll + VISIBLE_ALERTS).min(total);
        for alert in &alerts[scroll..end] {
            canvas.text(Tone::Dim, alert.time_str());
            canvas.text(level_tone(alert.level), truncate(&alert.message, 22));
        }
        if total > VISIBLE_ALERTS {
            canvas.text(Tone::Dim, format!("{}-{end}/{total}", scroll + 1));
        }
        canvas.footer("↑↓:Scroll K3:Clear ●:Latest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{AppState, PayloadRunner, Settings};
    use std::sync::Arc;

    fn ctx() -> Ctx {
        let state = AppState::new(50);
        let runner = PayloadRunner::new(Arc::clone(&state));
        Ctx::new(state, runner, Arc::new(Settings::default()))
    }

    #[test]
    fn enter_scrolls_to_latest() {
        let ctx = ctx();
        for i in 0..20 {
            ctx.state
                .add_alert(format!("Alert {i}"), AlertLevel::Info);
        }
        let mode = AlertsMode::new(&ctx.settings);
        mode.on_enter(&ctx).expect("enter");
        assert_eq!(*mode.scroll.lock().expect("scroll lock"), 12);

        // scroll bounds hold at both ends
        for _ in 0..40 {
            mode.on_up(&ctx).expect("up");
        }
        assert_eq!(*mode.scroll.lock().expect("scroll lock"), 0);
        for _ in 0..40 {
            mode.on_down(&ctx).expect("down");
        }
        assert_eq!(*mode.scroll.lock().expect("scroll lock"), 12);
    }

    #[test]
    fn key3_clears_history() {
        let ctx = ctx();
        ctx.state.add_alert("one", AlertLevel::Info);
        ctx.state.add_alert("two", AlertLevel::Error);
        let mode = AlertsMode::new(&ctx.settings);
        mode.on_key3(&ctx).expect("clear");
        assert!(ctx.state.alerts().is_empty());
        assert_eq!(*mode.scroll.lock().expect("scroll lock"), 0);
    }

    #[test]
    fn levels_map_to_tones() {
        assert_eq!(level_tone(AlertLevel::Ok), Tone::Ok);
        assert_eq!(level_tone(AlertLevel::Critical), Tone::Error);
    }
}

//! Operational mode abstraction: a mode is a self-contained screen with
//! its own menu and button handlers, registered once at startup and
//! switched through [`Ctx::change_mode`].

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::canvas::{Canvas, Tone};
use crate::payload::PayloadRunner;
use crate::settings::Settings;
use crate::state::{AlertLevel, AppState};
use crate::util::truncate;

pub type ActionFn = dyn Fn(&Ctx) -> Result<()> + Send + Sync;

/// A single menu row: stable label/icon plus an optional invokable action.
pub struct MenuItem {
    pub icon: &'static str,
    pub label: String,
    pub status: Option<(String, Tone)>,
    pub action: Option<Arc<ActionFn>>,
}

impl MenuItem {
    pub fn action(
        icon: &'static str,
        label: impl Into<String>,
        invoke: impl Fn(&Ctx) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            icon,
            label: label.into(),
            status: None,
            action: Some(Arc::new(invoke)),
        }
    }

    pub fn label_only(icon: &'static str, label: impl Into<String>) -> Self {
        Self {
            icon,
            label: label.into(),
            status: None,
            action: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>, tone: Tone) -> Self {
        self.status = Some((status.into(), tone));
        self
    }
}

/// Scrollable selection list. The selection is clamped, and the visible
/// window follows it.
pub struct Menu {
    items: Vec<MenuItem>,
    selected: usize,
    scroll: usize,
    visible: usize,
}

impl Menu {
    pub fn new(items: Vec<MenuItem>, visible: usize) -> Self {
        Self {
            items,
            selected: 0,
            scroll: 0,
            visible: visible.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn set_selection(&mut self, index: usize) {
        self.selected = index.min(self.items.len().saturating_sub(1));
        self.follow_selection();
    }

    pub fn move_selection(&mut self, delta: isize) {
        let next = self.selected as isize + delta;
        self.set_selection(next.max(0) as usize);
    }

    pub fn reset(&mut self) {
        self.selected = 0;
        self.scroll = 0;
    }

    /// Replace the rows, keeping the selection clamped in place.
    pub fn set_items(&mut self, items: Vec<MenuItem>) {
        self.items = items;
        self.set_selection(self.selected);
    }

    pub fn selected_action(&self) -> Option<Arc<ActionFn>> {
        self.items.get(self.selected).and_then(|item| item.action.clone())
    }

    pub fn visible_window(&self) -> std::ops::Range<usize> {
        let end = (self.scroll + self.visible).min(self.items.len());
        self.scroll..end
    }

    /// Labels of the rows that carry an action, in menu order.
    pub fn action_labels(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.action.is_some())
            .map(|item| item.label.clone())
            .collect()
    }

    /// The n-th actionable row (0-based over actionable rows only).
    pub fn action_at(&self, index: usize) -> Option<Arc<ActionFn>> {
        self.items
            .iter()
            .filter_map(|item| item.action.clone())
            .nth(index)
    }

    fn follow_selection(&mut self) {
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.selected >= self.scroll + self.visible {
            self.scroll = self.selected + 1 - self.visible;
        }
    }
}

/// Shared handles every component receives at construction time.
#[derive(Clone)]
pub struct Ctx {
    pub state: Arc<AppState>,
    pub runner: Arc<PayloadRunner>,
    pub settings: Arc<Settings>,
}

impl Ctx {
    pub fn new(state: Arc<AppState>, runner: Arc<PayloadRunner>, settings: Arc<Settings>) -> Self {
        Self {
            state,
            runner,
            settings,
        }
    }

    /// Switch mode by a relative offset with wraparound. The index change
    /// commits inside the state lock; the lifecycle hooks run strictly
    /// after the lock is released, because on_enter/on_exit may block on
    /// one-off status commands and must never stall the UI loop.
    pub fn change_mode(&self, delta: isize) {
        let (old, new) = self.state.resolve_mode_change(delta);
        self.fire_hooks(old, new);
    }

    /// Switch to a mode by name, case-insensitive. Returns false and does
    /// nothing when no mode matches.
    pub fn change_mode_by_name(&self, name: &str) -> bool {
        match self.state.resolve_mode_by_name(name) {
            Some((old, new)) => {
                self.fire_hooks(old, new);
                true
            }
            None => false,
        }
    }

    fn fire_hooks(&self, old: Option<Arc<dyn Mode>>, new: Option<Arc<dyn Mode>>) {
        if let Some(old) = old {
            if let Err(err) = old.on_exit(self) {
                tracing::error!(mode = old.name(), %err, "mode exit hook failed");
            }
        }
        if let Some(new) = new {
            if let Err(err) = new.on_enter(self) {
                tracing::error!(mode = new.name(), %err, "mode enter hook failed");
                self.state.add_alert(
                    format!("Error: {}", truncate(&err.to_string(), 30)),
                    AlertLevel::Error,
                );
            }
        }
    }
}

/// Capability set of an operational screen. Handlers return `Result`; the
/// dispatcher contains failures at the event boundary so the input loop
/// always survives.
pub trait Mode: Send + Sync {
    fn name(&self) -> &'static str;

    fn icon(&self) -> &'static str {
        "●"
    }

    fn menu(&self) -> Option<&Mutex<Menu>> {
        None
    }

    fn on_enter(&self, _ctx: &Ctx) -> Result<()> {
        if let Some(menu) = self.menu() {
            menu.lock().expect("menu lock").reset();
        }
        Ok(())
    }

    fn on_exit(&self, _ctx: &Ctx) -> Result<()> {
        Ok(())
    }

    fn on_key1(&self, ctx: &Ctx) -> Result<()> {
        ctx.state.toggle_backlight();
        Ok(())
    }

    fn on_key2(&self, ctx: &Ctx) -> Result<()> {
        ctx.change_mode(1);
        Ok(())
    }

    fn on_key3(&self, _ctx: &Ctx) -> Result<()> {
        Ok(())
    }

    fn on_up(&self, ctx: &Ctx) -> Result<()> {
        if let Some(menu) = self.menu() {
            menu.lock().expect("menu lock").move_selection(-1);
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_down(&self, ctx: &Ctx) -> Result<()> {
        if let Some(menu) = self.menu() {
            menu.lock().expect("menu lock").move_selection(1);
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_left(&self, ctx: &Ctx) -> Result<()> {
        ctx.change_mode(-1);
        Ok(())
    }

    fn on_right(&self, ctx: &Ctx) -> Result<()> {
        ctx.change_mode(1);
        Ok(())
    }

    /// Invoke the selected menu action. The menu lock is released before
    /// the action runs; actions may re-enter the menu to rebuild it.
    fn on_press(&self, ctx: &Ctx) -> Result<()> {
        let action = self
            .menu()
            .and_then(|menu| menu.lock().expect("menu lock").selected_action());
        if let Some(action) = action {
            action(ctx)?;
        }
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()>;

    /// CLI projection: numbered action labels.
    fn action_labels(&self) -> Vec<String> {
        self.menu()
            .map(|menu| menu.lock().expect("menu lock").action_labels())
            .unwrap_or_default()
    }

    /// CLI projection: invoke an action by 0-based index over actionable rows.
    fn invoke_action(&self, ctx: &Ctx, index: usize) -> Result<()> {
        let action = self
            .menu()
            .and_then(|menu| menu.lock().expect("menu lock").action_at(index));
        match action {
            Some(action) => action(ctx),
            None => anyhow::bail!("no action #{}", index + 1),
        }
    }
}

/// Standard header: running-payload banner (when active) then the title.
pub fn draw_header(canvas: &mut Canvas, ctx: &Ctx, title: &str) {
    if let Some(payload) = ctx.state.current_payload() {
        canvas.text(
            Tone::Highlight,
            format!(
                "⚡ {} ({}s)",
                truncate(&payload.name, 12),
                payload.elapsed().as_secs()
            ),
        );
    }
    canvas.title(title);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_of(n: usize, visible: usize) -> Menu {
        let items = (0..n)
            .map(|i| MenuItem::action("●", format!("Item {i}"), |_| Ok(())))
            .collect();
        Menu::new(items, visible)
    }

    #[test]
    fn selection_is_clamped_at_both_ends() {
        let mut menu = menu_of(3, 7);
        menu.move_selection(-1);
        assert_eq!(menu.selected(), 0);
        menu.move_selection(10);
        assert_eq!(menu.selected(), 2);
    }

    #[test]
    fn window_follows_the_selection() {
        let mut menu = menu_of(10, 4);
        assert_eq!(menu.visible_window(), 0..4);
        menu.set_selection(5);
        assert_eq!(menu.visible_window(), 2..6);
        menu.set_selection(0);
        assert_eq!(menu.visible_window(), 0..4);
    }

    #[test]
    fn set_items_keeps_selection_clamped() {
        let mut menu = menu_of(8, 4);
        menu.set_selection(7);
        menu.set_items(
            (0..3)
                .map(|i| MenuItem::action("●", format!("New {i}"), |_| Ok(())))
                .collect(),
        );
        assert_eq!(menu.selected(), 2);
    }

    #[test]
    fn action_index_skips_label_rows() {
        let items = vec![
            MenuItem::label_only("ℹ", "Heading"),
            MenuItem::action("●", "First", |_| Ok(())),
            MenuItem::label_only("ℹ", "Spacer"),
            MenuItem::action("●", "Second", |_| Ok(())),
        ];
        let menu = Menu::new(items, 7);
        assert_eq!(menu.action_labels(), vec!["First", "Second"]);
        assert!(menu.action_at(1).is_some());
        assert!(menu.action_at(2).is_none());
    }
}

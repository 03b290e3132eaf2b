//! Process list with kill controls: PRESS sends SIGTERM, KEY3 SIGKILL.

use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use sysinfo::System;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{draw_header, Ctx, Mode};
use opsdeck_core::util::truncate;
use opsdeck_core::AlertLevel;

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);
const VISIBLE_ROWS: usize = 6;

#[derive(Clone, Debug)]
struct ProcRow {
    pid: u32,
    name: String,
    cpu: f32,
    mem: f32,
}

#[derive(Default)]
struct View {
    rows: Vec<ProcRow>,
    selected: usize,
    scroll: usize,
    refreshed: Option<Instant>,
}

pub struct ProcessesMode {
    sys: Mutex<System>,
    view: Mutex<View>,
    list_count: usize,
}

impl ProcessesMode {
    pub fn new(settings: &opsdeck_core::Settings) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            sys: Mutex::new(System::new()),
            view: Mutex::new(View::default()),
            list_count: settings.ui.process_list_count,
        })
    }

    fn refresh(&self) {
        let rows = {
            let mut sys = self.sys.lock().expect("sysinfo lock");
            sys.refresh_memory();
            sys.refresh_processes();
            let total = sys.total_memory().max(1);
            let mut rows: Vec<ProcRow> = sys
                .processes()
                .iter()
                .map(|(pid, proc)| ProcRow {
                    pid: pid.as_u32(),
                    name: truncate(proc.name(), 10),
                    cpu: proc.cpu_usage(),
                    mem: proc.memory() as f32 / total as f32 * 100.0,
                })
                .filter(|row| row.cpu > 0.0 || row.mem > 1.0)
                .collect();
            rows.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
            rows.truncate(self.list_count);
            rows
        };

        let mut view = self.view.lock().expect("view lock");
        // keep the same pid selected across refreshes where possible
        let selected_pid = view.rows.get(view.selected).map(|row| row.pid);
        view.rows = rows;
        let fallback = view.selected.min(view.rows.len().saturating_sub(1));
        let next = selected_pid
            .and_then(|pid| view.rows.iter().position(|row| row.pid == pid))
            .unwrap_or(fallback);
        view.selected = next;
        view.refreshed = Some(Instant::now());
        follow(&mut view);
    }

    fn kill_selected(&self, ctx: &Ctx, signal: i32) {
        let target = {
            let view = self.view.lock().expect("view lock");
            view.rows.get(view.selected).cloned()
        };
        let Some(target) = target else {
            return;
        };
        let sig_name = if signal == 15 { "SIGTERM" } else { "SIGKILL" };
        let result = Command::new("sudo")
            .args(["kill", &format!("-{signal}"), &target.pid.to_string()])
            .output();
        match result {
            Ok(output) if output.status.success() => {
                ctx.state.add_alert(
                    format!("Killed {} ({}) [{sig_name}]", target.name, target.pid),
                    AlertLevel::Ok,
                );
            }
            _ => {
                ctx.state
                    .add_alert(format!("Kill failed: {}", target.name), AlertLevel::Error);
            }
        }
        self.refresh();
        ctx.state.set_render_needed(true);
    }
}

fn follow(view: &mut View) {
    if view.selected < view.scroll {
        view.scroll = view.selected;
    } else if view.selected >= view.scroll + VISIBLE_ROWS {
        view.scroll = view.selected + 1 - VISIBLE_ROWS;
    }
}

impl Mode for ProcessesMode {
    fn name(&self) -> &'static str {
        "PROCESSES"
    }

    fn icon(&self) -> &'static str {
        "📊"
    }

    fn on_enter(&self, _ctx: &Ctx) -> Result<()> {
        self.refresh();
        let mut view = self.view.lock().expect("view lock");
        view.selected = 0;
        view.scroll = 0;
        Ok(())
    }

    fn on_up(&self, ctx: &Ctx) -> Result<()> {
        let mut view = self.view.lock().expect("view lock");
        if view.selected > 0 {
            view.selected -= 1;
            follow(&mut view);
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_down(&self, ctx: &Ctx) -> Result<()> {
        let mut view = self.view.lock().expect("view lock");
        if view.selected + 1 < view.rows.len() {
            view.selected += 1;
            follow(&mut view);
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_press(&self, ctx: &Ctx) -> Result<()> {
        self.kill_selected(ctx, 15);
        Ok(())
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        self.kill_selected(ctx, 9);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        let stale = self
            .view
            .lock()
            .expect("view lock")
            .refreshed
            .map(|at| at.elapsed() > REFRESH_INTERVAL)
            .unwrap_or(true);
        if stale {
            self.refresh();
        }

        draw_header(canvas, ctx, "PROCESSES");
        canvas.text(Tone::Dim, "  PID NAME        CPU% MEM%");

        let view = self.view.lock().expect("view lock");
        let end = (view.scroll + VISIBLE_ROWS).min(view.rows.len());
        for (idx, row) in view.rows[view.scroll..end].iter().enumerate() {
            let actual = view.scroll + idx;
            let selected = actual == view.selected;
            let tone = if row.cpu > 50.0 {
                Tone::Error
            } else if row.cpu > 20.0 {
                Tone::Warning
            } else if selected {
                Tone::Highlight
            } else {
                Tone::Dim
            };
            let marker = if selected { ">" } else { " " };
            canvas.text(
                tone,
                format!(
                    "{marker}{:>5} {:<10} {:>3.0}% {:>3.0}%",
                    row.pid, row.name, row.cpu, row.mem
                ),
            );
        }
        canvas.text(
            Tone::Dim,
            format!(
                "{}/{}",
                (view.selected + 1).min(view.rows.len()),
                view.rows.len()
            ),
        );
        canvas.footer("●:Kill K3:Force kill");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_scrolls_with_movement() {
        let mut view = View {
            rows: (0..20)
                .map(|i| ProcRow {
                    pid: i,
                    name: format!("proc{i}"),
                    cpu: 0.0,
                    mem: 2.0,
                })
                .collect(),
            selected: 0,
            scroll: 0,
            refreshed: None,
        };
        view.selected = 9;
        follow(&mut view);
        assert_eq!(view.scroll, 4);
        view.selected = 2;
        follow(&mut view);
        assert_eq!(view.scroll, 2);
    }

    #[test]
    fn refresh_populates_rows() {
        let mode = ProcessesMode::new(&opsdeck_core::Settings::default());
        mode.refresh();
        let view = mode.view.lock().expect("view lock");
        assert!(view.rows.len() <= 20);
        assert!(view.refreshed.is_some());
        // sorted by cpu descending
        for pair in view.rows.windows(2) {
            assert!(pair[0].cpu >= pair[1].cpu);
        }
    }
}

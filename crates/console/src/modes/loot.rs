//! Loot browser: category stats, recent files, and an in-place content
//! viewer. LEFT/RIGHT walk the three levels; from the outermost and
//! innermost levels they fall through to mode switching.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;

use opsdeck_core::canvas::{Canvas, Tone};
use opsdeck_core::mode::{Ctx, Mode};
use opsdeck_core::settings::{Settings, LOOT_SUBDIRS};
use opsdeck_core::util::{format_bytes, truncate};
use opsdeck_core::AlertLevel;

const CONTENT_MAX_BYTES: usize = 4096;
const CONTENT_LINE_WIDTH: usize = 24;
const CONTENT_VISIBLE: usize = 11;
const LIST_VISIBLE: usize = 6;
const FILE_LIMIT: usize = 20;
const CLEANUP_AGE_DAYS: u64 = 7;
const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    Stats,
    Files,
    Content,
}

#[derive(Clone)]
struct LootFile {
    path: PathBuf,
    name: String,
    category: String,
    size: u64,
    mtime: SystemTime,
}

struct Browser {
    view: View,
    stats: Vec<(String, usize, u64)>,
    files: Vec<LootFile>,
    selected: usize,
    scroll: usize,
    refreshed: Option<Instant>,
    content: Vec<String>,
    content_scroll: usize,
    content_name: String,
}

pub struct LootMode {
    browser: Mutex<Browser>,
}

impl LootMode {
    pub fn new(_settings: &Settings) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            browser: Mutex::new(Browser {
                view: View::Files,
                stats: Vec::new(),
                files: Vec::new(),
                selected: 0,
                scroll: 0,
                refreshed: None,
                content: Vec::new(),
                content_scroll: 0,
                content_name: String::new(),
            }),
        })
    }

    fn refresh(&self, settings: &Settings) {
        let stats = gather_stats(settings);
        let files = recent_files(settings, FILE_LIMIT);
        let mut browser = self.browser.lock().expect("loot lock");
        browser.stats = stats;
        browser.files = files;
        browser.refreshed = Some(Instant::now());
        let max_items = match browser.view {
            View::Stats => browser.stats.len(),
            _ => browser.files.len(),
        };
        browser.selected = browser.selected.min(max_items.saturating_sub(1));
    }

    fn open_content(&self, ctx: &Ctx) {
        let mut browser = self.browser.lock().expect("loot lock");
        let Some(file) = browser.files.get(browser.selected).cloned() else {
            drop(browser);
            ctx.state
                .add_alert("No loot files found", AlertLevel::Warning);
            ctx.state.set_render_needed(true);
            return;
        };
        browser.content_name = file.name.clone();
        browser.content = load_content(&file.path);
        browser.content_scroll = 0;
        browser.view = View::Content;
        drop(browser);
        ctx.state.set_render_needed(true);
    }
}

fn gather_stats(settings: &Settings) -> Vec<(String, usize, u64)> {
    LOOT_SUBDIRS
        .iter()
        .map(|subdir| {
            let path = settings.loot_dir().join(subdir);
            let mut count = 0;
            let mut size = 0;
            if let Ok(entries) = std::fs::read_dir(&path) {
                for entry in entries.flatten() {
                    if let Ok(meta) = entry.metadata() {
                        if meta.is_file() {
                            count += 1;
                            size += meta.len();
                        }
                    }
                }
            }
            (subdir.to_string(), count, size)
        })
        .collect()
}

fn recent_files(settings: &Settings, limit: usize) -> Vec<LootFile> {
    let mut files = Vec::new();
    for subdir in LOOT_SUBDIRS {
        let path = settings.loot_dir().join(subdir);
        let Ok(entries) = std::fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            files.push(LootFile {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
                category: subdir.to_string(),
                size: meta.len(),
                mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }
    files.sort_by(|a, b| b.mtime.cmp(&a.mtime));
    files.truncate(limit);
    files
}

fn delete_old_files(settings: &Settings, age_days: u64) -> usize {
    let cutoff = SystemTime::now() - Duration::from_secs(age_days * 86_400);
    let mut deleted = 0;
    for subdir in LOOT_SUBDIRS {
        let path = settings.loot_dir().join(subdir);
        let Ok(entries) = std::fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let old = meta
                .modified()
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if meta.is_file() && old && std::fs::remove_file(entry.path()).is_ok() {
                deleted += 1;
            }
        }
    }
    deleted
}

/// Read the head of a file and wrap it for the narrow display. Binary
/// content (null bytes up front) gets a placeholder instead.
fn load_content(path: &Path) -> Vec<String> {
    let raw = match std::fs::read(path) {
        Ok(mut bytes) => {
            bytes.truncate(CONTENT_MAX_BYTES);
            bytes
        }
        Err(err) => return vec![format!("[Error: {}]", truncate(&err.to_string(), 20))],
    };

    if raw.iter().take(512).any(|byte| *byte == 0) {
        return vec![
            "[Binary file]".to_string(),
            format!("{} bytes read", raw.len()),
            String::new(),
            "Use CLI/SCP to".to_string(),
            "transfer & view".to_string(),
        ];
    }

    let text = String::from_utf8_lossy(&raw);
    let mut lines = Vec::new();
    for line in text.lines() {
        let mut rest = line.trim_end();
        if rest.is_empty() {
            lines.push(String::new());
            continue;
        }
        while rest.chars().count() > CONTENT_LINE_WIDTH {
            let head: String = rest.chars().take(CONTENT_LINE_WIDTH).collect();
            let taken = head.len();
            lines.push(head);
            rest = &rest[taken..];
        }
        lines.push(rest.to_string());
    }
    if lines.is_empty() {
        lines.push("[Empty file]".to_string());
    }
    lines
}

fn follow(selected: usize, scroll: &mut usize) {
    if selected < *scroll {
        *scroll = selected;
    } else if selected >= *scroll + LIST_VISIBLE {
        *scroll = selected + 1 - LIST_VISIBLE;
    }
}

impl Mode for LootMode {
    fn name(&self) -> &'static str {
        "LOOT"
    }

    fn icon(&self) -> &'static str {
        "📁"
    }

    fn on_enter(&self, ctx: &Ctx) -> Result<()> {
        {
            let mut browser = self.browser.lock().expect("loot lock");
            browser.view = View::Files;
            browser.selected = 0;
            browser.scroll = 0;
        }
        self.refresh(&ctx.settings);
        Ok(())
    }

    fn on_up(&self, ctx: &Ctx) -> Result<()> {
        let mut browser = self.browser.lock().expect("loot lock");
        match browser.view {
            View::Content => {
                browser.content_scroll = browser.content_scroll.saturating_sub(1);
            }
            _ => {
                if browser.selected > 0 {
                    browser.selected -= 1;
                    let selected = browser.selected;
                    follow(selected, &mut browser.scroll);
                }
            }
        }
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn on_down(&self, ctx: &Ctx) -> Result<()> {
        let mut browser = self.browser.lock().expect("loot lock");
        match browser.view {
            View::Content => {
                let max = browser.content.len().saturating_sub(CONTENT_VISIBLE);
                browser.content_scroll = (browser.content_scroll + 1).min(max);
            }
            _ => {
                let max_items = match browser.view {
                    View::Stats => browser.stats.len(),
                    _ => browser.files.len(),
                };
                if browser.selected + 1 < max_items {
                    browser.selected += 1;
                    let selected = browser.selected;
                    follow(selected, &mut browser.scroll);
                }
            }
        }
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn on_left(&self, ctx: &Ctx) -> Result<()> {
        let back_out = {
            let mut browser = self.browser.lock().expect("loot lock");
            match browser.view {
                View::Content => {
                    browser.view = View::Files;
                    false
                }
                View::Files => {
                    browser.view = View::Stats;
                    browser.selected = 0;
                    browser.scroll = 0;
                    false
                }
                View::Stats => true,
            }
        };
        if back_out {
            ctx.change_mode(-1);
        } else {
            ctx.state.set_render_needed(true);
        }
        Ok(())
    }

    fn on_right(&self, ctx: &Ctx) -> Result<()> {
        let forward = {
            let mut browser = self.browser.lock().expect("loot lock");
            match browser.view {
                View::Stats => {
                    browser.view = View::Files;
                    browser.selected = 0;
                    browser.scroll = 0;
                    Step::Stay
                }
                View::Files => Step::Open,
                View::Content => Step::NextMode,
            }
        };
        match forward {
            Step::Stay => ctx.state.set_render_needed(true),
            Step::Open => self.open_content(ctx),
            Step::NextMode => ctx.change_mode(1),
        }
        Ok(())
    }

    fn on_press(&self, ctx: &Ctx) -> Result<()> {
        let step = {
            let mut browser = self.browser.lock().expect("loot lock");
            match browser.view {
                View::Content => {
                    browser.view = View::Files;
                    Step::Stay
                }
                View::Files => Step::Open,
                View::Stats => {
                    browser.view = View::Files;
                    browser.selected = 0;
                    browser.scroll = 0;
                    Step::Stay
                }
            }
        };
        match step {
            Step::Open => self.open_content(ctx),
            _ => ctx.state.set_render_needed(true),
        }
        Ok(())
    }

    fn on_key1(&self, ctx: &Ctx) -> Result<()> {
        self.on_press(ctx)
    }

    fn on_key3(&self, ctx: &Ctx) -> Result<()> {
        let deleted = delete_old_files(&ctx.settings, CLEANUP_AGE_DAYS);
        ctx.state.add_alert(
            format!("Deleted {deleted} files (>{CLEANUP_AGE_DAYS}d)"),
            AlertLevel::Ok,
        );
        self.refresh(&ctx.settings);
        ctx.state.set_render_needed(true);
        Ok(())
    }

    fn render(&self, ctx: &Ctx, canvas: &mut Canvas) -> Result<()> {
        let stale = {
            let browser = self.browser.lock().expect("loot lock");
            browser.view != View::Content
                && browser
                    .refreshed
                    .map(|at| at.elapsed() > REFRESH_INTERVAL)
                    .unwrap_or(true)
        };
        if stale {
            self.refresh(&ctx.settings);
        }

        let browser = self.browser.lock().expect("loot lock");
        match browser.view {
            View::Stats => {
                canvas.title("LOOT [Stats]");
                let mut total_files = 0;
                let mut total_size = 0;
                for (idx, (category, count, size)) in browser.stats.iter().enumerate() {
                    total_files += count;
                    total_size += size;
                    let selected = idx == browser.selected;
                    let marker = if selected { ">" } else { " " };
                    canvas.text(
                        if selected { Tone::Highlight } else { Tone::Text },
                        format!("{marker}{category:<10} {count:>3} {}", format_bytes(*size)),
                    );
                }
                canvas.separator();
                canvas.text(
                    Tone::Info,
                    format!("Total: {total_files} files {}", format_bytes(total_size)),
                );
                canvas.footer("●:Files  K3:Cleanup");
            }
            View::Files => {
                canvas.title("LOOT [Files]");
                if browser.files.is_empty() {
                    canvas.blank();
                    canvas.text(Tone::Dim, "No loot files");
                } else {
                    let end = (browser.scroll + LIST_VISIBLE).min(browser.files.len());
                    for (idx, file) in browser.files[browser.scroll..end].iter().enumerate() {
                        let actual = browser.scroll + idx;
                        let selected = actual == browser.selected;
                        let marker = if selected { ">" } else { " " };
                        canvas.text(
                            if selected { Tone::Text } else { Tone::Dim },
                            format!(
                                "{marker}{:<4} {:<12} {}",
                                truncate(&file.category, 4).to_uppercase(),
                                truncate(&file.name, 12),
                                format_bytes(file.size)
                            ),
                        );
                    }
                }
                canvas.footer("●:Open  K3:Cleanup");
            }
            View::Content => {
                canvas.title(truncate(&browser.content_name, 14));
                let end = (browser.content_scroll + CONTENT_VISIBLE).min(browser.content.len());
                for line in &browser.content[browser.content_scroll..end] {
                    canvas.text(Tone::Text, line);
                }
                if browser.content.len() > CONTENT_VISIBLE {
                    canvas.text(
                        Tone::Dim,
                        format!(
                            "{}-{end}/{}",
                            browser.content_scroll + 1,
                            browser.content.len()
                        ),
                    );
                }
                canvas.footer("●:Back  ↑↓:Scroll");
            }
        }
        Ok(())
    }
}

enum Step {
    Stay,
    Open,
    NextMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_settings(tag: &str) -> Settings {
        let mut settings = Settings::default();
        settings.home =
            std::env::temp_dir().join(format!("opsdeck-lootmode-{}-{tag}", std::process::id()));
        settings
    }

    #[test]
    fn stats_and_recent_files_see_written_loot() {
        let settings = scratch_settings("stats");
        let dir = settings.loot_dir().join("nmap");
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(dir.join("quick_1.txt"), "scan one").expect("write");
        std::fs::write(dir.join("quick_2.txt"), "scan two, longer").expect("write");

        let stats = gather_stats(&settings);
        let nmap = stats.iter().find(|(name, ..)| name == "nmap").expect("nmap");
        assert_eq!(nmap.1, 2);
        assert!(nmap.2 > 0);

        let files = recent_files(&settings, 10);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| file.category == "nmap"));
        let _ = std::fs::remove_dir_all(&settings.home);
    }

    #[test]
    fn old_files_are_cleaned_up() {
        let settings = scratch_settings("cleanup");
        let dir = settings.loot_dir().join("wifi");
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(dir.join("fresh.cap"), "new").expect("write");
        // age 0 days wipes everything, which is the observable contract
        assert_eq!(delete_old_files(&settings, 0), 1);
        assert_eq!(recent_files(&settings, 10).len(), 0);
        let _ = std::fs::remove_dir_all(&settings.home);
    }

    #[test]
    fn content_loader_wraps_and_detects_binary() {
        let dir = std::env::temp_dir();
        let text_path = dir.join(format!("opsdeck-loot-text-{}.txt", std::process::id()));
        std::fs::write(&text_path, "a".repeat(60)).expect("write");
        let lines = load_content(&text_path);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].chars().count() == CONTENT_LINE_WIDTH);

        let bin_path = dir.join(format!("opsdeck-loot-bin-{}.bin", std::process::id()));
        std::fs::write(&bin_path, [0u8, 1, 2, 3]).expect("write");
        assert_eq!(load_content(&bin_path)[0], "[Binary file]");

        let empty_path = dir.join(format!("opsdeck-loot-empty-{}.txt", std::process::id()));
        std::fs::write(&empty_path, "").expect("write");
        assert_eq!(load_content(&empty_path)[0], "[Empty file]");

        for path in [text_path, bin_path, empty_path] {
            let _ = std::fs::remove_file(path);
        }
    }
}

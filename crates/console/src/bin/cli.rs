//! opsdeck-cli: headless operation without the panel.
//!
//! ```text
//! opsdeck-cli                 interactive numbered-menu loop
//! opsdeck-cli <mode>          list a mode's actions
//! opsdeck-cli <mode> <n>      run action n and wait for the payload
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use opsdeck_console::modes::{cli_mode, CLI_MODES};
use opsdeck_core::{loot, AppState, Ctx, Mode, PayloadRunner, Settings};

#[derive(Parser, Debug)]
#[command(name = "opsdeck-cli", about = "Run opsdeck payloads without the LCD")]
struct Args {
    /// Settings file (TOML); defaults apply when absent.
    #[arg(long, default_value = "opsdeck.toml")]
    config: PathBuf,

    /// Mode short name (system, nmap, wifi, ...).
    mode: Option<String>,

    /// 1-based action number; omit to list the mode's actions.
    action: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Arc::new(
        Settings::load(&args.config)
            .with_context(|| format!("load settings {}", args.config.display()))?,
    );

    // alerts surface on stderr through the log mirror
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    loot::create_loot_dirs(&settings).context("create loot directories")?;

    let state = AppState::new(settings.ui.alert_capacity);
    let runner = PayloadRunner::new(Arc::clone(&state));
    let ctx = Ctx::new(state, runner, settings);

    match (&args.mode, &args.action) {
        (None, _) => interactive(&ctx).await,
        (Some(mode_name), None) => {
            let mode = resolve_mode_or_exit(mode_name, &ctx);
            print_actions(mode_name, &mode.action_labels());
            Ok(())
        }
        (Some(mode_name), Some(action)) => {
            let mode = resolve_mode_or_exit(mode_name, &ctx);
            let Ok(number) = action.parse::<usize>() else {
                eprintln!("Action must be a number, got: {action}");
                usage();
                std::process::exit(2);
            };
            run_action(&ctx, mode_name, mode.as_ref(), number).await
        }
    }
}

fn usage() {
    eprintln!("Usage: opsdeck-cli [MODE [ACTION]]");
    eprintln!("Available modes:");
    for name in CLI_MODES {
        eprintln!("  {name}");
    }
}

/// Build the mode and run its enter hook so dynamic menus populate.
fn resolve_mode_or_exit(name: &str, ctx: &Ctx) -> Arc<dyn Mode> {
    let Some(mode) = cli_mode(name, &ctx.settings) else {
        eprintln!("Unknown mode: {name}");
        usage();
        std::process::exit(2);
    };
    if let Err(err) = mode.on_enter(ctx) {
        tracing::warn!(%err, mode = name, "mode enter hook failed");
    }
    mode
}

fn print_actions(mode_name: &str, labels: &[String]) {
    println!();
    println!("  {} actions:", mode_name.to_uppercase());
    for (idx, label) in labels.iter().enumerate() {
        println!("    {}. {label}", idx + 1);
    }
    println!();
}

async fn run_action(
    ctx: &Ctx,
    mode_name: &str,
    mode: &dyn Mode,
    number: usize,
) -> anyhow::Result<()> {
    let labels = mode.action_labels();
    if labels.is_empty() {
        println!("No actions available for {mode_name}");
        return Ok(());
    }
    let Some(label) = number.checked_sub(1).and_then(|idx| labels.get(idx)) else {
        println!("Invalid action number {number} for {mode_name}");
        print_actions(mode_name, &labels);
        return Ok(());
    };
    println!("Running: {mode_name} > {label}");
    mode.invoke_action(ctx, number - 1)?;
    wait_for_payload(ctx).await;
    Ok(())
}

async fn wait_for_payload(ctx: &Ctx) {
    if !ctx.state.is_payload_running() {
        return;
    }
    println!("Waiting for payload to finish (Ctrl+C to cancel)...");
    tokio::select! {
        _ = ctx.state.wait_payload_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling payload...");
            ctx.runner.cancel();
            let _ =
                tokio::time::timeout(Duration::from_secs(2), ctx.state.wait_payload_idle()).await;
        }
    }
}

fn prompt(text: &str) -> Option<String> {
    print!("{text}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_ascii_lowercase()),
    }
}

async fn interactive(ctx: &Ctx) -> anyhow::Result<()> {
    println!("==================================================");
    println!("  opsdeck headless CLI");
    println!("==================================================");
    println!();
    println!("Available modes:");
    for (idx, name) in CLI_MODES.iter().enumerate() {
        println!("  {}. {name}", idx + 1);
    }
    println!("  q. Quit");

    loop {
        println!();
        let Some(choice) = prompt("Mode (number/name/q): ") else {
            break;
        };
        if matches!(choice.as_str(), "q" | "quit" | "exit") {
            break;
        }

        let mode_name = match choice.parse::<usize>() {
            Ok(number) => number
                .checked_sub(1)
                .and_then(|idx| CLI_MODES.get(idx))
                .copied(),
            Err(_) => CLI_MODES.iter().find(|name| **name == choice).copied(),
        };
        let Some(mode_name) = mode_name else {
            println!("Invalid mode. Try again.");
            continue;
        };

        let mode = cli_mode(mode_name, &ctx.settings).expect("listed mode resolves");
        if let Err(err) = mode.on_enter(ctx) {
            tracing::warn!(%err, mode = mode_name, "mode enter hook failed");
        }
        let labels = mode.action_labels();
        if labels.is_empty() {
            println!("No actions available for {mode_name}");
            continue;
        }
        print_actions(mode_name, &labels);

        let Some(answer) = prompt("Action number (b=back): ") else {
            break;
        };
        if matches!(answer.as_str(), "b" | "back" | "") {
            continue;
        }
        let Ok(number) = answer.parse::<usize>() else {
            println!("Invalid input.");
            continue;
        };
        let Some(label) = number.checked_sub(1).and_then(|idx| labels.get(idx)) else {
            println!("Invalid action number.");
            continue;
        };

        println!();
        println!("Running: {mode_name} > {label}");
        if let Err(err) = mode.invoke_action(ctx, number - 1) {
            println!("Action failed: {err}");
            continue;
        }
        wait_for_payload(ctx).await;
    }
    Ok(())
}

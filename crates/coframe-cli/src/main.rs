//! `coframe-cli` – CoFrame command line interface
//!
//! This binary is the front door of the co-location stack.  It:
//!
//! 1. Checks for `~/.coframe/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Probes the anchor ledger and reports the active records for the
//!    configured room.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/join`, `/calibrate`, `/spawn`, `/move`, `/status`, `/help`).
//! 4. Intercepts **Ctrl-C** to publish a session alert and exit safely.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use coframe_net::{EventBus, Topic};
use coframe_types::{Event, EventPayload};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG controls the filter (default "info"); COFRAME_LOG_FORMAT=json
    // switches to newline-delimited JSON, and OTEL_EXPORTER_OTLP_ENDPOINT
    // turns on span export.  The REPL's user-facing output still uses
    // println! for UX consistency.
    let _telemetry = coframe_runtime::telemetry::init_tracing("coframe");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Build a bus so the interrupt shows up as a session alert for anything
    // subscribed to this process.
    let alert_bus = EventBus::default();
    let bus_for_ctrlc = alert_bus.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – shutting the session down …".yellow().bold()
        );

        let _ = bus_for_ctrlc.publish(
            Topic::SessionAlerts,
            Event::new(
                "coframe-cli",
                EventPayload::SessionAlert {
                    component: "cli".to_string(),
                    details: "operator interrupt".to_string(),
                },
            ),
        );

        println!("{}", "  ✓ Exiting CoFrame.".green());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    // ── Anchor ledger probe ───────────────────────────────────────────────
    let cfg = config::load().ok().flatten().unwrap_or_default();

    if cfg.ledger_path.is_empty() {
        println!(
            "\n  {}  Set a ledger path in {} to persist anchors.",
            "Anchor ledger disabled.".dimmed(),
            "/settings".bold()
        );
    } else {
        print!("\n  Opening anchor ledger at {} … ", cfg.ledger_path.dimmed());
        match coframe_store::AnchorLedger::open(&cfg.ledger_path)
            .and_then(|ledger| ledger.active_for_room(&cfg.room, chrono::Utc::now()))
        {
            Ok(records) => {
                println!(
                    "{} ({} active anchor record(s) for room {})",
                    "ready".green(),
                    records.len(),
                    cfg.room.bold()
                );
            }
            Err(e) => {
                println!("{}", "unavailable".yellow());
                println!("  {}", e.to_string().dimmed());
            }
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       CoFrame First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up CoFrame.\n");

    let mut cfg = config::Config::default();

    let name = prompt_line(
        &format!("  Display name for this client [{}]: ", cfg.display_name),
        &cfg.display_name,
    );
    cfg.display_name = name.trim().to_string();

    let room = prompt_line(&format!("  Room to share [{}]: ", cfg.room), &cfg.room);
    cfg.room = room.trim().to_string();

    let ledger = prompt_line("  Anchor ledger path (Enter to skip): ", "");
    cfg.ledger_path = ledger.trim().to_string();

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ______      ______                        "#.bold().cyan());
    println!("{}", r#"  / ____/___  / ____/________ _____ ___  ___ "#.bold().cyan());
    println!("{}", r#" / /   / __ \/ /_  / ___/ __ `/ __ `__ \/ _ \"#.bold().cyan());
    println!("{}", r#"/ /___/ /_/ / __/ / /  / /_/ / / / / / /  __/"#.bold().cyan());
    println!("{}", r#"\____/\____/_/   /_/    \__,_/_/ /_/ /_/\___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "CoFrame".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Shared spatial-frame co-location client");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

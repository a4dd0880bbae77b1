//! REPL – the interactive shell for the co-location demo.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /settings      – interactively edit `~/.coframe/config.toml`
//!   /status        – show the current session (or the saved settings)
//!   /join          – start a two-client demo session in one process
//!   /calibrate     – master pins the triangle; observer locates it
//!   /spawn         – master spawns a shared object
//!   /move N DX DY DZ – nudge object N in the owner's world frame
//!   /take N        – observer takes ownership of object N
//!   /reset         – snap every object back to the frame origin
//!   /purge         – delete expired anchor records from the ledger
//!   /leave         – tear the demo session down
//!   /quit | /exit  – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use coframe_anchors::{SimAnchorCloud, WorldLink};
use coframe_net::LoopbackRoom;
use coframe_runtime::{ClientConfig, ShareClient, SharePhase};
use coframe_space::{Pose, Quat, Vec3};
use coframe_store::AnchorLedger;
use coframe_types::{ObjectId, ShareError};

use crate::config::{self, Config};

/// Where the demo master "stands" when it pins the triangle.
const DEVICE_POSE_POSITION: Vec3 = Vec3 {
    x: 0.0,
    y: 1.5,
    z: 0.0,
};

// ─────────────────────────────────────────────────────────────────────────────
// Demo session
// ─────────────────────────────────────────────────────────────────────────────

/// A complete two-client session running inside this process: a master and
/// an observer with deliberately unrelated world frames, joined through a
/// loopback room and a shared simulated anchor cloud.
///
/// The [`WorldLink`]s are kept around as ground truth: `/status` uses them
/// to report how far apart (in metres) the two clients place each object in
/// physical space.
pub(crate) struct DemoSession {
    master: ShareClient,
    observer: ShareClient,
    master_link: WorldLink,
    observer_link: WorldLink,
}

impl DemoSession {
    /// Join both clients into a fresh room.  The observer's anchor service
    /// locates with `noise_metres` of jitter.
    pub(crate) async fn start(cfg: &Config, noise_metres: f32) -> Result<Self, String> {
        let layout = cfg.layout()?;
        let room = LoopbackRoom::new();
        let cloud = SimAnchorCloud::new();

        // The master's world frame is the reference; the observer's is a
        // rotated, shifted copy of physical space, as two headsets' would be.
        let master_link = WorldLink::identity();
        let observer_link = WorldLink::new(
            Vec3::new(3.0, 0.0, -1.5),
            Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 1.2),
        );

        let master_config = ClientConfig {
            display_name: cfg.display_name.clone(),
            room: cfg.room.clone(),
            layout,
            stream_hz: cfg.stream_hz,
            anchor_ttl: chrono::Duration::days(cfg.anchor_ttl_days),
            ledger_path: (!cfg.ledger_path.is_empty()).then(|| cfg.ledger_path.clone()),
            ..ClientConfig::default()
        };
        let observer_config = ClientConfig {
            display_name: "observer".to_string(),
            room: cfg.room.clone(),
            layout,
            stream_hz: cfg.stream_hz,
            ..ClientConfig::default()
        };

        let master = ShareClient::new(
            master_config,
            Box::new(room.join().await),
            Box::new(cloud.session(master_link)),
        )
        .map_err(|e| e.to_string())?;
        let observer = ShareClient::new(
            observer_config,
            Box::new(room.join().await),
            Box::new(cloud.session(observer_link).with_noise(noise_metres)),
        )
        .map_err(|e| e.to_string())?;

        let mut session = Self {
            master,
            observer,
            master_link,
            observer_link,
        };
        // Let the join notifications drain.
        session.settle().await.map_err(|e| e.to_string())?;
        Ok(session)
    }

    /// Master pins the triangle, then both clients tick until the observer
    /// has located and verified it (or given up).
    pub(crate) async fn calibrate(&mut self) -> Result<(), ShareError> {
        let device_pose = Pose::new(DEVICE_POSE_POSITION, Quat::identity());
        self.master.calibrate(device_pose).await?;
        self.settle().await
    }

    pub(crate) async fn spawn(&mut self) -> Result<ObjectId, ShareError> {
        let id = self.master.spawn_object().await?;
        self.settle().await?;
        Ok(id)
    }

    /// Nudge object `index` by the given delta, driven by whichever client
    /// currently owns it.
    pub(crate) async fn move_object(
        &mut self,
        index: usize,
        delta: Vec3,
    ) -> Result<(), ShareError> {
        let objects = self.master.objects();
        let snapshot = objects.get(index).ok_or_else(|| {
            ShareError::Config(format!("no object at index {index}"))
        })?;
        let id = snapshot.id;

        if snapshot.owner == Some(self.observer.client_id()) {
            let current = self
                .observer
                .objects()
                .into_iter()
                .find(|o| o.id == id)
                .map(|o| o.pose)
                .unwrap_or(snapshot.pose);
            let target = Pose::new(current.position.add(delta), current.rotation);
            self.observer.publish_pose(id, target).await?;
        } else {
            let target = Pose::new(snapshot.pose.position.add(delta), snapshot.pose.rotation);
            self.master.publish_pose(id, target).await?;
        }
        self.settle().await
    }

    /// Observer takes ownership of object `index`.
    pub(crate) async fn take(&mut self, index: usize) -> Result<(), ShareError> {
        let id = self
            .observer
            .objects()
            .get(index)
            .map(|o| o.id)
            .ok_or_else(|| ShareError::Config(format!("no object at index {index}")))?;
        self.observer.take_ownership(id).await?;
        self.settle().await
    }

    pub(crate) async fn reset(&mut self) -> Result<(), ShareError> {
        self.master.reset_objects().await?;
        self.settle().await
    }

    pub(crate) async fn leave(self) -> Result<(), ShareError> {
        self.observer.leave().await?;
        self.master.leave().await?;
        Ok(())
    }

    pub(crate) fn master(&self) -> &ShareClient {
        &self.master
    }

    pub(crate) fn observer_phase(&self) -> SharePhase {
        self.observer.phase()
    }

    /// Ground-truth disagreement for object `index`: how far apart, in
    /// metres of physical space, the two clients place it.
    pub(crate) fn agreement_error(&self, index: usize) -> Option<f32> {
        let master_view = self.master.objects();
        let snapshot = master_view.get(index)?;
        let observer_pose = self
            .observer
            .objects()
            .into_iter()
            .find(|o| o.id == snapshot.id)?
            .pose;
        let expected = self
            .observer_link
            .to_world(&self.master_link.to_physical(&snapshot.pose));
        Some(expected.position.distance(observer_pose.position))
    }

    /// Tick both clients until in-flight traffic and locate tasks settle.
    async fn settle(&mut self) -> Result<(), ShareError> {
        for _ in 0..30 {
            self.master.tick().await?;
            self.observer.tick().await?;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        Ok(())
    }

    fn print_status(&self) {
        println!("{}", "Shared Session".bold().underline());
        println!("  Room     : {}", self.master.room().yellow());
        println!(
            "  Master   : {} ({}) – {}",
            self.master.display_name().bold(),
            self.master.client_id(),
            self.master.phase().to_string().cyan()
        );
        println!(
            "  Observer : {} ({}) – {}",
            self.observer.display_name().bold(),
            self.observer.client_id(),
            self.observer.phase().to_string().cyan()
        );

        let objects = self.master.objects();
        if objects.is_empty() {
            println!("  Objects  : {}", "none – /spawn to create one".dimmed());
            return;
        }
        println!("  Objects:");
        for (index, object) in objects.iter().enumerate() {
            let owner = match object.owner {
                Some(id) if id == self.master.client_id() => "master".to_string(),
                Some(id) if id == self.observer.client_id() => "observer".to_string(),
                Some(id) => id.to_string(),
                None => "unowned".to_string(),
            };
            let p = object.pose.position;
            println!(
                "    [{}] {} – owner {}",
                index,
                object.id.to_string().dimmed(),
                owner.yellow()
            );
            println!("        master sees   ({:>6.2}, {:>6.2}, {:>6.2})", p.x, p.y, p.z);
            if let Some(seen) = self
                .observer
                .objects()
                .into_iter()
                .find(|o| o.id == object.id)
            {
                let q = seen.pose.position;
                println!("        observer sees ({:>6.2}, {:>6.2}, {:>6.2})", q.x, q.y, q.z);
            }
            match self.agreement_error(index) {
                Some(err) => println!(
                    "        agreement     {} m",
                    format!("{:.4}", err).green()
                ),
                None => println!("        agreement     {}", "n/a".dimmed()),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// REPL loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return;
        }
    };
    let mut session: Option<DemoSession> = None;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "coframe>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(cmd) = parts.first() else {
            continue;
        };

        match *cmd {
            "/help" => cmd_help(),
            "/settings" => cmd_settings(),
            "/status" => match &session {
                Some(s) => s.print_status(),
                None => cmd_status_offline(),
            },
            "/join" => cmd_join(&runtime, &mut session),
            "/calibrate" => with_session(&mut session, |s| {
                match runtime.block_on(s.calibrate()) {
                    Ok(()) => {
                        println!(
                            "  {} Master frame ready; observer is {}.",
                            "✓".green().bold(),
                            s.observer_phase().to_string().cyan()
                        );
                    }
                    Err(e) => println!("{}: {}", "Calibration failed".red(), e),
                }
            }),
            "/spawn" => with_session(&mut session, |s| {
                match runtime.block_on(s.spawn()) {
                    Ok(id) => println!("  {} Spawned object {}", "✓".green().bold(), id),
                    Err(e) => println!("{}: {}", "Spawn failed".red(), e),
                }
            }),
            "/move" => match parse_move(&parts[1..]) {
                Some((index, delta)) => with_session(&mut session, |s| {
                    match runtime.block_on(s.move_object(index, delta)) {
                        Ok(()) => println!("  {} Object {} moved", "✓".green().bold(), index),
                        Err(e) => println!("{}: {}", "Move failed".red(), e),
                    }
                }),
                None => println!(
                    "  Usage: {} (metres, in the owner's world frame)",
                    "/move N DX DY DZ".bold()
                ),
            },
            "/take" => match parse_index(&parts[1..]) {
                Some(index) => with_session(&mut session, |s| {
                    match runtime.block_on(s.take(index)) {
                        Ok(()) => println!(
                            "  {} Observer now drives object {}",
                            "✓".green().bold(),
                            index
                        ),
                        Err(e) => println!("{}: {}", "Takeover failed".red(), e),
                    }
                }),
                None => println!("  Usage: {}", "/take N".bold()),
            },
            "/reset" => with_session(&mut session, |s| {
                match runtime.block_on(s.reset()) {
                    Ok(()) => println!(
                        "  {} Objects snapped back to the frame origin",
                        "✓".green().bold()
                    ),
                    Err(e) => println!("{}: {}", "Reset failed".red(), e),
                }
            }),
            "/purge" => cmd_purge(&session),
            "/leave" => match session.take() {
                Some(s) => match runtime.block_on(s.leave()) {
                    Ok(()) => println!("  {} Session closed", "✓".green().bold()),
                    Err(e) => println!("{}: {}", "Leave failed".red(), e),
                },
                None => println!("  No active session."),
            },
            "/quit" | "/exit" => {
                if let Some(s) = session.take() {
                    if let Err(e) = runtime.block_on(s.leave()) {
                        println!("{}: {}", "Leave failed".red(), e);
                    }
                }
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "CoFrame Commands".bold().underline());
    println!("  {}       – edit ~/.coframe/config.toml settings", "/settings".bold().cyan());
    println!("  {}         – session overview and per-object agreement", "/status".bold().cyan());
    println!("  {}           – start the two-client demo session", "/join".bold().cyan());
    println!("  {}      – pin the triangle and derive the shared frame", "/calibrate".bold().cyan());
    println!("  {}          – master spawns a shared object", "/spawn".bold().cyan());
    println!("  {} – nudge object N in the owner's frame", "/move N DX DY DZ".bold().cyan());
    println!("  {}         – observer takes ownership of object N", "/take N".bold().cyan());
    println!("  {}          – snap all objects to the frame origin", "/reset".bold().cyan());
    println!("  {}          – delete expired anchor records", "/purge".bold().cyan());
    println!("  {}          – tear the session down", "/leave".bold().cyan());
    println!("  {}     – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    cfg.display_name = prompt_str(
        &format!("  Display name   [{}]: ", cfg.display_name),
        &cfg.display_name,
    );
    cfg.room = prompt_str(&format!("  Room           [{}]: ", cfg.room), &cfg.room);
    cfg.x_leg = prompt_f32(&format!("  X leg (m)      [{}]: ", cfg.x_leg), cfg.x_leg);
    cfg.y_leg = prompt_f32(&format!("  Y leg (m)      [{}]: ", cfg.y_leg), cfg.y_leg);
    cfg.tolerance = prompt_f32(
        &format!("  Side tolerance [{}]: ", cfg.tolerance),
        cfg.tolerance,
    );
    cfg.stream_hz = prompt_u32(
        &format!("  Stream rate Hz [{}]: ", cfg.stream_hz),
        cfg.stream_hz,
    );
    cfg.demo_noise = prompt_f32(
        &format!("  Demo noise (m) [{}]: ", cfg.demo_noise),
        cfg.demo_noise,
    );
    cfg.ledger_path = prompt_str(
        &format!(
            "  Ledger path    [{}]: ",
            if cfg.ledger_path.is_empty() { "disabled" } else { &cfg.ledger_path }
        ),
        &cfg.ledger_path,
    );

    if let Err(e) = cfg.layout() {
        println!("  {} {}", "Warning:".yellow(), e);
        println!("  Saved anyway; /join will refuse these triangle settings.");
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn cmd_status_offline() {
    let cfg = load_config_or_default();
    println!("{}", "No active session".bold().underline());
    println!("  Room        : {}", cfg.room.yellow());
    println!(
        "  Triangle    : {} m × {} m (±{:.0}% sides)",
        cfg.x_leg,
        cfg.y_leg,
        cfg.tolerance * 100.0
    );
    println!("  Stream rate : {} Hz", cfg.stream_hz);
    match ledger_summary(&cfg) {
        Some((path, count)) => {
            println!("  Ledger      : {} ({} active anchor record(s))", path.bold(), count)
        }
        None => println!("  Ledger      : {}", "disabled".dimmed()),
    }
    println!("  Type {} to start the demo session.", "/join".bold().cyan());
}

fn cmd_join(runtime: &tokio::runtime::Runtime, session: &mut Option<DemoSession>) {
    if session.is_some() {
        println!("  A session is already running; {} first.", "/leave".bold());
        return;
    }
    let cfg = load_config_or_default();

    println!();
    println!("{}", "═══════════════════════════════════════".bold());
    println!("{}", "        CoFrame Demo Session           ".bold().cyan());
    println!("{}", "═══════════════════════════════════════".bold());

    // ── Step 1 – Configuration ─────────────────────────────────────────────
    print!("  [1/3] {} … ", "Checking triangle settings".bold());
    io::stdout().flush().ok();
    match cfg.layout() {
        Ok(_) => println!("{}", "OK".green()),
        Err(e) => {
            println!("{}: {}", "FAILED".red(), e);
            return;
        }
    }

    // ── Step 2 – Clients ───────────────────────────────────────────────────
    print!(
        "  [2/3] {} {} … ",
        "Joining room".bold(),
        cfg.room.yellow()
    );
    io::stdout().flush().ok();
    let demo = match runtime.block_on(DemoSession::start(&cfg, cfg.demo_noise)) {
        Ok(demo) => {
            println!("{}", "OK".green());
            demo
        }
        Err(e) => {
            println!("{}: {}", "FAILED".red(), e);
            return;
        }
    };

    // ── Step 3 – Ledger ────────────────────────────────────────────────────
    print!("  [3/3] {} … ", "Anchor ledger".bold());
    io::stdout().flush().ok();
    if cfg.ledger_path.is_empty() {
        println!("{}", "skipped (disabled)".dimmed());
    } else {
        println!("{} ({})", "OK".green(), cfg.ledger_path.bold());
    }

    println!("{}", "═══════════════════════════════════════".bold());
    println!(
        "  {} Session is {}. Type {} to establish the shared frame.",
        "✓".green().bold(),
        "LIVE".green().bold(),
        "/calibrate".bold()
    );
    println!("{}", "═══════════════════════════════════════".bold());
    println!();

    *session = Some(demo);
}

fn cmd_purge(session: &Option<DemoSession>) {
    let purged = match session {
        Some(s) => s.master().purge_expired_anchors(Utc::now()),
        None => {
            let cfg = load_config_or_default();
            if cfg.ledger_path.is_empty() {
                println!("  No ledger configured; nothing to purge.");
                return;
            }
            AnchorLedger::open(&cfg.ledger_path)
                .and_then(|ledger| ledger.purge_expired(Utc::now()))
                .map_err(ShareError::from)
        }
    };
    match purged {
        Ok(count) => println!(
            "  {} Purged {} expired anchor record(s)",
            "✓".green().bold(),
            count
        ),
        Err(e) => println!("{}: {}", "Purge failed".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn with_session(session: &mut Option<DemoSession>, f: impl FnOnce(&mut DemoSession)) {
    match session.as_mut() {
        Some(s) => f(s),
        None => println!("  No active session; {} first.", "/join".bold()),
    }
}

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

/// Active anchor-record count for the configured room, if a ledger is set up.
fn ledger_summary(cfg: &Config) -> Option<(String, usize)> {
    if cfg.ledger_path.is_empty() {
        return None;
    }
    let ledger = AnchorLedger::open(&cfg.ledger_path).ok()?;
    let records = ledger.active_for_room(&cfg.room, Utc::now()).ok()?;
    Some((cfg.ledger_path.clone(), records.len()))
}

/// Parse `/move` arguments: an object index and a world-frame delta.
fn parse_move(args: &[&str]) -> Option<(usize, Vec3)> {
    if args.len() != 4 {
        return None;
    }
    let index = args[0].parse::<usize>().ok()?;
    let dx = args[1].parse::<f32>().ok()?;
    let dy = args[2].parse::<f32>().ok()?;
    let dz = args[3].parse::<f32>().ok()?;
    Some((index, Vec3::new(dx, dy, dz)))
}

/// Parse a single object-index argument.
fn parse_index(args: &[&str]) -> Option<usize> {
    if args.len() != 1 {
        return None;
    }
    args[0].parse::<usize>().ok()
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}

/// Prompt for an `f32` value.  Returns `default` when the input is invalid.
fn prompt_f32(msg: &str, default: f32) -> f32 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<f32>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid length, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a `u32` value.  Returns `default` when the input is invalid.
fn prompt_u32(msg: &str, default: u32) -> u32 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid rate, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config {
            ledger_path: String::new(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn demo_session_runs_the_whole_protocol() {
        let cfg = offline_config();
        let mut demo = DemoSession::start(&cfg, 0.0).await.expect("session");

        demo.calibrate().await.expect("calibrate");
        assert_eq!(demo.observer_phase(), SharePhase::FrameReady);

        demo.spawn().await.expect("spawn");
        demo.move_object(0, Vec3::new(0.5, 0.0, -0.3))
            .await
            .expect("move");
        let error = demo.agreement_error(0).expect("both clients see it");
        assert!(error < 1e-3, "agreement error {error} m");

        demo.take(0).await.expect("take");
        demo.move_object(0, Vec3::new(0.0, 0.2, 0.0))
            .await
            .expect("move as observer");
        let error = demo.agreement_error(0).expect("both clients see it");
        assert!(error < 1e-3, "agreement error {error} m");

        demo.reset().await.expect("reset");
        demo.leave().await.expect("leave");
    }

    #[tokio::test]
    async fn noisy_demo_still_agrees_to_centimetres() {
        let cfg = offline_config();
        let mut demo = DemoSession::start(&cfg, cfg.demo_noise)
            .await
            .expect("session");

        demo.calibrate().await.expect("calibrate");
        assert_eq!(demo.observer_phase(), SharePhase::FrameReady);

        demo.spawn().await.expect("spawn");
        demo.move_object(0, Vec3::new(0.4, 0.1, 0.2))
            .await
            .expect("move");
        let error = demo.agreement_error(0).expect("both clients see it");
        assert!(error < 0.05, "agreement error {error} m");
    }

    #[test]
    fn parse_move_accepts_index_and_delta() {
        let (index, delta) = parse_move(&["2", "0.5", "-0.1", "0"]).expect("parse");
        assert_eq!(index, 2);
        assert!((delta.x - 0.5).abs() < 1e-6);
        assert!((delta.y + 0.1).abs() < 1e-6);
        assert!(delta.z.abs() < 1e-6);
    }

    #[test]
    fn parse_move_rejects_bad_input() {
        assert!(parse_move(&[]).is_none());
        assert!(parse_move(&["0", "1.0"]).is_none());
        assert!(parse_move(&["x", "1", "2", "3"]).is_none());
        assert!(parse_move(&["0", "a", "2", "3"]).is_none());
    }

    #[test]
    fn parse_index_accepts_a_single_number() {
        assert_eq!(parse_index(&["3"]), Some(3));
        assert!(parse_index(&[]).is_none());
        assert!(parse_index(&["3", "4"]).is_none());
        assert!(parse_index(&["three"]).is_none());
    }
}

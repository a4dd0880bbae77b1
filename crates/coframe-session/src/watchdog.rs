//! [`Watchdog`] – liveness monitor for the sharing pipeline.
//!
//! A secondary that never locates its anchors would otherwise wait forever
//! in silence, never joining the shared frame and never telling anyone why.
//! Every long-running stage registers here with a deadline; the anchor
//! watcher heartbeats on each located-anchor event, the state stream on each
//! incoming frame.  A supervisor loop calls [`Watchdog::check_all`] and
//! turns stalls into session alerts, then [`Watchdog::disarm`]s the stage so
//! the alert fires once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Liveness reported for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// The stage has signalled within its deadline.
    Alive,
    /// The stage has been silent past its deadline.
    Stalled,
}

/// A stage whose deadline has been exceeded, and for how long it has been
/// quiet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledComponent {
    /// Registered stage name.
    pub component: String,
    /// Time since the last heartbeat (or since registration).
    pub silent_for: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct StageEntry {
    last_signal: Instant,
    deadline: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from registered pipeline stages and reports the ones
/// that have gone quiet.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use coframe_session::{Liveness, Watchdog};
///
/// let mut wd = Watchdog::new();
/// wd.register("anchor-locate", Duration::from_secs(30));
/// wd.heartbeat("anchor-locate");
///
/// assert_eq!(wd.liveness("anchor-locate"), Liveness::Alive);
/// ```
#[derive(Default)]
pub struct Watchdog {
    stages: HashMap<String, StageEntry>,
}

impl Watchdog {
    /// Create an empty watchdog with no registered stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` with a maximum silence `deadline`.
    ///
    /// The stage's last-signal timestamp is initialised to now, so it starts
    /// out [`Liveness::Alive`].  Re-registering an existing stage resets its
    /// deadline.
    pub fn register(&mut self, component: &str, deadline: Duration) {
        self.stages.insert(
            component.to_string(),
            StageEntry {
                last_signal: Instant::now(),
                deadline,
            },
        );
    }

    /// Stop watching `component`, e.g. once its stage has completed or its
    /// stall has already been reported.  No-ops for unknown stages.
    pub fn disarm(&mut self, component: &str) {
        self.stages.remove(component);
    }

    /// Record a heartbeat for `component`, resetting its deadline.
    ///
    /// No-ops for stages that have not been registered.
    pub fn heartbeat(&mut self, component: &str) {
        if let Some(entry) = self.stages.get_mut(component) {
            entry.last_signal = Instant::now();
        }
    }

    /// Return the [`Liveness`] of `component`.
    ///
    /// Returns [`Liveness::Stalled`] for unknown stages.
    pub fn liveness(&self, component: &str) -> Liveness {
        match self.stages.get(component) {
            Some(entry) if entry.last_signal.elapsed() <= entry.deadline => Liveness::Alive,
            _ => Liveness::Stalled,
        }
    }

    /// Return every stage whose silence deadline has been exceeded, sorted
    /// by name so repeated sweeps report in a stable order.
    pub fn check_all(&self) -> Vec<StalledComponent> {
        let mut stalled: Vec<StalledComponent> = self
            .stages
            .iter()
            .filter(|(_, entry)| entry.last_signal.elapsed() > entry.deadline)
            .map(|(component, entry)| StalledComponent {
                component: component.clone(),
                silent_for: entry.last_signal.elapsed(),
            })
            .collect();
        stalled.sort_by(|a, b| a.component.cmp(&b.component));
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_stage_is_alive() {
        let mut wd = Watchdog::new();
        wd.register("anchor-locate", Duration::from_secs(5));
        assert_eq!(wd.liveness("anchor-locate"), Liveness::Alive);
    }

    #[test]
    fn heartbeat_resets_deadline() {
        let mut wd = Watchdog::new();
        wd.register("state-stream", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(10));
        wd.heartbeat("state-stream");
        thread::sleep(Duration::from_millis(10));
        // Still within deadline thanks to the recent heartbeat.
        assert_eq!(wd.liveness("state-stream"), Liveness::Alive);
    }

    #[test]
    fn stage_stalls_when_silent() {
        let mut wd = Watchdog::new();
        wd.register("anchor-locate", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.liveness("anchor-locate"), Liveness::Stalled);
    }

    #[test]
    fn check_all_reports_only_stalled_stages() {
        let mut wd = Watchdog::new();
        wd.register("anchor-locate", Duration::from_millis(20));
        wd.register("state-stream", Duration::from_secs(60));

        thread::sleep(Duration::from_millis(30));

        let stalled = wd.check_all();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].component, "anchor-locate");
        assert!(stalled[0].silent_for >= Duration::from_millis(30));
    }

    #[test]
    fn check_all_is_sorted_by_name() {
        let mut wd = Watchdog::new();
        wd.register("state-stream", Duration::from_millis(10));
        wd.register("anchor-locate", Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));

        let stalled = wd.check_all();
        assert_eq!(stalled.len(), 2);
        assert_eq!(stalled[0].component, "anchor-locate");
        assert_eq!(stalled[1].component, "state-stream");
    }

    #[test]
    fn disarm_stops_watching() {
        let mut wd = Watchdog::new();
        wd.register("anchor-locate", Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wd.check_all().len(), 1);

        wd.disarm("anchor-locate");
        assert!(wd.check_all().is_empty());
    }

    #[test]
    fn unknown_stage_is_stalled() {
        let wd = Watchdog::new();
        assert_eq!(wd.liveness("ghost"), Liveness::Stalled);
    }

    #[test]
    fn heartbeat_on_unknown_stage_is_noop() {
        let mut wd = Watchdog::new();
        // Should not panic.
        wd.heartbeat("ghost");
    }

    #[test]
    fn reregister_resets_timer() {
        let mut wd = Watchdog::new();
        wd.register("anchor-locate", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.liveness("anchor-locate"), Liveness::Stalled);

        wd.register("anchor-locate", Duration::from_secs(60));
        assert_eq!(wd.liveness("anchor-locate"), Liveness::Alive);
    }
}

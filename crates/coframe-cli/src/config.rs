//! Configuration vault – reads/writes `~/.coframe/config.toml`.

use coframe_space::TriangleLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted user configuration stored in `~/.coframe/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name shown for this operator's client in logs and the shell.
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Room the demo session joins.
    #[serde(default = "default_room")]
    pub room: String,

    /// Calibration triangle leg along the shared X axis, in metres.
    #[serde(default = "default_x_leg")]
    pub x_leg: f32,

    /// Calibration triangle leg along the shared Y axis, in metres.
    #[serde(default = "default_y_leg")]
    pub y_leg: f32,

    /// Accepted deviation of located side lengths, as a fraction of each
    /// side (0.1 = 10%).
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Outgoing state-stream cadence in updates per second.
    #[serde(default = "default_stream_hz")]
    pub stream_hz: u32,

    /// Anchor lifetime on the cloud service, in days.
    #[serde(default = "default_anchor_ttl_days")]
    pub anchor_ttl_days: i64,

    /// Locating jitter applied to the demo observer's simulated anchor
    /// service, in metres.  Zero makes the demo exact.
    #[serde(default = "default_demo_noise")]
    pub demo_noise: f32,

    /// Path of the persistent anchor ledger database.  Empty disables the
    /// ledger.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ledger_path: String,
}

fn default_display_name() -> String {
    "operator".to_string()
}
fn default_room() -> String {
    "shared-room".to_string()
}
fn default_x_leg() -> f32 {
    0.4
}
fn default_y_leg() -> f32 {
    0.3
}
fn default_tolerance() -> f32 {
    0.1
}
fn default_stream_hz() -> u32 {
    10
}
fn default_anchor_ttl_days() -> i64 {
    3
}
fn default_demo_noise() -> f32 {
    0.002
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            room: default_room(),
            x_leg: default_x_leg(),
            y_leg: default_y_leg(),
            tolerance: default_tolerance(),
            stream_hz: default_stream_hz(),
            anchor_ttl_days: default_anchor_ttl_days(),
            demo_noise: default_demo_noise(),
            ledger_path: String::new(),
        }
    }
}

impl Config {
    /// Build the triangle layout these settings describe.
    pub fn layout(&self) -> Result<TriangleLayout, String> {
        TriangleLayout::new(self.x_leg, self.y_leg)
            .map(|layout| layout.with_tolerance(self.tolerance))
            .map_err(|e| format!("Invalid triangle settings: {}", e))
    }
}

/// Return the path to `~/.coframe/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".coframe").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `COFRAME_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `COFRAME_NAME` | `display_name` |
/// | `COFRAME_ROOM` | `room` |
/// | `COFRAME_STREAM_HZ` | `stream_hz` |
/// | `COFRAME_LEDGER_PATH` | `ledger_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("COFRAME_NAME") {
        cfg.display_name = v;
    }
    if let Ok(v) = std::env::var("COFRAME_ROOM") {
        cfg.room = v;
    }
    if let Ok(v) = std::env::var("COFRAME_STREAM_HZ")
        && let Ok(hz) = v.parse::<u32>() {
            cfg.stream_hz = hz;
        }
    if let Ok(v) = std::env::var("COFRAME_LEDGER_PATH") {
        cfg.ledger_path = v;
    }
}

/// Save the config to disk, creating `~/.coframe/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_meta = std::fs::metadata(&path).expect("file metadata");
        let file_mode = file_meta.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        let dir_mode = dir_meta.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.display_name, "operator");
        assert_eq!(loaded.room, "shared-room");
        assert_eq!(loaded.stream_hz, 10);
        assert_eq!(loaded.anchor_ttl_days, 3);
        assert!((loaded.x_leg - 0.4).abs() < 1e-6);
        assert!((loaded.y_leg - 0.3).abs() < 1e-6);
        assert!((loaded.demo_noise - 0.002).abs() < 1e-6);
    }

    #[test]
    fn config_path_points_to_coframe_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".coframe"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn layout_rejects_equal_legs() {
        let cfg = Config {
            x_leg: 0.3,
            y_leg: 0.3,
            ..Config::default()
        };
        assert!(cfg.layout().is_err());
    }

    #[test]
    fn layout_uses_configured_dimensions() {
        let cfg = Config {
            x_leg: 0.5,
            y_leg: 0.2,
            tolerance: 0.05,
            ..Config::default()
        };
        let layout = cfg.layout().expect("valid layout");
        assert!((layout.x_leg() - 0.5).abs() < 1e-6);
        assert!((layout.y_leg() - 0.2).abs() < 1e-6);
        assert!((layout.tolerance() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn apply_env_overrides_changes_room() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("COFRAME_ROOM", "lab-7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.room, "lab-7");
        unsafe { std::env::remove_var("COFRAME_ROOM") };
    }

    #[test]
    fn apply_env_overrides_changes_name() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("COFRAME_NAME", "bench-rig") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.display_name, "bench-rig");
        unsafe { std::env::remove_var("COFRAME_NAME") };
    }

    #[test]
    fn apply_env_overrides_parses_stream_hz_and_ignores_garbage() {
        // SAFETY: no other test touches this variable; no data races.
        unsafe { std::env::set_var("COFRAME_STREAM_HZ", "not-a-rate") };
        let mut cfg = Config::default();
        let original = cfg.stream_hz;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.stream_hz, original);

        unsafe { std::env::set_var("COFRAME_STREAM_HZ", "30") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.stream_hz, 30);
        unsafe { std::env::remove_var("COFRAME_STREAM_HZ") };
    }
}

/// Tracker configuration: persisted as TOML in the config directory.
///
/// The directory defaults to the working directory and can be moved with
/// `PARTY_DEFENCE_CONFIG_DIR`. A missing file means defaults; an empty
/// `feed_path` means the engine idles until one is configured.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

const LOW_DEFENCE_MIN: u32 = 1;
const LOW_DEFENCE_MAX: u32 = 50;

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// JSON-lines feed the game client appends events and party messages to.
    #[serde(default)]
    pub feed_path: PathBuf,

    /// Where outbound party messages are appended (empty = not written).
    #[serde(default)]
    pub party_out_path: PathBuf,

    /// This client's id on the party bus.
    #[serde(default)]
    pub member_id: u64,

    /// Defence at or below this shows as "low" (1–50).
    #[serde(default = "default_low_defence_threshold")]
    pub low_defence_threshold: u32,

    /// Show an infobox when vulnerability lands.
    #[serde(default = "default_true")]
    pub show_vulnerability: bool,

    /// Show the keris effect countdown.
    #[serde(default = "default_true")]
    pub show_tracked_weapon: bool,

    /// Challenge-mode answer until the layout solver reports one.
    #[serde(default)]
    pub challenge_mode: bool,
}

fn default_low_defence_threshold() -> u32 { 10 }
fn default_true() -> bool { true }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            feed_path:             PathBuf::new(),
            party_out_path:        PathBuf::new(),
            member_id:             0,
            low_defence_threshold: default_low_defence_threshold(),
            show_vulnerability:    true,
            show_tracked_weapon:   true,
            challenge_mode:        false,
        }
    }
}

impl TrackerConfig {
    pub fn party_out(&self) -> Option<PathBuf> {
        (!self.party_out_path.as_os_str().is_empty()).then(|| self.party_out_path.clone())
    }

    fn normalise(mut self) -> Self {
        let clamped = self.low_defence_threshold.clamp(LOW_DEFENCE_MIN, LOW_DEFENCE_MAX);
        if clamped != self.low_defence_threshold {
            tracing::warn!(
                "low_defence_threshold {} out of range, using {}",
                self.low_defence_threshold, clamped
            );
            self.low_defence_threshold = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn config_dir() -> PathBuf {
    std::env::var("PARTY_DEFENCE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

pub fn load_or_default(config_dir: &Path) -> Result<TrackerConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: TrackerConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg.normalise())
    } else {
        Ok(TrackerConfig::default())
    }
}

/// `load_or_default`, but on first run the defaults are also written out so
/// the user has a file to fill in. A failed write only costs that file.
pub fn load_or_init(config_dir: &Path) -> Result<TrackerConfig> {
    let cfg = load_or_default(config_dir)?;
    let path = config_dir.join(CONFIG_FILE);
    if !path.exists() {
        match save(&cfg, config_dir) {
            Ok(()) => tracing::info!("Wrote default config to {:?}", path),
            Err(e) => tracing::warn!("Could not write default config: {}", e),
        }
    }
    Ok(cfg)
}

pub fn save(config: &TrackerConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_config() {
        let dir = tempdir().unwrap();
        let mut cfg = TrackerConfig::default();
        cfg.low_defence_threshold = 25;
        cfg.show_vulnerability    = false;
        cfg.member_id             = 4411;
        cfg.feed_path             = PathBuf::from("/tmp/feed.jsonl");

        save(&cfg, dir.path()).unwrap();

        let loaded = load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn returns_default_when_missing() {
        let dir = tempdir().unwrap();
        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.low_defence_threshold, 10);
        assert!(cfg.show_tracked_weapon);
        assert!(cfg.feed_path.as_os_str().is_empty());
        assert_eq!(cfg.party_out(), None);
    }

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempdir().unwrap();
        let cfg_dir = dir.path().join("nested");
        let cfg = load_or_init(&cfg_dir).unwrap();
        assert_eq!(cfg, TrackerConfig::default());
        assert!(cfg_dir.join(CONFIG_FILE).exists());

        // An existing file is read, never overwritten
        std::fs::write(cfg_dir.join(CONFIG_FILE), "member_id = 12\n").unwrap();
        assert_eq!(load_or_init(&cfg_dir).unwrap().member_id, 12);
        assert_eq!(std::fs::read_to_string(cfg_dir.join(CONFIG_FILE)).unwrap(), "member_id = 12\n");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "member_id = 7\n").unwrap();
        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.member_id, 7);
        assert!(cfg.show_vulnerability);
    }

    #[test]
    fn threshold_is_clamped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "low_defence_threshold = 90\n").unwrap();
        assert_eq!(load_or_default(dir.path()).unwrap().low_defence_threshold, 50);
        std::fs::write(dir.path().join(CONFIG_FILE), "low_defence_threshold = 0\n").unwrap();
        assert_eq!(load_or_default(dir.path()).unwrap().low_defence_threshold, 1);
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "member_id = \"abc\"").unwrap();
        assert!(load_or_default(dir.path()).is_err());
    }
}

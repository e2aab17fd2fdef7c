/// Boss registry: embedded at compile time from `data/bosses.toml`.
///
/// The table maps a boss display name to its base defence, the regions the
/// fight can happen in, and the raid it belongs to. It is parsed exactly once
/// into an immutable registry; nothing mutates it afterwards.
///
/// Names coming from the client may carry colour markup (`<col=00ffff>Obelisk</col>`)
/// so every lookup strips tags and compares case-insensitively. Tekton is the
/// one boss matched by substring because its actor is renamed while enraged.
use crate::error::TrackerError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Canonical names the weapon rules and state machine single out
// ---------------------------------------------------------------------------

pub const TEKTON:            &str = "Tekton";
pub const SOTETSEG:          &str = "Sotetseg";
pub const XARPUS:            &str = "Xarpus";
pub const PESTILENT_BLOAT:   &str = "Pestilent Bloat";
pub const CORPOREAL_BEAST:   &str = "Corporeal Beast";
pub const KRIL_TSUTSAROTH:   &str = "K'ril Tsutsaroth";
pub const ABYSSAL_SIRE:      &str = "Abyssal Sire";
pub const TUMEKENS_WARDEN:   &str = "Tumeken's Warden";
pub const ELIDINIS_WARDEN:   &str = "Elidinis' Warden";

// ---------------------------------------------------------------------------
// Embedded TOML data
// ---------------------------------------------------------------------------

const BOSS_DATA: &str = include_str!("../data/bosses.toml");

#[derive(Deserialize)]
struct TomlFile {
    boss: Vec<TomlBoss>,
}

#[derive(Deserialize)]
struct TomlBoss {
    name:                 String,
    base_defence:         f64,
    #[serde(default)]
    regions:              Vec<u32>,
    raid:                 Option<Raid>,
    #[serde(default)]
    match_contains:       bool,
    challenge_multiplier: Option<f64>,
    defence_floor:        Option<f64>,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Raid {
    /// Chambers of Xeric: defence scales with party size and challenge mode.
    Cox,
    Tob,
    Toa,
}

#[derive(Debug, Clone)]
pub struct BossInfo {
    pub name:                 String,
    pub base_defence:         f64,
    /// Empty when the boss can be fought anywhere.
    pub regions:              Vec<u32>,
    pub raid:                 Option<Raid>,
    pub match_contains:       bool,
    pub challenge_multiplier: f64,
    pub defence_floor:        f64,
}

impl BossInfo {
    pub fn is(&self, canonical: &str) -> bool {
        self.name.eq_ignore_ascii_case(canonical)
    }

    /// Party size and challenge mode only affect Chambers bosses.
    pub fn scales_with_party(&self) -> bool {
        self.raid == Some(Raid::Cox)
    }
}

#[derive(Debug, Default)]
pub struct BossRegistry {
    bosses:  Vec<BossInfo>,
    by_name: HashMap<String, usize>,
}

impl BossRegistry {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let file: TomlFile = toml::from_str(raw)?;
        let mut registry = Self::default();
        for b in file.boss {
            let info = BossInfo {
                name:                 b.name,
                base_defence:         b.base_defence,
                regions:              b.regions,
                raid:                 b.raid,
                match_contains:       b.match_contains,
                challenge_multiplier: b.challenge_multiplier.unwrap_or(1.0),
                defence_floor:        b.defence_floor.unwrap_or(0.0),
            };
            registry.by_name.insert(info.name.to_lowercase(), registry.bosses.len());
            registry.bosses.push(info);
        }
        Ok(registry)
    }

    /// Resolve a client-reported actor name to its registry entry.
    pub fn resolve(&self, name: &str) -> Option<&BossInfo> {
        let key = strip_tags(name).trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(&i) = self.by_name.get(&key) {
            return Some(&self.bosses[i]);
        }
        self.bosses
            .iter()
            .find(|b| b.match_contains && key.contains(&b.name.to_lowercase()))
    }

    pub fn lookup_base_defence(&self, name: &str) -> Result<f64, TrackerError> {
        self.resolve(name)
            .map(|b| b.base_defence)
            .ok_or_else(|| TrackerError::UnknownBoss(name.to_owned()))
    }

    pub fn is_tracked_boss_name(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// True when both names refer to the same logical encounter
    /// ("Tekton (enraged)" and "Tekton" are the same fight).
    pub fn same_boss(&self, a: &str, b: &str) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(x), Some(y)) => x.name == y.name,
            _ => strip_tags(a).eq_ignore_ascii_case(&strip_tags(b)),
        }
    }

    pub fn len(&self) -> usize {
        self.bosses.len()
    }
}

static REGISTRY: Lazy<BossRegistry> = Lazy::new(|| match BossRegistry::from_toml(BOSS_DATA) {
    Ok(r) => {
        tracing::debug!("Boss registry loaded: {} entries", r.len());
        r
    }
    Err(e) => {
        tracing::error!("Embedded boss table failed to parse: {}", e);
        BossRegistry::default()
    }
});

/// The process-wide registry built from the embedded table.
pub fn registry() -> &'static BossRegistry {
    &REGISTRY
}

/// Remove `<...>` markup from a client string, keeping the visible text.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

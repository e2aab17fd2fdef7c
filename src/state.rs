/// Defence state machine: the one owner of "which boss, how much defence".
///
/// All state lives in a single `DefenceTracker` owned by the engine task and
/// mutated through the `on_*` reducers below. No locking is needed because
/// the engine is single-threaded. Every reducer either applies its whole
/// transition or returns without touching anything.
///
///   Idle ──(special / peer update names a registry boss)──▶ Engaged
///   Engaged ──(weapon effect, vulnerability decay)──▶ Engaged
///   Engaged ──(death report, region exit, shutdown)──▶ Idle
use crate::{
    bosses::{registry, strip_tags, BossInfo, ELIDINIS_WARDEN, PESTILENT_BLOAT, SOTETSEG, TUMEKENS_WARDEN, XARPUS},
    config::TrackerConfig,
    error::TrackerError,
    ipc::{DefenceBand, RenderCommand},
    layout::LayoutSolver,
    party::{DefenceUpdate, SpecialAttackUpdate, TrackedWeaponUpdate},
    queue::SpecQueue,
    region::is_in_trackable_region,
    rules::{apply_weapon_effect, clamp_defence, RuleContext, RuleInput},
    world::Env,
};

// ---------------------------------------------------------------------------
// Game constants
// ---------------------------------------------------------------------------

/// Local player animation when Sotetseg drags the party into the maze.
pub const SOTETSEG_MAZE_ANIMATION: u32 = 1816;
pub const SOTETSEG_MAZE_DEFENCE:   f64 = 200.0;
pub const BLOAT_DOWN_ANIMATION:    u32 = 8082;
pub const WARDEN_ENRAGE_ANIMATION: u32 = 9685;
pub const WARDEN_ENRAGED_DEFENCE:  f64 = 60.0;
pub const HM_XARPUS_IDS: std::ops::RangeInclusive<u32> = 10770..=10772;
pub const HM_XARPUS_DEFENCE:       f64 = 200.0;
/// Defence lost every time vulnerability lands.
pub const VULNERABILITY_DRAIN:     f64 = 0.10;
pub const TRACKED_WEAPON_TICKS:    u32 = 9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BossEncounter {
    /// Display name as reported; may contain colour tags.
    pub name:      String,
    pub npc_index: u32,
    pub defence:   f64,
    pub boss:      &'static BossInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Engaged,
}

/// What a reducer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Baselined,
    Updated,
    Queued,
    Reset,
    Unchanged,
}

/// Challenge mode, latched once per Chambers raid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaidMode {
    pub challenge_mode: bool,
    pub latched:        bool,
}

/// Who an animation belongs to, resolved by the engine.
#[derive(Debug, Clone, Copy)]
pub enum AnimatedActor<'a> {
    LocalPlayer,
    Player,
    Npc { index: u32, name: Option<&'a str> },
}

#[derive(Debug)]
pub struct DefenceTracker {
    encounter:            Option<BossEncounter>,
    queue:                SpecQueue,
    raid:                 RaidMode,
    hm_xarpus:            bool,
    bloat_down:           bool,
    tracked_weapon_ticks: Option<u32>,
    defence_shown:        bool,
    vulnerability_shown:  bool,
    low_threshold:        u32,
    show_vulnerability:   bool,
    show_tracked_weapon:  bool,
    render:               Vec<RenderCommand>,
}

impl DefenceTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            encounter:            None,
            queue:                SpecQueue::default(),
            raid:                 RaidMode::default(),
            hm_xarpus:            false,
            bloat_down:           false,
            tracked_weapon_ticks: None,
            defence_shown:        false,
            vulnerability_shown:  false,
            low_threshold:        config.low_defence_threshold,
            show_vulnerability:   config.show_vulnerability,
            show_tracked_weapon:  config.show_tracked_weapon,
            render:               Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        if self.encounter.is_some() { Phase::Engaged } else { Phase::Idle }
    }

    pub fn encounter(&self) -> Option<&BossEncounter> {
        self.encounter.as_ref()
    }

    pub fn defence(&self) -> Option<f64> {
        self.encounter.as_ref().map(|e| e.defence)
    }

    pub fn queue(&self) -> &SpecQueue {
        &self.queue
    }

    pub fn raid_mode(&self) -> RaidMode {
        self.raid
    }

    pub fn tracked_weapon_ticks(&self) -> Option<u32> {
        self.tracked_weapon_ticks
    }

    /// Does `name` refer to the boss currently tracked?
    pub fn is_tracking(&self, name: &str) -> bool {
        self.encounter
            .as_ref()
            .is_some_and(|e| registry().same_boss(&e.name, name))
    }

    pub fn in_trackable_region(&self, env: &Env) -> bool {
        is_in_trackable_region(self.encounter.as_ref().map(|e| e.boss), &env.region)
    }

    pub fn take_render(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.render)
    }

    // -----------------------------------------------------------------------
    // Reducers
    // -----------------------------------------------------------------------

    /// A special attack reported by the special counter (ours or a peer's).
    pub fn on_special_attack(
        &mut self,
        update:   &SpecialAttackUpdate,
        npc_name: Option<&str>,
        env:      &Env,
    ) -> Result<Transition, TrackerError> {
        check_world(update.npc_index, update.world, env)?;

        let known_name = npc_name.filter(|n| registry().is_tracked_boss_name(n));
        let tracked = self.tracked_index() == Some(update.npc_index);

        let baselined = match (tracked, known_name) {
            (true, _) => false,
            (false, Some(name)) => self.confirm(name, update.npc_index, env)?,
            (false, None) => {
                tracing::debug!(
                    "Queueing {:?} ({}) against unidentified npc {}",
                    update.weapon, update.hit, update.npc_index
                );
                self.queue.enqueue(update.npc_index, update.weapon, update.hit);
                return Ok(Transition::Queued);
            }
        };

        if !self.in_trackable_region(env) {
            return Ok(if baselined { Transition::Baselined } else { Transition::Unchanged });
        }

        self.apply(RuleInput { weapon: update.weapon, hit: update.hit }, env);
        self.show_defence();
        Ok(Transition::Updated)
    }

    /// Vulnerability landed on the boss, or a member reports it dead.
    pub fn on_defence_update(&mut self, update: &DefenceUpdate, env: &Env) -> Result<Transition, TrackerError> {
        check_world(update.npc_index, update.world, env)?;

        if !update.is_alive {
            let ours = match &self.encounter {
                Some(e) => e.npc_index == update.npc_index || registry().same_boss(&e.name, &update.boss_name),
                None => true,
            };
            if !ours {
                return Ok(Transition::Unchanged);
            }
            tracing::info!("'{}' reported dead, resetting", update.boss_name);
            self.reset();
            return Ok(Transition::Reset);
        }

        let baselined = self.confirm(&update.boss_name, update.npc_index, env)?;

        if !self.in_trackable_region(env) {
            return Ok(if baselined { Transition::Baselined } else { Transition::Unchanged });
        }

        let Some(enc) = self.encounter.as_mut() else {
            return Ok(Transition::Unchanged);
        };
        enc.defence = clamp_defence(enc.defence - enc.defence * VULNERABILITY_DRAIN, enc.boss);
        tracing::debug!("Vulnerability on '{}' → {:.1}", enc.name, enc.defence);

        if self.show_vulnerability {
            let tooltip = strip_tags(&enc.name);
            self.render.push(RenderCommand::ShowVulnerability { tooltip });
            self.vulnerability_shown = true;
        }
        self.show_defence();
        Ok(Transition::Updated)
    }

    /// A party member's keris spec connected.
    pub fn on_tracked_weapon_update(
        &mut self,
        update:   &TrackedWeaponUpdate,
        npc_name: Option<&str>,
        env:      &Env,
    ) -> Result<Transition, TrackerError> {
        check_world(update.npc_index, update.world, env)?;

        let known_name = npc_name.filter(|n| registry().is_tracked_boss_name(n));
        let tracked = self.tracked_index() == Some(update.npc_index);

        let baselined = match (tracked, known_name) {
            (true, _) => false,
            (false, Some(name)) => self.confirm(name, update.npc_index, env)?,
            (false, None) => {
                return Err(match npc_name {
                    Some(name) => TrackerError::UnknownBoss(name.to_owned()),
                    None => TrackerError::NoActiveEncounter(update.npc_index),
                })
            }
        };

        if update.hit_amount == 0 || !self.show_tracked_weapon || !self.in_trackable_region(env) {
            return Ok(if baselined { Transition::Baselined } else { Transition::Unchanged });
        }

        let tooltip = self.tooltip();
        self.tracked_weapon_ticks = Some(TRACKED_WEAPON_TICKS);
        self.render.push(RenderCommand::ShowTrackedWeapon { ticks_remaining: TRACKED_WEAPON_TICKS, tooltip });
        Ok(Transition::Updated)
    }

    pub fn on_actor_animation(&mut self, actor: AnimatedActor<'_>, animation: u32, env: &Env) -> Transition {
        match actor {
            AnimatedActor::LocalPlayer => {
                if animation == SOTETSEG_MAZE_ANIMATION && self.tracking_boss(SOTETSEG) && self.in_trackable_region(env) {
                    return self.force_defence(SOTETSEG_MAZE_DEFENCE);
                }
            }
            AnimatedActor::Npc { name: Some(name), .. } if name.eq_ignore_ascii_case(PESTILENT_BLOAT) => {
                self.bloat_down = animation == BLOAT_DOWN_ANIMATION;
            }
            AnimatedActor::Npc { .. } => {
                if animation == WARDEN_ENRAGE_ANIMATION
                    && (self.tracking_boss(TUMEKENS_WARDEN) || self.tracking_boss(ELIDINIS_WARDEN))
                {
                    return self.force_defence(WARDEN_ENRAGED_DEFENCE);
                }
            }
            AnimatedActor::Player => {}
        }
        Transition::Unchanged
    }

    pub fn on_npc_spawn(&mut self, npc_id: u32, name: &str) {
        if registry().is_tracked_boss_name(name) {
            self.hm_xarpus = HM_XARPUS_IDS.contains(&npc_id);
        }
    }

    /// Position or varbits changed; drop the encounter if we walked out of it.
    pub fn on_region_or_mode_changed(&mut self, env: &Env) -> Transition {
        if self.encounter.is_some() && !self.in_trackable_region(env) {
            tracing::info!("Left the encounter region, resetting");
            self.reset();
            return Transition::Reset;
        }
        Transition::Unchanged
    }

    /// Back in the Chambers lobby: the next raid needs its mode re-latched.
    pub fn on_raid_lobby(&mut self) {
        if self.raid.latched {
            tracing::debug!("Raid mode unlatched in lobby");
        }
        self.raid = RaidMode::default();
    }

    pub fn latch_raid_mode(&mut self, challenge_mode: bool) {
        self.raid = RaidMode { challenge_mode, latched: true };
        tracing::info!("Raid mode latched: challenge_mode={}", challenge_mode);
    }

    pub fn on_tick<L: LayoutSolver + ?Sized>(&mut self, env: &Env, layout: &L) {
        if let Some(ticks) = self.tracked_weapon_ticks {
            if ticks <= 1 {
                self.tracked_weapon_ticks = None;
                self.render.push(RenderCommand::RemoveTrackedWeapon);
            } else {
                let ticks_remaining = ticks - 1;
                self.tracked_weapon_ticks = Some(ticks_remaining);
                let tooltip = self.tooltip();
                self.render.push(RenderCommand::ShowTrackedWeapon { ticks_remaining, tooltip });
            }
        }

        if !self.raid.latched && env.in_raid {
            self.latch_raid_mode(layout.is_challenge_mode());
        }
    }

    /// The local player's keris target changed to an NPC never hit before.
    pub fn clear_tracked_weapon(&mut self) {
        if self.tracked_weapon_ticks.take().is_some() {
            self.render.push(RenderCommand::RemoveTrackedWeapon);
        }
    }

    pub fn reset(&mut self) {
        self.encounter = None;
        self.queue.clear();
        self.bloat_down = false;
        self.raid = RaidMode::default();
        if std::mem::take(&mut self.defence_shown) {
            self.render.push(RenderCommand::RemoveDefence);
        }
        if std::mem::take(&mut self.vulnerability_shown) {
            self.render.push(RenderCommand::RemoveVulnerability);
        }
        self.clear_tracked_weapon();
    }

    pub fn shutdown(&mut self) {
        self.reset();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn tracked_index(&self) -> Option<u32> {
        self.encounter.as_ref().map(|e| e.npc_index)
    }

    fn tracking_boss(&self, canonical: &str) -> bool {
        self.encounter.as_ref().is_some_and(|e| e.boss.is(canonical))
    }

    /// Make `name`/`npc_index` the tracked encounter. Returns true when a
    /// new baseline was computed; re-confirming the same boss under another
    /// index only moves the index.
    fn confirm(&mut self, name: &str, npc_index: u32, env: &Env) -> Result<bool, TrackerError> {
        if let Some(enc) = self.encounter.as_mut() {
            if registry().same_boss(&enc.name, name) {
                if enc.npc_index != npc_index {
                    tracing::debug!("'{}' moved from npc {} to {}", enc.name, enc.npc_index, npc_index);
                    enc.npc_index = npc_index;
                }
                return Ok(false);
            }
        }
        self.baseline(name, npc_index, env)?;
        Ok(true)
    }

    fn baseline(&mut self, name: &str, npc_index: u32, env: &Env) -> Result<(), TrackerError> {
        let boss = registry()
            .resolve(name)
            .ok_or_else(|| TrackerError::UnknownBoss(name.to_owned()))?;

        let mut defence = boss.base_defence;
        if boss.is(XARPUS) && self.hm_xarpus {
            defence = HM_XARPUS_DEFENCE;
        } else if boss.scales_with_party() {
            defence *= 1.0 + 0.01 * f64::from(env.party_size.saturating_sub(1));
            if self.raid.challenge_mode {
                defence *= boss.challenge_multiplier;
            }
        }

        tracing::info!("Tracking '{}' (npc {}), baseline defence {:.1}", name, npc_index, defence);
        self.encounter = Some(BossEncounter { name: name.to_owned(), npc_index, defence, boss });

        if let Some(queued) = self.queue.queued_index().filter(|&q| q != npc_index) {
            tracing::debug!("Discarding {} queued specs for npc {}", self.queue.len(), queued);
        }
        let backlog = self.queue.drain_if_matches(npc_index);
        if !backlog.is_empty() {
            tracing::debug!("Replaying {} queued specs on npc {}", backlog.len(), npc_index);
        }
        for spec in backlog {
            self.apply(spec, env);
        }
        Ok(())
    }

    fn apply(&mut self, spec: RuleInput, env: &Env) {
        let bloat_down = self.bloat_down;
        let Some(enc) = self.encounter.as_mut() else {
            return;
        };
        let ctx = RuleContext {
            boss:      enc.boss,
            in_raid:   env.in_raid,
            in_region: is_in_trackable_region(Some(enc.boss), &env.region),
            bloat_down,
        };
        let before = enc.defence;
        enc.defence = apply_weapon_effect(enc.defence, &spec, &ctx);
        tracing::debug!(
            "{:?} ({}) on '{}': {:.1} → {:.1}",
            spec.weapon, spec.hit, enc.name, before, enc.defence
        );
    }

    fn force_defence(&mut self, value: f64) -> Transition {
        let Some(enc) = self.encounter.as_mut() else {
            return Transition::Unchanged;
        };
        tracing::info!("'{}' defence forced to {}", enc.name, value);
        enc.defence = value;
        if std::mem::take(&mut self.defence_shown) {
            self.render.push(RenderCommand::RemoveDefence);
        }
        Transition::Updated
    }

    fn show_defence(&mut self) {
        let Some(enc) = &self.encounter else {
            return;
        };
        let value = enc.defence.round() as i64;
        let band = if value <= 0 {
            DefenceBand::Zero
        } else if value <= i64::from(self.low_threshold) {
            DefenceBand::Low
        } else {
            DefenceBand::Normal
        };
        self.render.push(RenderCommand::ShowDefence { value, tooltip: enc.name.clone(), band });
        self.defence_shown = true;
    }

    fn tooltip(&self) -> String {
        self.encounter.as_ref().map(|e| strip_tags(&e.name)).unwrap_or_default()
    }
}

fn check_world(npc_index: u32, world: u32, env: &Env) -> Result<(), TrackerError> {
    if world != env.local_world {
        return Err(TrackerError::StaleMessage { npc_index, world, local_world: env.local_world });
    }
    Ok(())
}

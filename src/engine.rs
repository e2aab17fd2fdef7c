/// Tracker engine: the single writer of all tracker state.
///
/// Receives typed game events and party envelopes via channels, folds the
/// events into the `WorldView`, drives the `DefenceTracker` reducers, and
/// forwards render commands to the IPC layer and outbound party messages to
/// the transport.
///
/// Party messages are never applied the moment they arrive. They are parked
/// in an inbox and drained at the next tick boundary, after that tick's
/// deferred actions have run, so every member applies them at the same
/// point in its own tick order.
use crate::{
    bosses::{registry, strip_tags},
    config::TrackerConfig,
    error::TrackerError,
    ipc::RenderCommand,
    layout::LayoutSolver,
    parser::{ActorId, ChatKind, GameEvent},
    party::{
        DefenceUpdate, Deferred, Envelope, HitsplatCorrelator, MessageLog, PartyMessage,
        SpecialAttackUpdate, TrackedWeaponUpdate, TRACKED_WEAPON_HIT_DELAY, TRACKED_WEAPON_ITEM_ID,
    },
    rules::SpecialWeapon,
    state::{AnimatedActor, DefenceTracker},
    world::{LocalPlayer, NpcState, Var, WorldView},
};
use anyhow::Result;
use std::collections::VecDeque;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::oneshot;

/// Graphic shown on an NPC when vulnerability lands.
pub const VULNERABILITY_GRAPHIC: u32 = 169;
pub const RAID_START_MESSAGE: &str = "The raid has begun!";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Everything produced while handling one event.
#[derive(Debug, Default, PartialEq)]
pub struct EngineOutput {
    pub render:   Vec<RenderCommand>,
    pub outbound: Vec<PartyMessage>,
}

pub struct Engine<L: LayoutSolver> {
    tracker:    DefenceTracker,
    world:      WorldView,
    correlator: HitsplatCorrelator,
    /// Server tick on which the keris drained spec energy; resolved next tick.
    deferred:   Deferred<u32>,
    inbox:      VecDeque<Envelope>,
    seen:       MessageLog,
    layout:     L,
    member_id:  u64,
    outbound:   Vec<PartyMessage>,
}

impl<L: LayoutSolver> Engine<L> {
    pub fn new(config: &TrackerConfig, layout: L) -> Self {
        Self {
            tracker:    DefenceTracker::new(config),
            world:      WorldView::default(),
            correlator: HitsplatCorrelator::default(),
            deferred:   Deferred::default(),
            inbox:      VecDeque::new(),
            seen:       MessageLog::default(),
            layout,
            member_id:  config.member_id,
            outbound:   Vec::new(),
        }
    }

    pub fn tracker(&self) -> &DefenceTracker {
        &self.tracker
    }

    pub fn world(&self) -> &WorldView {
        &self.world
    }

    pub fn correlator(&self) -> &HitsplatCorrelator {
        &self.correlator
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Park a party message until the next tick boundary.
    pub fn enqueue_party(&mut self, env: Envelope) {
        self.inbox.push_back(env);
    }

    pub fn handle_game_event(&mut self, event: GameEvent) -> EngineOutput {
        match event {
            GameEvent::Tick { tick } => self.on_tick(tick),
            GameEvent::LocalPlayer { id, name, world } => {
                tracing::info!("Local player {} ({}) on world {}", name, id, world);
                self.world.local = Some(LocalPlayer { id, name });
                self.world.world = world;
            }
            GameEvent::NpcSpawned { index, id, name } => self.on_npc_spawn(index, id, name),
            GameEvent::NpcDespawned { index } => {
                self.world.npcs.remove(&index);
            }
            GameEvent::NpcHealth { index, health_ratio, is_dead } => {
                if let Some(npc) = self.world.npcs.get_mut(&index) {
                    npc.health_ratio = health_ratio;
                    npc.is_dead |= is_dead;
                }
            }
            GameEvent::Animation { actor, animation } => self.on_actor_animation(&actor, animation),
            GameEvent::Hitsplat { actor, amount, is_mine } => self.on_hitsplat(&actor, amount, is_mine),
            GameEvent::ActorDeath { actor } => self.on_actor_death(&actor),
            GameEvent::Graphic { actor, graphic } => self.on_graphic(&actor, graphic),
            GameEvent::ChatMessage { kind, message } => self.on_chat_message(kind, &message),
            GameEvent::VarbitChanged { var, value } => self.on_varbit_changed(var, value),
            GameEvent::PlayerMoved { region_id, map_regions } => {
                self.world.region_id = region_id;
                self.world.map_regions = map_regions;
                self.on_region_or_mode_changed();
            }
            GameEvent::EquipmentChanged { weapon_id } => self.world.weapon_id = weapon_id,
            GameEvent::InteractingChanged { target } => self.world.interacting = target,
            GameEvent::GameStateChanged { state } => self.layout.on_game_state_changed(state),
            GameEvent::PartyChanged { in_party } => {
                tracing::info!("Party membership: {}", in_party);
                self.world.in_party = in_party;
            }
            GameEvent::RaidLayout { challenge_mode } => self.layout.on_layout_reported(challenge_mode),
            GameEvent::SpecialAttack { npc_index, weapon, hit } => self.on_local_special(npc_index, weapon, hit),
        }
        self.take_output()
    }

    pub fn shutdown(&mut self) -> EngineOutput {
        tracing::info!("Tracker shutting down");
        self.tracker.shutdown();
        self.correlator.clear();
        self.inbox.clear();
        self.take_output()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Tick boundary: finish the previous tick, run deferred work, then
    /// apply everything the party sent since the last boundary.
    pub fn on_tick(&mut self, tick: u32) {
        self.world.tick = tick;
        let env = self.world.env();

        self.report_finished_boss();

        self.layout.on_tick(tick);
        self.tracker.on_tick(&env, &self.layout);

        if let Some((target, amount)) = self.correlator.on_tick(tick) {
            self.report_tracked_weapon_hit(target, amount);
        }

        if let Some(server_tick) = self.deferred.take_due(tick) {
            tracing::trace!("Resolving keris target for tick {}", server_tick);
            let target = self.world.interacting;
            self.on_weapon_special_used(target);
        }

        while let Some(env) = self.inbox.pop_front() {
            self.dispatch(env);
        }
    }

    pub fn on_actor_animation(&mut self, actor: &ActorId, animation: u32) {
        let env = self.world.env();
        let animated = match actor {
            ActorId::Player { name } => {
                let local = self.world.local.as_ref().is_some_and(|p| p.name.eq_ignore_ascii_case(name));
                if local { AnimatedActor::LocalPlayer } else { AnimatedActor::Player }
            }
            ActorId::Npc { index } => AnimatedActor::Npc { index: *index, name: self.world.npc_name(*index) },
        };
        self.tracker.on_actor_animation(animated, animation, &env);
    }

    pub fn on_hitsplat(&mut self, actor: &ActorId, amount: u32, is_mine: bool) {
        let ActorId::Npc { index } = actor else {
            return;
        };
        let outcome = self.correlator.on_hitsplat(*index, amount, is_mine, self.world.tick);
        if outcome.new_target {
            self.tracker.clear_tracked_weapon();
        }
        if outcome.recorded {
            tracing::trace!("Keris hitsplat candidate {} on npc {}", amount, index);
        }
    }

    pub fn on_npc_spawn(&mut self, index: u32, npc_id: u32, name: Option<String>) {
        if let Some(name) = name.as_deref() {
            self.tracker.on_npc_spawn(npc_id, name);
        }
        self.world.npcs.insert(index, NpcState { id: npc_id, name, health_ratio: -1, is_dead: false });
    }

    pub fn on_actor_death(&mut self, actor: &ActorId) {
        let ActorId::Npc { index } = actor else {
            return;
        };
        let Some(npc) = self.world.npcs.get_mut(index) else {
            return;
        };
        npc.is_dead = true;
        let Some(name) = npc.name.clone() else {
            return;
        };
        if self.tracker.is_tracking(&name) {
            self.publish_death(*index, name);
        }
    }

    pub fn on_region_or_mode_changed(&mut self) {
        let env = self.world.env();
        self.tracker.on_region_or_mode_changed(&env);
        if !self.world.in_raid && self.world.in_cox_lobby() {
            self.tracker.on_raid_lobby();
        }
    }

    /// The deferred half of keris detection: the interaction target is known
    /// now, and the hitsplat is due on this tick.
    pub fn on_weapon_special_used(&mut self, observed_target: Option<u32>) {
        self.correlator.on_weapon_special_used(observed_target, self.world.tick);
    }

    // -----------------------------------------------------------------------
    // Event helpers
    // -----------------------------------------------------------------------

    fn on_varbit_changed(&mut self, var: Var, value: i32) {
        let previous_energy = self.world.special_energy;
        self.world.set_var(var, value);
        self.on_region_or_mode_changed();
        self.layout.on_varbit_changed(var, value);

        // Spec energy only drops when a special attack is used
        if var == Var::SpecialAttackPercent
            && value < previous_energy
            && self.world.is_wielding(TRACKED_WEAPON_ITEM_ID)
        {
            let server_tick = self.world.tick;
            let due = server_tick.saturating_add(TRACKED_WEAPON_HIT_DELAY);
            tracing::debug!("Keris spec on tick {}, hitsplat due {}", server_tick, due);
            self.deferred.schedule(due, server_tick);
        }
    }

    fn on_graphic(&mut self, actor: &ActorId, graphic: u32) {
        let ActorId::Npc { index } = actor else {
            return;
        };
        if graphic != VULNERABILITY_GRAPHIC {
            return;
        }
        let Some(name) = self.world.npc_name(*index).map(str::to_owned) else {
            return;
        };
        if !registry().is_tracked_boss_name(&name) {
            return;
        }
        let update = DefenceUpdate {
            boss_name: name,
            npc_index: *index,
            is_alive:  true,
            is_splash: true,
            world:     self.world.world,
            tick:      self.world.tick,
        };
        self.publish(PartyMessage::DefenceUpdate(update));
    }

    fn on_chat_message(&mut self, kind: ChatKind, message: &str) {
        if kind == ChatKind::FriendsChatNotification
            && strip_tags(message) == RAID_START_MESSAGE
            && self.world.in_raid
        {
            self.tracker.latch_raid_mode(self.layout.is_challenge_mode());
        }
    }

    fn on_local_special(&mut self, npc_index: u32, weapon: SpecialWeapon, hit: u32) {
        let Some(local) = &self.world.local else {
            tracing::debug!("{}", TrackerError::MissingLocalPlayerContext("special attack without local player"));
            return;
        };
        let update = SpecialAttackUpdate {
            npc_index,
            weapon,
            hit,
            world:       self.world.world,
            attacker_id: local.id,
            tick:        self.world.tick,
        };
        self.publish(PartyMessage::SpecialAttack(update));
    }

    /// Any NPC carrying the tracked boss's name that is dead or at zero health.
    fn report_finished_boss(&mut self) {
        if !self.world.in_party {
            return;
        }
        let finished: Vec<(u32, String)> = self
            .world
            .npcs
            .iter()
            .filter(|(_, npc)| npc.is_finished())
            .filter_map(|(index, npc)| npc.name.as_ref().map(|name| (*index, name.clone())))
            .filter(|(_, name)| self.tracker.is_tracking(name))
            .collect();
        for (index, name) in finished {
            self.publish_death(index, name);
        }
    }

    fn report_tracked_weapon_hit(&mut self, target: u32, amount: u32) {
        if !self.world.is_wielding(TRACKED_WEAPON_ITEM_ID) {
            return;
        }
        let Some(local) = &self.world.local else {
            tracing::debug!("{}", TrackerError::MissingLocalPlayerContext("keris hit without local player"));
            return;
        };
        tracing::debug!("Keris hit {} on npc {}", amount, target);
        let update = TrackedWeaponUpdate {
            npc_index:   target,
            hit_amount:  amount,
            world:       self.world.world,
            attacker_id: local.id,
            tick:        self.world.tick,
        };
        self.publish(PartyMessage::TrackedWeaponUpdate(update));
    }

    fn publish_death(&mut self, npc_index: u32, boss_name: String) {
        let update = DefenceUpdate {
            boss_name,
            npc_index,
            is_alive:  false,
            is_splash: false,
            world:     self.world.world,
            tick:      self.world.tick,
        };
        self.publish(PartyMessage::DefenceUpdate(update));
    }

    // -----------------------------------------------------------------------
    // Party plumbing
    // -----------------------------------------------------------------------

    /// In a party the transport echoes our message back; solo, loop it
    /// straight into our own inbox.
    fn publish(&mut self, message: PartyMessage) {
        if self.world.in_party {
            self.outbound.push(message);
        } else {
            self.inbox.push_back(Envelope { member_id: self.member_id, message });
        }
    }

    fn dispatch(&mut self, env: Envelope) {
        if !self.seen.record(&env) {
            tracing::debug!("{}", TrackerError::Duplicate(env.message.npc_index()));
            return;
        }

        let snapshot = self.world.env();
        let result = match &env.message {
            PartyMessage::DefenceUpdate(u) => self.tracker.on_defence_update(u, &snapshot),
            PartyMessage::TrackedWeaponUpdate(u) => {
                let name = self.world.npc_name(u.npc_index);
                self.tracker.on_tracked_weapon_update(u, name, &snapshot)
            }
            PartyMessage::SpecialAttack(u) => {
                let name = self.world.npc_name(u.npc_index);
                self.tracker.on_special_attack(u, name, &snapshot)
            }
        };

        match result {
            Ok(transition) => tracing::trace!("Party message from {} → {:?}", env.member_id, transition),
            Err(e) => tracing::debug!("Party message from {} ignored: {}", env.member_id, e),
        }
    }

    fn take_output(&mut self) -> EngineOutput {
        EngineOutput {
            render:   self.tracker.take_render(),
            outbound: std::mem::take(&mut self.outbound),
        }
    }
}

// ---------------------------------------------------------------------------
// Main engine task
// ---------------------------------------------------------------------------

pub async fn run<L: LayoutSolver>(
    mut game_rx:  Receiver<GameEvent>,
    mut party_rx: Receiver<Envelope>,
    render_tx:    Sender<RenderCommand>,
    outbound_tx:  Sender<PartyMessage>,
    mut stop:     oneshot::Receiver<()>,
    config:       TrackerConfig,
    layout:       L,
) -> Result<()> {
    let mut engine = Engine::new(&config, layout);

    loop {
        tokio::select! {
            // Network callbacks are queued, not applied inline
            Some(env) = party_rx.recv() => engine.enqueue_party(env),

            Some(event) = game_rx.recv() => {
                let out = engine.handle_game_event(event);
                if !forward(out, &render_tx, &outbound_tx).await {
                    return Ok(());
                }
            }

            _ = &mut stop => break,

            else => break,
        }
    }

    let out = engine.shutdown();
    forward(out, &render_tx, &outbound_tx).await;
    Ok(())
}

async fn forward(out: EngineOutput, render_tx: &Sender<RenderCommand>, outbound_tx: &Sender<PartyMessage>) -> bool {
    for cmd in out.render {
        if render_tx.send(cmd).await.is_err() {
            return false;
        }
    }
    for msg in out.outbound {
        // The transport echoes into our inbox; never block on it
        if let Err(e) = outbound_tx.try_send(msg) {
            tracing::warn!("Dropping outbound party message: {}", e);
        }
    }
    true
}

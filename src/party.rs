/// Party reconciliation: the bridge between this client and its teammates.
///
/// Outbound: local detections (special attacks from the special counter,
/// vulnerability landings, boss deaths, confirmed keris hits) become
/// `PartyMessage`s. Inbound: every message, including our own echo, goes
/// through the same reducer entry points as local events so all members
/// converge on the same defence value.
///
/// The keris is not covered by the special counter, so its hit is recovered
/// here: the spec-energy varbit drop is noticed, the target is resolved one
/// tick later, and the hitsplat landing on the expected tick is attributed
/// to the local player.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::rules::SpecialWeapon;

/// Keris partisan of corruption.
pub const TRACKED_WEAPON_ITEM_ID: u32 = 27287;
/// Ticks between the keris spec and its hitsplat.
pub const TRACKED_WEAPON_HIT_DELAY: u32 = 1;

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenceUpdate {
    pub boss_name: String,
    pub npc_index: u32,
    pub is_alive:  bool,
    pub is_splash: bool,
    pub world:     u32,
    /// Sender's tick when the update was produced.
    #[serde(default)]
    pub tick:      u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWeaponUpdate {
    pub npc_index:   u32,
    pub hit_amount:  u32,
    pub world:       u32,
    pub attacker_id: u32,
    #[serde(default)]
    pub tick:        u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialAttackUpdate {
    pub npc_index:   u32,
    pub weapon:      SpecialWeapon,
    pub hit:         u32,
    pub world:       u32,
    pub attacker_id: u32,
    #[serde(default)]
    pub tick:        u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartyMessage {
    DefenceUpdate(DefenceUpdate),
    TrackedWeaponUpdate(TrackedWeaponUpdate),
    SpecialAttack(SpecialAttackUpdate),
}

impl PartyMessage {
    pub fn npc_index(&self) -> u32 {
        match self {
            Self::DefenceUpdate(m)       => m.npc_index,
            Self::TrackedWeaponUpdate(m) => m.npc_index,
            Self::SpecialAttack(m)       => m.npc_index,
        }
    }

    pub fn world(&self) -> u32 {
        match self {
            Self::DefenceUpdate(m)       => m.world,
            Self::TrackedWeaponUpdate(m) => m.world,
            Self::SpecialAttack(m)       => m.world,
        }
    }

    /// A defence update describes the boss, not the reporter: every member
    /// who sees the same splash sends the same payload, so the sender is not
    /// part of its key. Specials are distinct per attacker.
    fn dedupe_key(&self, member_id: u64) -> MessageKey {
        let (sender, kind, tick, detail) = match self {
            Self::DefenceUpdate(m)       => (None, 0u8, m.tick, u32::from(m.is_alive)),
            Self::TrackedWeaponUpdate(m) => (Some(member_id), 1u8, m.tick, m.hit_amount),
            Self::SpecialAttack(m)       => (Some(member_id), 2u8, m.tick, m.hit),
        };
        MessageKey { sender, kind, npc_index: self.npc_index(), world: self.world(), tick, detail }
    }
}

/// A message as delivered by the transport, tagged with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub member_id: u64,
    pub message:   PartyMessage,
}

// ---------------------------------------------------------------------------
// Replay protection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MessageKey {
    sender:    Option<u64>,
    kind:      u8,
    npc_index: u32,
    world:     u32,
    tick:      u32,
    detail:    u32,
}

/// Remembers recently applied messages so a redelivered one is a no-op.
#[derive(Debug)]
pub struct MessageLog {
    seen:     HashSet<MessageKey>,
    order:    VecDeque<MessageKey>,
    capacity: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::with_capacity(512)
    }
}

impl MessageLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { seen: HashSet::new(), order: VecDeque::new(), capacity }
    }

    /// Returns false if this exact message was already recorded.
    pub fn record(&mut self, env: &Envelope) -> bool {
        let key = env.message.dedupe_key(env.member_id);
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Next-tick deferral
// ---------------------------------------------------------------------------

/// One pending action scheduled for a later tick boundary. Scheduling again
/// before it fires replaces it.
#[derive(Debug)]
pub struct Deferred<T> {
    slot: Option<(u32, T)>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> Deferred<T> {
    pub fn schedule(&mut self, due_tick: u32, value: T) {
        if self.slot.is_some() {
            tracing::trace!("Deferred action superseded");
        }
        self.slot = Some((due_tick, value));
    }

    pub fn take_due(&mut self, tick: u32) -> Option<T> {
        match self.slot {
            Some((due, _)) if due <= tick => self.slot.take().map(|(_, v)| v),
            _ => None,
        }
    }

}

// ---------------------------------------------------------------------------
// Keris hitsplat correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedHitsplat {
    pub target:        u32,
    pub hitsplat_tick: u32,
    pub amount:        Option<u32>,
}

#[derive(Debug, Default)]
pub struct HitsplatCorrelator {
    pending:    Option<InterceptedHitsplat>,
    interacted: HashSet<u32>,
}

/// What `on_hitsplat` observed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HitsplatOutcome {
    /// First spec hitsplat ever seen on this NPC.
    pub new_target: bool,
    pub recorded:   bool,
}

impl HitsplatCorrelator {
    /// The keris was used against `target`; its hitsplat is expected on
    /// `hitsplat_tick`. Replaces any earlier pending record.
    pub fn on_weapon_special_used(&mut self, target: Option<u32>, hitsplat_tick: u32) {
        self.pending = target.map(|target| InterceptedHitsplat { target, hitsplat_tick, amount: None });
        tracing::debug!("Keris used on {:?}, hitsplat expected on tick {}", target, hitsplat_tick);
    }

    pub fn on_hitsplat(&mut self, npc_index: u32, amount: u32, is_mine: bool, tick: u32) -> HitsplatOutcome {
        let mut outcome = HitsplatOutcome::default();
        if !is_mine {
            return outcome;
        }
        let Some(pending) = self.pending.as_mut() else {
            return outcome;
        };
        if pending.target != npc_index {
            return outcome;
        }

        outcome.new_target = self.interacted.insert(npc_index);

        // The weapon hitsplat is the last of ours on its tick (thralls and
        // vengeance land first), so later ones overwrite earlier ones.
        if pending.hitsplat_tick == tick {
            pending.amount = Some(amount);
            outcome.recorded = true;
        }
        outcome
    }

    /// Consume the pending record at a tick boundary. Returns the target and
    /// damage of a confirmed, damaging keris hit.
    pub fn on_tick(&mut self, tick: u32) -> Option<(u32, u32)> {
        let pending = self.pending.as_ref()?;
        match pending.amount {
            Some(amount) => {
                let target = pending.target;
                self.pending = None;
                (amount > 0).then_some((target, amount))
            }
            None if tick > pending.hitsplat_tick => {
                tracing::debug!("Keris hitsplat on {} never landed", pending.target);
                self.pending = None;
                None
            }
            None => None,
        }
    }

    pub fn pending(&self) -> Option<&InterceptedHitsplat> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

// ---------------------------------------------------------------------------
// Transport task
// ---------------------------------------------------------------------------

/// Delivers outbound messages: appends them to `out_path` (when set) and
/// echoes them to our own inbox, as the party service does for the sender.
pub async fn run_transport(
    mut outbound_rx: Receiver<PartyMessage>,
    inbox_tx:        Sender<Envelope>,
    member_id:       u64,
    out_path:        Option<PathBuf>,
) -> Result<()> {
    let mut out = match &out_path {
        Some(p) => Some(OpenOptions::new().create(true).append(true).open(p)?),
        None => None,
    };

    while let Some(message) = outbound_rx.recv().await {
        let env = Envelope { member_id, message };
        if let Some(f) = out.as_mut() {
            let line = serde_json::to_string(&env)?;
            if let Err(e) = writeln!(f, "{}", line) {
                tracing::warn!("Party outbox write failed: {}", e);
            }
        }
        if inbox_tx.send(env).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splash(member_id: u64, tick: u32) -> Envelope {
        Envelope {
            member_id,
            message: PartyMessage::DefenceUpdate(DefenceUpdate {
                boss_name: "Vorkath".to_owned(),
                npc_index: 40,
                is_alive:  true,
                is_splash: true,
                world:     330,
                tick,
            }),
        }
    }

    #[test]
    fn redelivery_is_rejected() {
        let mut log = MessageLog::default();
        assert!(log.record(&splash(1, 100)));
        assert!(!log.record(&splash(1, 100)));
        // Another tick is a distinct event
        assert!(log.record(&splash(1, 101)));
    }

    #[test]
    fn same_splash_from_two_members_is_one_event() {
        let mut log = MessageLog::default();
        assert!(log.record(&splash(1, 100)));
        assert!(!log.record(&splash(2, 100)));
        assert!(!log.record(&splash(3, 100)));
    }

    #[test]
    fn same_special_from_two_members_is_two_events() {
        let mut log = MessageLog::default();
        let dwh = |member_id: u64| Envelope {
            member_id,
            message: PartyMessage::SpecialAttack(SpecialAttackUpdate {
                npc_index:   40,
                weapon:      SpecialWeapon::DragonWarhammer,
                hit:         31,
                world:       330,
                attacker_id: member_id as u32,
                tick:        100,
            }),
        };
        assert!(log.record(&dwh(1)));
        assert!(log.record(&dwh(2)));
        assert!(!log.record(&dwh(2)));
    }

    #[test]
    fn log_forgets_oldest_past_capacity() {
        let mut log = MessageLog::with_capacity(2);
        assert!(log.record(&splash(1, 1)));
        assert!(log.record(&splash(1, 2)));
        assert!(log.record(&splash(1, 3)));
        assert!(log.record(&splash(1, 1)));
    }

    #[test]
    fn deferred_fires_once_and_supersedes() {
        let mut d = Deferred::default();
        d.schedule(11, "first");
        d.schedule(11, "second");
        assert_eq!(d.take_due(10), None);
        assert_eq!(d.take_due(11), Some("second"));
        assert_eq!(d.take_due(12), None);
        assert_eq!(d.take_due(u32::MAX), None);
    }

    #[test]
    fn correlates_hitsplat_on_expected_tick() {
        let mut c = HitsplatCorrelator::default();
        c.on_weapon_special_used(Some(12), 501);

        // Somebody else's splat and a splat on another NPC are ignored
        assert!(!c.on_hitsplat(12, 30, false, 501).recorded);
        assert!(!c.on_hitsplat(13, 30, true, 501).recorded);

        let first = c.on_hitsplat(12, 4, true, 501);
        assert!(first.new_target && first.recorded);
        let second = c.on_hitsplat(12, 38, true, 501);
        assert!(!second.new_target && second.recorded);

        assert_eq!(c.on_tick(502), Some((12, 38)));
        assert!(c.pending().is_none());
    }

    #[test]
    fn early_hitsplat_is_not_attributed() {
        let mut c = HitsplatCorrelator::default();
        c.on_weapon_special_used(Some(12), 501);
        assert!(!c.on_hitsplat(12, 30, true, 500).recorded);
        assert_eq!(c.on_tick(501), None);
        assert!(c.pending().is_some());
        assert_eq!(c.on_tick(502), None);
        assert!(c.pending().is_none());
    }

    #[test]
    fn zero_hit_is_consumed_without_report() {
        let mut c = HitsplatCorrelator::default();
        c.on_weapon_special_used(Some(12), 501);
        c.on_hitsplat(12, 0, true, 501);
        assert_eq!(c.on_tick(502), None);
        assert!(c.pending().is_none());
    }

    #[test]
    fn message_wire_format() {
        let raw = r#"{"type":"special_attack","npc_index":5,"weapon":"BANDOS_GODSWORD","hit":44,"world":416,"attacker_id":77}"#;
        let msg: PartyMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.npc_index(), 5);
        assert_eq!(msg.world(), 416);
        match msg {
            PartyMessage::SpecialAttack(m) => {
                assert_eq!(m.weapon, SpecialWeapon::BandosGodsword);
                assert_eq!(m.tick, 0);
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_echoes_to_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party_out.jsonl");
        let (out_tx, out_rx) = tokio::sync::mpsc::channel(4);
        let (in_tx, mut in_rx) = tokio::sync::mpsc::channel(4);

        let task = tokio::spawn(run_transport(out_rx, in_tx, 9, Some(path.clone())));
        out_tx.send(splash(0, 3).message).await.unwrap();
        let echoed = in_rx.recv().await.unwrap();
        assert_eq!(echoed.member_id, 9);

        drop(out_tx);
        task.await.unwrap().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
    }
}

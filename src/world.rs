/// Mirror of the game client state the tracker reads.
///
/// The host feeds raw client events; the engine folds the ones that describe
/// "what is currently true" (NPC table, player position, varbits, equipment)
/// into this view before any reducer runs. Reducers then read a consistent
/// snapshot through `env()` instead of querying the client.
use crate::region::{is_in_cox_lobby, RegionInputs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NpcState {
    pub id:           u32,
    pub name:         Option<String>,
    /// -1 when the health bar has not been seen.
    pub health_ratio: i32,
    pub is_dead:      bool,
}

impl NpcState {
    pub fn is_finished(&self) -> bool {
        self.is_dead || self.health_ratio == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlayer {
    pub id:   u32,
    pub name: String,
}

/// Varbits/varps the tracker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Var {
    InRaid,
    RaidPartySize,
    SpecialAttackPercent,
    #[serde(other)]
    Other,
}

/// Per-event snapshot handed to the state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Env {
    pub tick:        u32,
    pub local_world: u32,
    pub in_raid:     bool,
    pub party_size:  u32,
    pub region:      RegionInputs,
}

#[derive(Debug, Default)]
pub struct WorldView {
    pub tick:           u32,
    pub world:          u32,
    pub local:          Option<LocalPlayer>,
    pub npcs:           HashMap<u32, NpcState>,
    pub region_id:      Option<u32>,
    pub map_regions:    Vec<u32>,
    pub in_raid:        bool,
    pub party_size:     u32,
    pub special_energy: i32,
    pub weapon_id:      Option<u32>,
    /// NPC index the local player is interacting with.
    pub interacting:    Option<u32>,
    pub in_party:       bool,
}

impl WorldView {
    pub fn env(&self) -> Env {
        Env {
            tick:        self.tick,
            local_world: self.world,
            in_raid:     self.in_raid,
            party_size:  self.party_size.max(1),
            region:      RegionInputs { region_id: self.region_id, in_raid: self.in_raid },
        }
    }

    pub fn npc_name(&self, index: u32) -> Option<&str> {
        self.npcs.get(&index).and_then(|n| n.name.as_deref())
    }

    pub fn set_var(&mut self, var: Var, value: i32) {
        match var {
            Var::InRaid               => self.in_raid = value == 1,
            Var::RaidPartySize        => self.party_size = u32::try_from(value).unwrap_or(0),
            Var::SpecialAttackPercent => self.special_energy = value,
            Var::Other                => {}
        }
    }

    pub fn in_cox_lobby(&self) -> bool {
        is_in_cox_lobby(&self.map_regions)
    }

    pub fn is_wielding(&self, item_id: u32) -> bool {
        self.weapon_id == Some(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_reflects_varbits() {
        let mut w = WorldView::default();
        w.world = 416;
        w.set_var(Var::InRaid, 1);
        w.set_var(Var::RaidPartySize, 4);
        w.region_id = Some(13136);

        let env = w.env();
        assert!(env.in_raid);
        assert_eq!(env.party_size, 4);
        assert_eq!(env.local_world, 416);
        assert_eq!(env.region.region_id, Some(13136));
    }

    #[test]
    fn party_size_never_reads_zero() {
        let w = WorldView::default();
        assert_eq!(w.env().party_size, 1);
    }

    #[test]
    fn npc_finished_on_zero_health() {
        let n = NpcState { id: 1, name: None, health_ratio: 0, is_dead: false };
        assert!(n.is_finished());
        let n = NpcState { health_ratio: -1, ..n };
        assert!(!n.is_finished());
    }
}

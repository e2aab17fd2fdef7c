/// Parses feed lines into typed game events and party envelopes.
///
/// The game client appends one JSON object per line:
///
///   {"event":"tick","tick":5021}
///   {"event":"hitsplat","actor":{"kind":"npc","index":14},"amount":38,"is_mine":true}
///   {"party":{"member_id":88,"message":{"type":"defence_update", ...}}}
///
/// Game events carry an `event` tag. Party traffic received from the network
/// is wrapped in a `party` object and routed to the engine's inbox instead.
use crate::{
    layout::GameState,
    party::Envelope,
    rules::SpecialWeapon,
    world::Var,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActorId {
    Npc { index: u32 },
    Player { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    FriendsChatNotification,
    #[serde(other)]
    Other,
}

/// Typed client events the tracker cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    Tick {
        tick: u32,
    },
    LocalPlayer {
        id:    u32,
        name:  String,
        world: u32,
    },
    NpcSpawned {
        index: u32,
        id:    u32,
        name:  Option<String>,
    },
    NpcDespawned {
        index: u32,
    },
    NpcHealth {
        index:        u32,
        health_ratio: i32,
        #[serde(default)]
        is_dead:      bool,
    },
    Animation {
        actor:     ActorId,
        animation: u32,
    },
    Hitsplat {
        actor:   ActorId,
        amount:  u32,
        is_mine: bool,
    },
    ActorDeath {
        actor: ActorId,
    },
    Graphic {
        actor:   ActorId,
        graphic: u32,
    },
    ChatMessage {
        kind:    ChatKind,
        message: String,
    },
    VarbitChanged {
        var:   Var,
        value: i32,
    },
    PlayerMoved {
        region_id:   Option<u32>,
        #[serde(default)]
        map_regions: Vec<u32>,
    },
    EquipmentChanged {
        weapon_id: Option<u32>,
    },
    InteractingChanged {
        target: Option<u32>,
    },
    GameStateChanged {
        state: GameState,
    },
    PartyChanged {
        in_party: bool,
    },
    RaidLayout {
        challenge_mode: bool,
    },
    /// The local special counter saw one of our specs land (or miss).
    SpecialAttack {
        npc_index: u32,
        weapon:    SpecialWeapon,
        hit:       u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedRecord {
    Game(GameEvent),
    Party(Envelope),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireRecord {
    Party { party: Envelope },
    Game(GameEvent),
}

pub fn parse_line(raw: &str) -> Option<FeedRecord> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<WireRecord>(line) {
        Ok(WireRecord::Party { party }) => Some(FeedRecord::Party(party)),
        Ok(WireRecord::Game(event)) => Some(FeedRecord::Game(event)),
        Err(e) => {
            tracing::trace!("Skipping unparseable feed line: {}", e);
            None
        }
    }
}

/// Async pipeline task: receive raw lines, parse, route to engine inputs.
pub async fn run(
    mut rx:   Receiver<String>,
    game_tx:  Sender<GameEvent>,
    party_tx: Sender<Envelope>,
) -> Result<()> {
    while let Some(line) = rx.recv().await {
        let sent = match parse_line(&line) {
            Some(FeedRecord::Game(event)) => game_tx.send(event).await.is_ok(),
            Some(FeedRecord::Party(env)) => party_tx.send(env).await.is_ok(),
            None => true,
        };
        if !sent {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::PartyMessage;

    #[test]
    fn parses_tick() {
        assert_eq!(
            parse_line(r#"{"event":"tick","tick":5021}"#),
            Some(FeedRecord::Game(GameEvent::Tick { tick: 5021 }))
        );
    }

    #[test]
    fn parses_hitsplat() {
        let e = parse_line(r#"{"event":"hitsplat","actor":{"kind":"npc","index":14},"amount":38,"is_mine":true}"#)
            .expect("should parse");
        match e {
            FeedRecord::Game(GameEvent::Hitsplat { actor, amount, is_mine }) => {
                assert_eq!(actor, ActorId::Npc { index: 14 });
                assert_eq!(amount, 38);
                assert!(is_mine);
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn parses_varbit_and_unknown_var() {
        let e = parse_line(r#"{"event":"varbit_changed","var":"raid_party_size","value":4}"#).unwrap();
        assert_eq!(e, FeedRecord::Game(GameEvent::VarbitChanged { var: Var::RaidPartySize, value: 4 }));
        let e = parse_line(r#"{"event":"varbit_changed","var":"quest_points","value":4}"#).unwrap();
        assert_eq!(e, FeedRecord::Game(GameEvent::VarbitChanged { var: Var::Other, value: 4 }));
    }

    #[test]
    fn parses_party_envelope() {
        let raw = r#"{"party":{"member_id":88,"message":{"type":"defence_update","boss_name":"Vorkath","npc_index":3,"is_alive":true,"is_splash":true,"world":416}}}"#;
        match parse_line(raw).expect("should parse") {
            FeedRecord::Party(env) => {
                assert_eq!(env.member_id, 88);
                assert!(matches!(env.message, PartyMessage::DefenceUpdate(ref u) if u.boss_name == "Vorkath"));
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_line("not a feed line").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line(r#"{"event":"teleport"}"#).is_none());
    }

    #[tokio::test]
    async fn routes_records() {
        let (raw_tx, raw_rx) = tokio::sync::mpsc::channel(8);
        let (game_tx, mut game_rx) = tokio::sync::mpsc::channel(8);
        let (party_tx, mut party_rx) = tokio::sync::mpsc::channel(8);
        let task = tokio::spawn(run(raw_rx, game_tx, party_tx));

        raw_tx.send(r#"{"event":"party_changed","in_party":true}"#.to_owned()).await.unwrap();
        raw_tx.send("junk".to_owned()).await.unwrap();
        raw_tx
            .send(r#"{"party":{"member_id":1,"message":{"type":"tracked_weapon_update","npc_index":3,"hit_amount":20,"world":416,"attacker_id":5}}}"#.to_owned())
            .await
            .unwrap();
        drop(raw_tx);

        assert_eq!(game_rx.recv().await, Some(GameEvent::PartyChanged { in_party: true }));
        assert_eq!(party_rx.recv().await.map(|e| e.member_id), Some(1));
        task.await.unwrap().unwrap();
    }
}

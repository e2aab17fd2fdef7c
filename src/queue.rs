/// Special attacks waiting for their target to be identified.
///
/// A peer's special can reference an NPC index this client has not seen yet
/// (it has not spawned locally, or its name is not cached). Those specs are
/// parked here and replayed, in arrival order, as soon as that index is
/// baselined as the tracked boss. Only one NPC's backlog is kept: queueing
/// against a different index throws the old backlog away.
use crate::rules::{RuleInput, SpecialWeapon};

#[derive(Debug)]
struct QueuedNpc {
    index: u32,
    specs: Vec<RuleInput>,
}

#[derive(Debug, Default)]
pub struct SpecQueue {
    pending: Option<QueuedNpc>,
}

impl SpecQueue {
    pub fn enqueue(&mut self, npc_index: u32, weapon: SpecialWeapon, hit: u32) {
        match &mut self.pending {
            Some(q) if q.index == npc_index => q.specs.push(RuleInput { weapon, hit }),
            _ => {
                if let Some(old) = &self.pending {
                    tracing::debug!(
                        "Spec queue moved from npc {} to {} ({} specs dropped)",
                        old.index, npc_index, old.specs.len()
                    );
                }
                self.pending = Some(QueuedNpc {
                    index: npc_index,
                    specs: vec![RuleInput { weapon, hit }],
                });
            }
        }
    }

    /// Take the backlog for `npc_index`. The queue is emptied either way.
    pub fn drain_if_matches(&mut self, npc_index: u32) -> Vec<RuleInput> {
        match self.pending.take() {
            Some(q) if q.index == npc_index => q.specs,
            _ => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn queued_index(&self) -> Option<u32> {
        self.pending.as_ref().map(|q| q.index)
    }

    pub fn len(&self) -> usize {
        self.pending.as_ref().map_or(0, |q| q.specs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

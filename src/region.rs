/// Region/context gate: is the tracked boss in a fight we can follow?
///
/// Bosses with a region allow-list require the player to stand in one of
/// those regions. Without an allow-list the boss is trackable anywhere,
/// except Chambers bosses which additionally need the in-raid varbit.
use crate::bosses::{BossInfo, Raid};

/// Map region loaded while standing in the Chambers of Xeric lobby.
pub const COX_LOBBY_REGION: u32 = 4919;

/// The inputs the gate reads, snapshotted from the world view.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionInputs {
    /// Instance-resolved region of the local player; `None` before login.
    pub region_id: Option<u32>,
    pub in_raid:   bool,
}

pub fn is_in_trackable_region(boss: Option<&BossInfo>, inputs: &RegionInputs) -> bool {
    let Some(boss) = boss else {
        return true;
    };

    if !boss.regions.is_empty() {
        if let Some(region) = inputs.region_id {
            return boss.regions.contains(&region);
        }
    }

    inputs.in_raid || boss.raid != Some(Raid::Cox)
}

pub fn is_in_cox_lobby(map_regions: &[u32]) -> bool {
    map_regions.contains(&COX_LOBBY_REGION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bosses::registry;

    fn at(region: u32, in_raid: bool) -> RegionInputs {
        RegionInputs { region_id: Some(region), in_raid }
    }

    #[test]
    fn allow_list_must_contain_player_region() {
        let zulrah = registry().resolve("Zulrah");
        assert!(is_in_trackable_region(zulrah, &at(9007, false)));
        assert!(is_in_trackable_region(zulrah, &at(9008, false)));
        assert!(!is_in_trackable_region(zulrah, &at(12850, false)));
    }

    #[test]
    fn chambers_bosses_need_raid_flag() {
        let tekton = registry().resolve("Tekton");
        assert!(is_in_trackable_region(tekton, &at(13136, true)));
        assert!(!is_in_trackable_region(tekton, &at(13136, false)));
    }

    #[test]
    fn roaming_bosses_are_always_trackable() {
        let corp = registry().resolve("Corporeal Beast");
        assert!(is_in_trackable_region(corp, &at(11842, false)));
        assert!(is_in_trackable_region(corp, &RegionInputs::default()));
    }

    #[test]
    fn unknown_location_falls_back_to_raid_rule() {
        let sotetseg = registry().resolve("Sotetseg");
        assert!(is_in_trackable_region(sotetseg, &RegionInputs::default()));
    }

    #[test]
    fn no_boss_is_trackable() {
        assert!(is_in_trackable_region(None, &at(1, false)));
    }

    #[test]
    fn lobby_detection() {
        assert!(is_in_cox_lobby(&[4663, 4919]));
        assert!(!is_in_cox_lobby(&[]));
    }
}

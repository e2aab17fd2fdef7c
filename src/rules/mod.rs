/// Weapon effect rules: how much defence one special attack drains.
///
/// Each special weapon with a defence-reducing effect gets its own module
/// exposing `evaluate`, which returns the amount to subtract from the running
/// defence (never negative). `apply_weapon_effect` dispatches on the weapon,
/// subtracts, then clamps to the boss's floor. Adding a weapon means adding a
/// module and one arm to `defence_delta`.
pub mod anchor;
pub mod arclight;
pub mod bone_dagger;
pub mod godsword;
pub mod warhammer;

use crate::bosses::BossInfo;
use serde::{Deserialize, Serialize};

/// Special attack weapons reported by the special-counter subsystem.
/// Names match the wire format used by party members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecialWeapon {
    DragonWarhammer,
    BandosGodsword,
    Arclight,
    Darklight,
    BarrelchestAnchor,
    BoneDagger,
    DorgeshuunCrossbow,
    /// Any other weapon the counter knows about; it has no defence effect.
    #[serde(other)]
    Other,
}

/// Encounter context a rule may depend on.
pub struct RuleContext<'a> {
    pub boss:       &'a BossInfo,
    pub in_raid:    bool,
    pub in_region:  bool,
    /// Pestilent Bloat is face-down and takes regular defence drain.
    pub bloat_down: bool,
}

/// The special attack being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleInput {
    pub weapon: SpecialWeapon,
    pub hit:    u32,
}

/// Defence removed by a rule.
pub type RuleOutput = f64;

pub fn defence_delta(input: &RuleInput, ctx: &RuleContext, current: f64) -> RuleOutput {
    match input.weapon {
        SpecialWeapon::DragonWarhammer => warhammer::evaluate(input, ctx, current),
        SpecialWeapon::BandosGodsword => godsword::evaluate(input, ctx, current),
        SpecialWeapon::Arclight | SpecialWeapon::Darklight => arclight::evaluate(input, ctx, current),
        SpecialWeapon::BarrelchestAnchor => anchor::evaluate(input, ctx, current),
        SpecialWeapon::BoneDagger | SpecialWeapon::DorgeshuunCrossbow => {
            bone_dagger::evaluate(input, ctx, current)
        }
        SpecialWeapon::Other => 0.0,
    }
}

pub fn apply_weapon_effect(current: f64, input: &RuleInput, ctx: &RuleContext) -> f64 {
    let next = current - defence_delta(input, ctx, current);
    clamp_defence(next, ctx.boss)
}

pub fn clamp_defence(value: f64, boss: &BossInfo) -> f64 {
    value.max(boss.defence_floor).max(0.0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::bosses::registry;

    pub fn boss(name: &str) -> &'static BossInfo {
        registry().resolve(name).expect("boss in table")
    }

    pub fn ctx(boss: &BossInfo) -> RuleContext<'_> {
        RuleContext { boss, in_raid: false, in_region: true, bloat_down: false }
    }

    pub fn spec(weapon: SpecialWeapon, hit: u32) -> RuleInput {
        RuleInput { weapon, hit }
    }

    pub fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn never_drops_below_zero() {
        let b = boss("Nylocas Vasilias");
        let out = apply_weapon_effect(50.0, &spec(SpecialWeapon::BoneDagger, 80), &ctx(b));
        assert_eq!(out, 0.0);
    }

    #[test]
    fn sotetseg_floors_at_one_hundred() {
        let b = boss("Sotetseg");
        let out = apply_weapon_effect(120.0, &spec(SpecialWeapon::BandosGodsword, 45), &ctx(b));
        assert_eq!(out, 100.0);
        let out = apply_weapon_effect(100.0, &spec(SpecialWeapon::DragonWarhammer, 30), &ctx(b));
        assert_eq!(out, 100.0);
    }

    #[test]
    fn other_weapons_do_nothing() {
        let b = boss("Vorkath");
        let out = apply_weapon_effect(214.0, &spec(SpecialWeapon::Other, 70), &ctx(b));
        assert_eq!(out, 214.0);
    }

    #[test]
    fn weapon_names_use_wire_format() {
        let w: SpecialWeapon = serde_json::from_str("\"DRAGON_WARHAMMER\"").unwrap();
        assert_eq!(w, SpecialWeapon::DragonWarhammer);
        let w: SpecialWeapon = serde_json::from_str("\"ELDER_MAUL\"").unwrap();
        assert_eq!(w, SpecialWeapon::Other);
    }
}

/// Bandos godsword: drains defence equal to damage dealt.
///
/// Corporeal Beast and a standing Pestilent Bloat take double. A miss on
/// Tekton inside the Chambers still removes a flat 10.
use super::{RuleContext, RuleInput, RuleOutput};
use crate::bosses::{CORPOREAL_BEAST, PESTILENT_BLOAT, TEKTON};

const TEKTON_MISS_DRAIN: f64 = 10.0;

pub fn evaluate(input: &RuleInput, ctx: &RuleContext, _current: f64) -> RuleOutput {
    if input.hit == 0 {
        return if ctx.in_raid && ctx.boss.is(TEKTON) { TEKTON_MISS_DRAIN } else { 0.0 };
    }

    let hit = f64::from(input.hit);
    let vulnerable = ctx.boss.is(CORPOREAL_BEAST)
        || (ctx.in_region && ctx.boss.is(PESTILENT_BLOAT) && !ctx.bloat_down);

    if vulnerable { hit * 2.0 } else { hit }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{apply_weapon_effect, SpecialWeapon};

    #[test]
    fn drains_damage_dealt() {
        let b = boss("General Graardor");
        let out = apply_weapon_effect(250.0, &spec(SpecialWeapon::BandosGodsword, 42), &ctx(b));
        assert_eq!(out, 208.0);
    }

    #[test]
    fn corp_takes_double() {
        let b = boss("Corporeal Beast");
        let out = apply_weapon_effect(310.0, &spec(SpecialWeapon::BandosGodsword, 40), &ctx(b));
        assert_eq!(out, 230.0);
    }

    #[test]
    fn bloat_double_only_while_standing() {
        let b = boss("Pestilent Bloat");
        let mut c = ctx(b);
        assert_eq!(apply_weapon_effect(100.0, &spec(SpecialWeapon::BandosGodsword, 20), &c), 60.0);
        c.bloat_down = true;
        assert_eq!(apply_weapon_effect(100.0, &spec(SpecialWeapon::BandosGodsword, 20), &c), 80.0);
        c.bloat_down = false;
        c.in_region = false;
        assert_eq!(apply_weapon_effect(100.0, &spec(SpecialWeapon::BandosGodsword, 20), &c), 80.0);
    }

    #[test]
    fn miss_is_flat_ten_on_tekton_in_raid() {
        let tekton = boss("Tekton");
        let mut c = ctx(tekton);
        c.in_raid = true;
        assert_eq!(apply_weapon_effect(205.0, &spec(SpecialWeapon::BandosGodsword, 0), &c), 195.0);

        let kq = boss("Kalphite Queen");
        let mut c = ctx(kq);
        c.in_raid = true;
        assert_eq!(apply_weapon_effect(300.0, &spec(SpecialWeapon::BandosGodsword, 0), &c), 300.0);
    }
}

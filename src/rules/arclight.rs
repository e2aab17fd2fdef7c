/// Arclight and Darklight: a landed spec drains a share of *base* defence.
///
/// Demons hit by Arclight (K'ril Tsutsaroth, Abyssal Sire) lose 10% of base,
/// everything else 5%. Misses do nothing.
use super::{RuleContext, RuleInput, RuleOutput};
use crate::bosses::{ABYSSAL_SIRE, KRIL_TSUTSAROTH};

pub fn evaluate(input: &RuleInput, ctx: &RuleContext, _current: f64) -> RuleOutput {
    if input.hit == 0 {
        return 0.0;
    }
    let fraction = if ctx.boss.is(KRIL_TSUTSAROTH) || ctx.boss.is(ABYSSAL_SIRE) { 0.10 } else { 0.05 };
    ctx.boss.base_defence * fraction
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{apply_weapon_effect, SpecialWeapon};

    #[test]
    fn demons_lose_ten_percent_of_base() {
        let b = boss("K'ril Tsutsaroth");
        // Drain is measured against base (270), not the current 200.
        let out = apply_weapon_effect(200.0, &spec(SpecialWeapon::Arclight, 12), &ctx(b));
        assert!(close(out, 173.0));
    }

    #[test]
    fn others_lose_five_percent_of_base() {
        let b = boss("Vorkath");
        let out = apply_weapon_effect(214.0, &spec(SpecialWeapon::Darklight, 3), &ctx(b));
        assert!(close(out, 214.0 - 10.7));
    }

    #[test]
    fn miss_has_no_effect() {
        let b = boss("Abyssal Sire");
        assert_eq!(apply_weapon_effect(250.0, &spec(SpecialWeapon::Arclight, 0), &ctx(b)), 250.0);
    }
}

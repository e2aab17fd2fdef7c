/// Barrelchest anchor: drains a tenth of the damage dealt.
use super::{RuleContext, RuleInput, RuleOutput};

pub fn evaluate(input: &RuleInput, _ctx: &RuleContext, _current: f64) -> RuleOutput {
    f64::from(input.hit) * 0.10
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{apply_weapon_effect, SpecialWeapon};

    #[test]
    fn drains_tenth_of_hit() {
        let b = boss("Giant Mole");
        let out = apply_weapon_effect(200.0, &spec(SpecialWeapon::BarrelchestAnchor, 55), &ctx(b));
        assert!(close(out, 194.5));
    }
}

/// Bone dagger and Dorgeshuun crossbow: drain defence equal to damage dealt.
use super::{RuleContext, RuleInput, RuleOutput};

pub fn evaluate(input: &RuleInput, _ctx: &RuleContext, _current: f64) -> RuleOutput {
    f64::from(input.hit)
}

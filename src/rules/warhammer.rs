/// Dragon warhammer: a landed spec drains 30% of current defence.
///
/// A miss still drains 5% against Tekton inside the Chambers.
use super::{RuleContext, RuleInput, RuleOutput};
use crate::bosses::TEKTON;

const HIT_FRACTION:  f64 = 0.30;
const MISS_FRACTION: f64 = 0.05;

pub fn evaluate(input: &RuleInput, ctx: &RuleContext, current: f64) -> RuleOutput {
    if input.hit > 0 {
        return current * HIT_FRACTION;
    }
    if ctx.in_raid && ctx.boss.is(TEKTON) {
        return current * MISS_FRACTION;
    }
    0.0
}

use super::{PolicyContext, SearchPolicy, SearchRule, Step, ensure_previous_in_bounds};
use seeker_core::error::SearchError;

/// Searches the current argmax every turn.
///
/// Rules 1 and 2 share this policy; they differ only in the prior the controller
/// seeds the belief with.
#[derive(Debug, Clone, Copy)]
pub struct MaxBeliefPolicy {
    rule: SearchRule,
}

impl MaxBeliefPolicy {
    pub const fn containment() -> Self {
        Self {
            rule: SearchRule::MaxContainment,
        }
    }

    pub const fn detection() -> Self {
        Self {
            rule: SearchRule::MaxDetection,
        }
    }
}

impl SearchPolicy for MaxBeliefPolicy {
    fn rule(&self) -> SearchRule {
        self.rule
    }

    fn choose(&mut self, ctx: &PolicyContext) -> Result<Step, SearchError> {
        ensure_previous_in_bounds(ctx)?;
        let (cell, _) = ctx.belief.argmax();
        Ok(Step { cell, cost: 1 })
    }
}

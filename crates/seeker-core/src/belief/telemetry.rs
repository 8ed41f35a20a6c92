use super::BeliefState;
use crate::model::cell::Cell;

#[derive(Debug, Clone)]
pub struct BeliefMetrics {
    pub revision: u64,
    /// Shannon entropy in nats.
    pub entropy: f64,
    pub peak_cell: Cell,
    pub peak: f64,
    /// Cells holding non-zero mass.
    pub support: usize,
}

impl BeliefMetrics {
    pub fn from_belief(belief: &BeliefState) -> Self {
        let mut entropy = 0.0;
        let mut support = 0;
        for (_, prob) in belief.iter() {
            if prob > 0.0 {
                entropy -= prob * prob.ln();
                support += 1;
            }
        }
        let (peak_cell, peak) = belief.argmax();

        Self {
            revision: belief.revision(),
            entropy,
            peak_cell,
            peak,
            support,
        }
    }
}

//! Per-example translation results.

/// The outcome of translating one input example.
///
/// Hypotheses are ordered best first. Scores and attention are only
/// present when the corresponding option was set for the call, and
/// always have one entry per hypothesis when present. A result is
/// immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    hypotheses: Vec<Vec<String>>,
    scores: Option<Vec<f32>>,
    attention: Option<Vec<Vec<Vec<f32>>>>,
}

impl TranslationResult {
    pub(crate) fn new(
        hypotheses: Vec<Vec<String>>,
        scores: Option<Vec<f32>>,
        attention: Option<Vec<Vec<Vec<f32>>>>,
    ) -> Self {
        if let Some(scores) = &scores {
            debug_assert_eq!(scores.len(), hypotheses.len());
        }
        if let Some(attention) = &attention {
            debug_assert_eq!(attention.len(), hypotheses.len());
        }
        Self {
            hypotheses,
            scores,
            attention,
        }
    }

    /// The best hypothesis.
    pub fn output(&self) -> &[String] {
        &self.hypotheses[0]
    }

    /// All hypotheses, best first.
    pub fn hypotheses(&self) -> &[Vec<String>] {
        &self.hypotheses
    }

    /// Per-hypothesis scores, when `return_scores` was set.
    pub fn scores(&self) -> Option<&[f32]> {
        self.scores.as_deref()
    }

    /// Per-hypothesis attention matrices (target position x source
    /// position), when `return_attention` was set.
    pub fn attention(&self) -> Option<&[Vec<Vec<f32>>]> {
        self.attention.as_deref()
    }

    /// Number of hypotheses stored in this result.
    pub fn num_hypotheses(&self) -> usize {
        self.hypotheses.len()
    }
}

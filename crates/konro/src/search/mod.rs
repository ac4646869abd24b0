//! # Decoding Strategies
//!
//! Drives the [`Decoder`](crate::model::Decoder) seam step by step to turn
//! encoded hidden state into hypotheses: greedy search for `beam_size == 1`
//! (with optional top-k sampling), beam search otherwise, and an
//! alternatives mode that forks at the first unconstrained position after
//! a target prefix.
//!
//! The numerics of the per-step scores live behind the decoder interface;
//! this module only schedules steps, applies prefix constraints, length
//! bounds and ranking penalties, and assembles [`TranslationResult`]s.

mod beam;
mod greedy;

use std::collections::HashSet;

use crate::error::TranslationError;
use crate::model::{Decoder, DecoderStep, EncoderOutput, TokenScore};
use crate::options::TranslationOptions;
use crate::result::TranslationResult;

/// Log probability charged for a forced token the decoder did not rank.
const FORCED_TOKEN_FLOOR: f32 = -10.0;

/// Everything a search strategy needs for one sub-batch.
pub(crate) struct SearchContext<'a> {
    pub encoded: &'a EncoderOutput,
    pub source: &'a [Vec<String>],
    /// One (possibly empty) target prefix per source example.
    pub prefix: &'a [Vec<String>],
    pub options: &'a TranslationOptions,
    pub eos: &'a str,
    pub unk: &'a str,
    /// Candidate restriction from the vocabulary map, when `use_vmap` is on.
    pub allowed: Option<HashSet<String>>,
}

impl SearchContext<'_> {
    pub(crate) fn prefix_for(&self, example: usize) -> &[String] {
        self.prefix.get(example).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attention must be tracked when it is returned, feeds the coverage
    /// penalty, or backs unknown-token replacement.
    pub(crate) fn track_attention(&self) -> bool {
        self.options.return_attention
            || self.options.replace_unknowns
            || self.options.coverage_penalty != 0.0
    }
}

/// One growing or finished hypothesis for one example.
#[derive(Debug, Clone, Default)]
pub(crate) struct Hypothesis {
    pub tokens: Vec<String>,
    /// Cumulative log probability.
    pub log_prob: f32,
    /// One attention row per emitted token, when tracked.
    pub attention: Vec<Vec<f32>>,
    /// Whether a biased prefix hypothesis has left the prefix.
    pub diverged: bool,
}

impl Hypothesis {
    /// Score used to rank finished hypotheses.
    pub(crate) fn final_score(&self, options: &TranslationOptions) -> f32 {
        let normalized = self.log_prob / length_norm(self.tokens.len(), options.length_penalty);
        normalized + coverage_score(&self.attention, options.coverage_penalty)
    }
}

/// GNMT-style length normalization; a zero penalty leaves scores raw.
pub(crate) fn length_norm(length: usize, penalty: f32) -> f32 {
    if penalty == 0.0 {
        1.0
    } else {
        ((5.0 + length as f32) / 6.0).powf(penalty)
    }
}

/// GNMT-style coverage reward over the accumulated attention.
pub(crate) fn coverage_score(attention: &[Vec<f32>], penalty: f32) -> f32 {
    if penalty == 0.0 || attention.is_empty() {
        return 0.0;
    }
    let source_len = attention[0].len();
    let mut total = 0.0;
    for position in 0..source_len {
        let mass: f32 = attention.iter().map(|row| row[position]).sum();
        total += mass.min(1.0).ln();
    }
    penalty * total
}

/// Looks up the score of a forced token, falling back to a fixed floor
/// when the decoder did not rank it.
pub(crate) fn forced_score(step: &DecoderStep, token: &str) -> f32 {
    step.candidates
        .iter()
        .find(|candidate| candidate.token == token)
        .map(|candidate| candidate.log_prob)
        .unwrap_or(FORCED_TOKEN_FLOOR)
}

/// Candidates that are legal at the given position: EOS is suppressed
/// while the hypothesis is shorter than the minimum decoding length.
pub(crate) fn legal_candidates<'a>(
    step: &'a DecoderStep,
    generated: usize,
    options: &TranslationOptions,
    eos: &str,
) -> Vec<&'a TokenScore> {
    step.candidates
        .iter()
        .filter(|candidate| generated >= options.min_decoding_length || candidate.token != eos)
        .collect()
}

/// Builds the per-example result, applying unknown replacement and the
/// score/attention visibility options.
pub(crate) fn collect_result(
    mut hypotheses: Vec<Hypothesis>,
    source: &[String],
    context: &SearchContext<'_>,
) -> TranslationResult {
    let options = context.options;
    if options.replace_unknowns {
        for hypothesis in &mut hypotheses {
            replace_unknowns(hypothesis, source, context.unk);
        }
    }
    let scores = options
        .return_scores
        .then(|| hypotheses.iter().map(|h| h.final_score(options)).collect());
    let attention = options
        .return_attention
        .then(|| hypotheses.iter().map(|h| h.attention.clone()).collect());
    TranslationResult::new(
        hypotheses.into_iter().map(|h| h.tokens).collect(),
        scores,
        attention,
    )
}

/// Replaces unknown target tokens with the source token under the argmax
/// of the corresponding attention row.
fn replace_unknowns(hypothesis: &mut Hypothesis, source: &[String], unk: &str) {
    for (position, token) in hypothesis.tokens.iter_mut().enumerate() {
        if token != unk || source.is_empty() {
            continue;
        }
        let Some(row) = hypothesis.attention.get(position) else {
            continue;
        };
        let best = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap_or(0);
        *token = source[best].clone();
    }
}

/// Runs the configured search strategy over one encoded sub-batch.
///
/// Returns one result per example, in batch order. The options must
/// already be validated.
pub(crate) async fn decode_batch(
    decoder: &mut dyn Decoder,
    context: &SearchContext<'_>,
) -> Result<Vec<TranslationResult>, TranslationError> {
    debug_assert!(context.options.validated);
    if context.options.return_alternatives {
        greedy::alternatives_search(decoder, context).await
    } else if context.options.beam_size == 1 {
        greedy::greedy_search(decoder, context).await
    } else {
        beam::beam_search(decoder, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_norm_is_identity_without_penalty() {
        assert_eq!(length_norm(12, 0.0), 1.0);
        assert!(length_norm(12, 1.0) > length_norm(3, 1.0));
    }

    #[test]
    fn coverage_score_rewards_covered_sources() {
        // Two target rows fully covering two source positions.
        let covered = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        // All mass on one position, the other never attended.
        let skewed = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        assert_eq!(coverage_score(&covered, 0.2), 0.0);
        assert!(coverage_score(&skewed, 0.2) < coverage_score(&covered, 0.2));
        assert_eq!(coverage_score(&skewed, 0.0), 0.0);
    }

    #[test]
    fn forced_score_falls_back_to_floor() {
        let step = DecoderStep {
            candidates: vec![TokenScore {
                token: "a".to_string(),
                log_prob: -0.5,
            }],
            attention: vec![],
        };
        assert_eq!(forced_score(&step, "a"), -0.5);
        assert_eq!(forced_score(&step, "b"), FORCED_TOKEN_FLOOR);
    }

    #[test]
    fn replace_unknowns_uses_attention_argmax() {
        let mut hypothesis = Hypothesis {
            tokens: vec!["x".to_string(), "<unk>".to_string()],
            attention: vec![vec![1.0, 0.0], vec![0.2, 0.8]],
            ..Default::default()
        };
        let source = vec!["eins".to_string(), "zwei".to_string()];
        replace_unknowns(&mut hypothesis, &source, "<unk>");
        assert_eq!(hypothesis.tokens, vec!["x".to_string(), "zwei".to_string()]);
    }
}

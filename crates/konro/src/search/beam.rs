//! Beam search with length/coverage penalties and prefix biasing.

use super::{forced_score, Hypothesis, SearchContext};
use crate::error::TranslationError;
use crate::model::Decoder;
use crate::result::TranslationResult;

/// One scored continuation of a live hypothesis.
struct Expansion {
    base: Hypothesis,
    token: String,
    total_log_prob: f32,
    attention: Vec<f32>,
    diverged: bool,
}

struct ExampleBeams {
    live: Vec<Hypothesis>,
    /// Finished hypotheses with their final (penalized) score.
    finished: Vec<(f32, Hypothesis)>,
}

impl ExampleBeams {
    fn done(&self, beam_size: usize) -> bool {
        self.live.is_empty() || self.finished.len() >= beam_size
    }
}

/// Beam search over one encoded sub-batch.
///
/// Keeps `beam_size` live hypotheses per example, ranked by cumulative log
/// probability; finished hypotheses are re-ranked with the length and
/// coverage penalties. An example ends when it holds `beam_size` finished
/// hypotheses, runs out of live ones, or hits `max_decoding_length` (any
/// survivors are then force-finished).
pub(crate) async fn beam_search(
    decoder: &mut dyn Decoder,
    context: &SearchContext<'_>,
) -> Result<Vec<TranslationResult>, TranslationError> {
    let options = context.options;
    let n = context.source.len();
    let biased = options.biased_prefix();

    let mut beams: Vec<ExampleBeams> = (0..n)
        .map(|_| ExampleBeams {
            live: vec![Hypothesis::default()],
            finished: Vec::new(),
        })
        .collect();

    for _ in 0..options.max_decoding_length {
        // Gather one row per live hypothesis of every unfinished example.
        let mut example_index = Vec::new();
        let mut targets = Vec::new();
        for (example, beam) in beams.iter().enumerate() {
            if beam.done(options.beam_size) {
                continue;
            }
            for hypothesis in &beam.live {
                example_index.push(example);
                targets.push(hypothesis.tokens.clone());
            }
        }
        if example_index.is_empty() {
            break;
        }

        let steps = decoder
            .step(
                context.encoded,
                &example_index,
                &targets,
                options.beam_size * 2 + 1,
                context.allowed.as_ref(),
            )
            .await?;
        if steps.len() != example_index.len() {
            return Err(TranslationError::Decode(format!(
                "decoder returned {} rows for {} beam hypotheses",
                steps.len(),
                example_index.len()
            )));
        }

        // Expand every row into scored continuations.
        let mut expansions: Vec<Vec<Expansion>> = (0..n).map(|_| Vec::new()).collect();
        let mut row = 0;
        for (example, beam) in beams.iter().enumerate() {
            if beam.done(options.beam_size) {
                continue;
            }
            for hypothesis in &beam.live {
                let step = &steps[row];
                row += 1;
                let prefix = context.prefix_for(example);
                let position = hypothesis.tokens.len();
                let in_prefix = !hypothesis.diverged && position < prefix.len();

                if in_prefix && !biased {
                    // Hard constraint: the prefix token is the only continuation.
                    let token = prefix[position].clone();
                    let log_prob = forced_score(step, &token);
                    expansions[example].push(Expansion {
                        base: hypothesis.clone(),
                        total_log_prob: hypothesis.log_prob + log_prob,
                        attention: step.attention.clone(),
                        diverged: false,
                        token,
                    });
                    continue;
                }

                for candidate in &step.candidates {
                    if candidate.token == context.eos
                        && hypothesis.tokens.len() < options.min_decoding_length
                    {
                        continue;
                    }
                    let mut log_prob = candidate.log_prob;
                    let mut diverged = hypothesis.diverged;
                    if in_prefix {
                        // Soft bias: interpolate towards the prefix token and
                        // let the hypothesis diverge from it.
                        let beta = options.prefix_bias_beta;
                        if candidate.token == prefix[position] {
                            log_prob = (beta + (1.0 - beta) * log_prob.exp()).ln();
                        } else {
                            log_prob += (1.0 - beta).ln();
                            diverged = true;
                        }
                    }
                    expansions[example].push(Expansion {
                        base: hypothesis.clone(),
                        total_log_prob: hypothesis.log_prob + log_prob,
                        attention: step.attention.clone(),
                        diverged,
                        token: candidate.token.clone(),
                    });
                }
            }
        }

        // Re-rank and retain the best continuations per example.
        for (example, mut candidates) in expansions.into_iter().enumerate() {
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by(|a, b| b.total_log_prob.total_cmp(&a.total_log_prob));
            let mut live = Vec::new();
            for expansion in candidates {
                let mut hypothesis = expansion.base;
                hypothesis.log_prob = expansion.total_log_prob;
                hypothesis.diverged = expansion.diverged;
                if expansion.token == context.eos {
                    if beams[example].finished.len() < options.beam_size {
                        let score = hypothesis.final_score(options);
                        beams[example].finished.push((score, hypothesis));
                    }
                } else if live.len() < options.beam_size {
                    hypothesis.tokens.push(expansion.token);
                    if context.track_attention() {
                        hypothesis.attention.push(expansion.attention);
                    }
                    live.push(hypothesis);
                }
            }
            beams[example].live = live;
        }
    }

    // Force-finish anything still alive, then rank and collect.
    Ok(beams
        .into_iter()
        .enumerate()
        .map(|(example, beam)| {
            let mut finished = beam.finished;
            for hypothesis in beam.live {
                if finished.len() >= options.beam_size {
                    break;
                }
                let score = hypothesis.final_score(options);
                finished.push((score, hypothesis));
            }
            if finished.is_empty() {
                finished.push((0.0, Hypothesis::default()));
            }
            finished.sort_by(|a, b| b.0.total_cmp(&a.0));
            finished.truncate(options.num_hypotheses);
            let hypotheses = finished.into_iter().map(|(_, h)| h).collect();
            super::collect_result(hypotheses, &context.source[example], context)
        })
        .collect())
}

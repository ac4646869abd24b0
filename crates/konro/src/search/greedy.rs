//! Greedy decoding, top-k sampling, and prefix alternatives.

use rand::Rng;

use super::{collect_result, forced_score, legal_candidates, Hypothesis, SearchContext};
use crate::error::TranslationError;
use crate::model::Decoder;
use crate::result::TranslationResult;

/// Candidates requested per step; two gives headroom to step over a
/// suppressed end-of-sequence token. `sampling_topk == 0` passes the
/// full-distribution request through to the decoder.
fn candidate_request(context: &SearchContext<'_>) -> usize {
    match context.options.sampling_topk {
        0 => 0,
        topk => topk.max(2),
    }
}

/// Samples an index from softmax(log_probs / temperature).
fn sample_index(log_probs: &[f32], temperature: f32) -> usize {
    let temperature = if temperature > 0.0 { temperature } else { 1.0 };
    let max = log_probs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = log_probs
        .iter()
        .map(|lp| ((lp - max) / temperature).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    let mut draw = rand::thread_rng().gen_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if draw < *weight {
            return index;
        }
        draw -= weight;
    }
    weights.len() - 1
}

/// Advances every row one token at a time until it emits end-of-sequence
/// or reaches the decoding length bound.
///
/// `row_example[row]` is the example slot of each row within the encoded
/// batch; several rows may share one example (the alternatives mode forks
/// rows). When `force_prefix` is set, positions inside the row's target
/// prefix are hard-constrained to it.
async fn advance_rows(
    decoder: &mut dyn Decoder,
    context: &SearchContext<'_>,
    rows: &mut [Hypothesis],
    row_example: &[usize],
    finished: &mut [bool],
    force_prefix: bool,
) -> Result<(), TranslationError> {
    let options = context.options;
    loop {
        let active: Vec<usize> = (0..rows.len())
            .filter(|&row| !finished[row] && rows[row].tokens.len() < options.max_decoding_length)
            .collect();
        if active.is_empty() {
            break;
        }

        let example_index: Vec<usize> = active.iter().map(|&row| row_example[row]).collect();
        let targets: Vec<Vec<String>> = active.iter().map(|&row| rows[row].tokens.clone()).collect();
        let steps = decoder
            .step(
                context.encoded,
                &example_index,
                &targets,
                candidate_request(context),
                context.allowed.as_ref(),
            )
            .await?;
        if steps.len() != active.len() {
            return Err(TranslationError::Decode(format!(
                "decoder returned {} rows for {} active hypotheses",
                steps.len(),
                active.len()
            )));
        }

        for (slot, &row) in active.iter().enumerate() {
            let step = &steps[slot];
            let hypothesis = &mut rows[row];
            let position = hypothesis.tokens.len();
            let prefix = context.prefix_for(row_example[row]);

            let (token, log_prob) = if force_prefix && position < prefix.len() {
                let forced = prefix[position].clone();
                let score = forced_score(step, &forced);
                (forced, score)
            } else {
                let legal = legal_candidates(step, position, options, context.eos);
                let ranked = if legal.is_empty() {
                    step.candidates.iter().collect()
                } else {
                    legal
                };
                let Some(first) = ranked.first() else {
                    return Err(TranslationError::Decode(
                        "decoder returned no candidates".to_string(),
                    ));
                };
                if options.sampling_topk == 1 {
                    (first.token.clone(), first.log_prob)
                } else {
                    let take = match options.sampling_topk {
                        0 => ranked.len(),
                        topk => ranked.len().min(topk),
                    };
                    let ranked = &ranked[..take];
                    let log_probs: Vec<f32> = ranked.iter().map(|c| c.log_prob).collect();
                    let pick = sample_index(&log_probs, options.sampling_temperature);
                    (ranked[pick].token.clone(), ranked[pick].log_prob)
                }
            };

            hypothesis.log_prob += log_prob;
            if token == context.eos {
                finished[row] = true;
            } else {
                hypothesis.tokens.push(token);
                if context.track_attention() {
                    hypothesis.attention.push(step.attention.clone());
                }
            }
        }
    }
    Ok(())
}

/// Greedy search: one hypothesis per example, argmax or sampled per step.
pub(crate) async fn greedy_search(
    decoder: &mut dyn Decoder,
    context: &SearchContext<'_>,
) -> Result<Vec<TranslationResult>, TranslationError> {
    let n = context.source.len();
    let mut rows: Vec<Hypothesis> = vec![Hypothesis::default(); n];
    let mut finished = vec![false; n];
    let row_example: Vec<usize> = (0..n).collect();

    advance_rows(decoder, context, &mut rows, &row_example, &mut finished, true).await?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(example, row)| collect_result(vec![row], &context.source[example], context))
        .collect())
}

/// Alternatives mode: force the target prefix, fork the best
/// `num_hypotheses` candidates at the first unconstrained position, then
/// finish every fork greedily.
pub(crate) async fn alternatives_search(
    decoder: &mut dyn Decoder,
    context: &SearchContext<'_>,
) -> Result<Vec<TranslationResult>, TranslationError> {
    let options = context.options;
    let n = context.source.len();

    // Walk every example to the end of its prefix.
    let mut bases: Vec<Hypothesis> = vec![Hypothesis::default(); n];
    loop {
        let active: Vec<usize> = (0..n)
            .filter(|&example| {
                let position = bases[example].tokens.len();
                position < context.prefix_for(example).len()
                    && position < options.max_decoding_length
            })
            .collect();
        if active.is_empty() {
            break;
        }
        let example_index: Vec<usize> = active.clone();
        let targets: Vec<Vec<String>> =
            active.iter().map(|&e| bases[e].tokens.clone()).collect();
        let steps = decoder
            .step(context.encoded, &example_index, &targets, 1, context.allowed.as_ref())
            .await?;
        for (slot, &example) in active.iter().enumerate() {
            let position = bases[example].tokens.len();
            let forced = context.prefix_for(example)[position].clone();
            bases[example].log_prob += forced_score(&steps[slot], &forced);
            bases[example].tokens.push(forced);
            if context.track_attention() {
                bases[example].attention.push(steps[slot].attention.clone());
            }
        }
    }

    // Fork at the first unconstrained position.
    let forkable: Vec<usize> = (0..n)
        .filter(|&e| bases[e].tokens.len() < options.max_decoding_length)
        .collect();
    let mut forks: Vec<Vec<Hypothesis>> = bases.iter().map(|base| vec![base.clone()]).collect();
    let mut fork_finished: Vec<Vec<bool>> = vec![vec![false]; n];
    if !forkable.is_empty() {
        let targets: Vec<Vec<String>> =
            forkable.iter().map(|&e| bases[e].tokens.clone()).collect();
        let steps = decoder
            .step(
                context.encoded,
                &forkable,
                &targets,
                options.num_hypotheses + 1,
                context.allowed.as_ref(),
            )
            .await?;
        for (slot, &example) in forkable.iter().enumerate() {
            let base = &bases[example];
            let legal = legal_candidates(&steps[slot], base.tokens.len(), options, context.eos);
            let mut branches = Vec::new();
            let mut branch_done = Vec::new();
            for candidate in legal.iter().take(options.num_hypotheses) {
                let mut branch = base.clone();
                branch.log_prob += candidate.log_prob;
                if candidate.token == context.eos {
                    branch_done.push(true);
                } else {
                    branch.tokens.push(candidate.token.clone());
                    if context.track_attention() {
                        branch.attention.push(steps[slot].attention.clone());
                    }
                    branch_done.push(false);
                }
                branches.push(branch);
            }
            if !branches.is_empty() {
                forks[example] = branches;
                fork_finished[example] = branch_done;
            }
        }
    }

    // Finish every fork greedily, unconstrained.
    let mut rows = Vec::new();
    let mut rows_example = Vec::new();
    let mut finished = Vec::new();
    let mut fork_slots: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (example, branches) in forks.into_iter().enumerate() {
        for (branch, done) in branches.into_iter().zip(&fork_finished[example]) {
            fork_slots[example].push(rows.len());
            rows.push(branch);
            rows_example.push(example);
            finished.push(*done);
        }
    }
    advance_rows(decoder, context, &mut rows, &rows_example, &mut finished, false).await?;

    Ok(fork_slots
        .into_iter()
        .enumerate()
        .map(|(example, slots)| {
            let hypotheses = slots.into_iter().map(|slot| rows[slot].clone()).collect();
            collect_result(hypotheses, &context.source[example], context)
        })
        .collect())
}

//! # Batch Planner
//!
//! Turns an arbitrary list of variable-length examples into execution
//! batches shaped for efficient compute, while recording enough
//! information to restore the caller's original order afterwards.
//!
//! Examples are sorted by source length so each batch holds sequences of
//! similar length, which minimizes padding inside the batch. The sort is
//! stable, the partition is exact: every input index appears in exactly
//! one batch.

use crate::options::TranslationOptions;

/// Unit used to bound the size of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    /// `max_batch_size` counts examples.
    Examples,
    /// `max_batch_size` counts the cumulative number of tokens.
    Tokens,
}

/// One unit of execution produced by the planner.
///
/// `source`, `target` and `example_index` always have the same length;
/// `target` holds the target prefix for each example (empty when none
/// applies) and `example_index` holds the position of each example in the
/// caller's original input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub source: Vec<Vec<String>>,
    pub target: Vec<Vec<String>>,
    /// Index of each example in the original input.
    pub example_index: Vec<usize>,
}

impl Batch {
    /// Number of examples in this batch.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Whether this batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    fn push(&mut self, index: usize, source: &[Vec<String>], target: &[Vec<String>]) {
        self.source.push(source[index].clone());
        self.target
            .push(target.get(index).cloned().unwrap_or_default());
        self.example_index.push(index);
    }
}

/// Cost of adding one more example to a batch under the given batch type.
fn batch_cost(current: usize, tokens: usize, batch_type: BatchType) -> usize {
    match batch_type {
        BatchType::Examples => current + 1,
        BatchType::Tokens => current + tokens,
    }
}

/// Rebatches the input for execution.
///
/// With `max_batch_size == 0` the input is forwarded as a single batch in
/// its original order. Otherwise example indices are stable-sorted by
/// source length and partitioned greedily: a new batch starts whenever
/// adding the next example would exceed the budget. An example whose own
/// token count already exceeds a [`BatchType::Tokens`] budget still forms
/// a singleton batch; it is never dropped.
///
/// `target_prefix` may be empty or must hold one (possibly empty) entry
/// per source example.
pub fn rebatch_input(
    source: &[Vec<String>],
    target_prefix: &[Vec<String>],
    max_batch_size: usize,
    batch_type: BatchType,
) -> Vec<Batch> {
    debug_assert!(target_prefix.is_empty() || target_prefix.len() == source.len());
    if source.is_empty() {
        return Vec::new();
    }

    if max_batch_size == 0 {
        let mut batch = Batch::default();
        for index in 0..source.len() {
            batch.push(index, source, target_prefix);
        }
        return vec![batch];
    }

    let mut order: Vec<usize> = (0..source.len()).collect();
    order.sort_by_key(|&i| source[i].len());

    let mut batches = Vec::new();
    let mut batch = Batch::default();
    let mut cost = 0;
    for index in order {
        let tokens = source[index].len();
        let next_cost = batch_cost(cost, tokens, batch_type);
        if !batch.is_empty() && next_cost > max_batch_size {
            batches.push(std::mem::take(&mut batch));
            cost = 0;
        }
        cost = batch_cost(cost, tokens, batch_type);
        if batch.is_empty() && cost > max_batch_size {
            log::warn!(
                "example {} alone exceeds the batch budget ({} > {} {:?}); emitting it as a singleton batch",
                index,
                cost,
                max_batch_size,
                batch_type
            );
        }
        batch.push(index, source, target_prefix);
    }
    if !batch.is_empty() {
        batches.push(batch);
    }

    log::debug!(
        "planned {} batch(es) for {} example(s) (budget {} {:?})",
        batches.len(),
        source.len(),
        max_batch_size,
        batch_type
    );
    batches
}

/// Options-level entry point for the planner.
///
/// When size-based splitting is disabled and the options do not ask for
/// planning, the input is forwarded untouched as one identity batch.
/// With planning requested but no budget, the input is still sorted by
/// length into a single batch.
pub(crate) fn rebatch_with_options(
    source: &[Vec<String>],
    target_prefix: &[Vec<String>],
    options: &TranslationOptions,
) -> Vec<Batch> {
    if options.max_batch_size == 0 && !options.rebatch_input {
        return rebatch_input(source, target_prefix, 0, options.batch_type);
    }
    let budget = if options.max_batch_size == 0 {
        usize::MAX
    } else {
        options.max_batch_size
    };
    rebatch_input(source, target_prefix, budget, options.batch_type)
}

//! # Translation Options
//!
//! Configuration values consumed by the translator and the pool.
//!
//! An options value is a plain struct that must pass [`TranslationOptions::validate`]
//! before it reaches any compute path. Validation runs once; the outcome is
//! cached on the value so repeated use is cheap. Treat a validated value as
//! frozen: mutating it afterwards is not supported.

use crate::batch::BatchType;
use crate::error::TranslationError;

/// Decoding and batching configuration for a translation call.
///
/// The defaults mirror a conservative production setup: a small beam,
/// no sampling, one returned hypothesis, scores on.
///
/// # Example
///
/// ```
/// use konro::TranslationOptions;
///
/// let mut options = TranslationOptions::default();
/// options.beam_size = 4;
/// options.num_hypotheses = 2;
/// options.validate().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Maximum batch size to run the model on (0 to forward the input as is).
    ///
    /// When more examples are submitted than fit in one batch, they are
    /// sorted by length and split into batches of at most this size;
    /// grouping similar lengths reduces padding waste.
    pub max_batch_size: usize,

    /// Whether `max_batch_size` counts examples or tokens.
    pub batch_type: BatchType,

    /// Beam size for beam search (1 to run greedy search).
    pub beam_size: usize,

    /// Length penalty applied when ranking finished beam hypotheses.
    pub length_penalty: f32,

    /// Coverage penalty applied when ranking finished beam hypotheses.
    pub coverage_penalty: f32,

    /// Biases decoding towards the target prefix when in the open
    /// interval (0, 1) and beam search is active. A value outside (0, 1)
    /// makes the prefix, if given, a hard constraint.
    pub prefix_bias_beta: f32,

    /// Maximum number of decoding steps per example.
    pub max_decoding_length: usize,

    /// Minimum number of generated tokens before end-of-sequence is allowed.
    pub min_decoding_length: usize,

    /// Randomly sample among the top K candidates (1 disables sampling,
    /// 0 samples the full distribution; not compatible with beam search).
    pub sampling_topk: usize,

    /// Softmax temperature applied when sampling; higher values increase
    /// randomness.
    pub sampling_temperature: f32,

    /// Use the vocabulary map included with the model, if any.
    pub use_vmap: bool,

    /// Number of hypotheses to include in each result (must not exceed
    /// `beam_size` unless `return_alternatives` is set).
    pub num_hypotheses: usize,

    /// Include hypothesis scores in the results.
    pub return_scores: bool,

    /// Include attention matrices in the results.
    pub return_attention: bool,

    /// Return alternatives at the first unconstrained decoding position.
    /// Typically combined with a target prefix to branch at a specific
    /// location in the translation.
    pub return_alternatives: bool,

    /// Replace unknown target tokens by the source token with the highest
    /// attention weight.
    pub replace_unknowns: bool,

    /// Whether validation has already succeeded for this value.
    pub(crate) validated: bool,

    /// Whether the batch planner should run even when size-based splitting
    /// is disabled. The single-example translate path turns this off.
    pub(crate) rebatch_input: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 0,
            batch_type: BatchType::Examples,
            beam_size: 2,
            length_penalty: 0.0,
            coverage_penalty: 0.0,
            prefix_bias_beta: 0.0,
            max_decoding_length: 250,
            min_decoding_length: 1,
            sampling_topk: 1,
            sampling_temperature: 1.0,
            use_vmap: false,
            num_hypotheses: 1,
            return_scores: true,
            return_attention: false,
            return_alternatives: false,
            replace_unknowns: false,
            validated: false,
            rebatch_input: true,
        }
    }
}

impl TranslationOptions {
    /// Checks the configuration for internal consistency.
    ///
    /// Checks run in a fixed order and the first violation is returned as
    /// [`TranslationError::InvalidOptions`]. On success the value is marked
    /// validated and subsequent calls return immediately.
    pub fn validate(&mut self) -> Result<(), TranslationError> {
        if self.validated {
            return Ok(());
        }
        if self.min_decoding_length > self.max_decoding_length {
            return Err(TranslationError::InvalidOptions(format!(
                "min_decoding_length ({}) is greater than max_decoding_length ({})",
                self.min_decoding_length, self.max_decoding_length
            )));
        }
        if self.num_hypotheses > self.beam_size && !self.return_alternatives {
            return Err(TranslationError::InvalidOptions(format!(
                "num_hypotheses ({}) cannot be greater than beam_size ({})",
                self.num_hypotheses, self.beam_size
            )));
        }
        if self.beam_size > 1 && self.sampling_topk != 1 {
            return Err(TranslationError::InvalidOptions(
                "beam search is not compatible with random sampling (sampling_topk must be 1)"
                    .to_string(),
            ));
        }
        if self.beam_size == 0 {
            return Err(TranslationError::InvalidOptions(
                "beam_size must be at least 1".to_string(),
            ));
        }
        self.validated = true;
        Ok(())
    }

    /// Whether a soft prefix bias is active for the given configuration.
    pub(crate) fn biased_prefix(&self) -> bool {
        self.beam_size > 1 && self.prefix_bias_beta > 0.0 && self.prefix_bias_beta < 1.0
    }
}

//! # Model Collaborators
//!
//! This module defines the seams between the batching/scheduling core and
//! the compute side of the engine: model loading, encoding, and per-step
//! decoding. The core drives these interfaces but never interprets their
//! numerics; a model implementation supplies the actual forward passes.
//!
//! A [`Seq2SeqModel`] is a shared, read-only handle (weights, vocabulary,
//! config) that is safe to use from any number of translators concurrently.
//! Encoder and decoder instances created from it hold mutable compute
//! state and are owned exclusively by one translator copy.

use std::any::Any;
use std::fmt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TranslationError;

/// Device a model executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

/// Numeric representation used during model execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeType {
    /// Keep whatever precision the model was saved with.
    #[default]
    Default,
    Float,
    Float16,
    Int8,
}

/// Opaque hidden state produced by an encoder.
///
/// The core carries this value from [`Encoder::encode`] to
/// [`Decoder::step`] without looking inside; only the decoder paired with
/// the producing encoder knows the concrete type.
pub struct EncoderOutput {
    state: Box<dyn Any + Send + Sync>,
}

impl EncoderOutput {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self {
            state: Box::new(state),
        }
    }

    /// Recovers the concrete state. Returns `None` when the decoder is
    /// paired with an encoder it does not understand.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }
}

impl fmt::Debug for EncoderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderOutput").finish_non_exhaustive()
    }
}

/// One candidate next token with its log probability.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenScore {
    pub token: String,
    pub log_prob: f32,
}

/// Decoder output for one hypothesis row at one step.
#[derive(Debug, Clone, Default)]
pub struct DecoderStep {
    /// Candidate next tokens, best first.
    pub candidates: Vec<TokenScore>,
    /// Attention distribution over the row's source positions.
    pub attention: Vec<f32>,
}

/// Encodes a batch of source sequences into hidden state.
#[async_trait]
pub trait Encoder: Send {
    async fn encode(&mut self, source: &[Vec<String>]) -> Result<EncoderOutput, TranslationError>;
}

/// Scores next-token candidates for a set of growing hypotheses.
///
/// Rows are hypotheses, not examples: beam search passes several rows per
/// encoded example. `example_index[row]` maps each row back to its example
/// within the encoded batch, and `targets[row]` holds the tokens generated
/// so far for that row.
#[async_trait]
pub trait Decoder: Send {
    /// Returns one [`DecoderStep`] per row, each carrying at most
    /// `num_candidates` candidates; `num_candidates == 0` requests the
    /// untruncated distribution. When `allowed` is given the
    /// implementation must only produce tokens from that set.
    async fn step(
        &mut self,
        encoded: &EncoderOutput,
        example_index: &[usize],
        targets: &[Vec<String>],
        num_candidates: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<DecoderStep>, TranslationError>;
}

/// Model-provided restriction of candidate output tokens.
pub trait VocabularyMap: Send + Sync {
    /// The target tokens allowed when translating the given source batch.
    fn allowed(&self, source: &[Vec<String>]) -> HashSet<String>;
}

/// A shared, read-only sequence-to-sequence model.
///
/// Implementations must be safe for concurrent use without external
/// locking; every mutable compute state lives in the encoder/decoder
/// instances returned by the factory methods.
pub trait Seq2SeqModel: Send + Sync {
    /// Builds a fresh encoder bound to this model's weights.
    fn make_encoder(&self) -> Box<dyn Encoder>;

    /// Builds a fresh decoder bound to this model's weights.
    fn make_decoder(&self) -> Box<dyn Decoder>;

    fn device(&self) -> Device;

    fn device_index(&self) -> usize {
        0
    }

    fn compute_type(&self) -> ComputeType {
        ComputeType::Default
    }

    /// Token that terminates a hypothesis.
    fn eos_token(&self) -> &str;

    /// Token the model emits for out-of-vocabulary targets.
    fn unk_token(&self) -> &str;

    /// The vocabulary map shipped with the model, if any. Consulted only
    /// when `use_vmap` is set on the options.
    fn vocabulary_map(&self) -> Option<Arc<dyn VocabularyMap>> {
        None
    }
}

/// Loads a model from storage onto a device at a given precision.
pub trait ModelLoader {
    fn load(
        &self,
        path: &Path,
        device: Device,
        device_index: usize,
        compute_type: ComputeType,
    ) -> Result<Arc<dyn Seq2SeqModel>, TranslationError>;
}

#[cfg(test)]
/// Deterministic mock model used by the translator, search and pool tests.
pub(crate) mod mock;

#[cfg(test)]
mod tests {
    use super::*;

    // Worker tasks hold `&EncoderOutput` across await points, so the
    // state must be shareable between threads.
    #[test]
    fn encoder_output_crosses_task_boundaries() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EncoderOutput>();

        let output = EncoderOutput::new(vec![1u32, 2, 3]);
        assert_eq!(output.downcast_ref::<Vec<u32>>(), Some(&vec![1u32, 2, 3]));
        assert!(output.downcast_ref::<String>().is_none());
    }
}

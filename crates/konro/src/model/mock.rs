//! Mock model for tests.
//!
//! The mock "translates" by reversing the source tokens and then emitting
//! the end-of-sequence token. Candidate fans are deterministic: rank 0 is
//! the expected token, lower ranks are visibly derived distractors. The
//! attention for target position `p` is a one-hot on the source position
//! the reversal reads from, which makes unknown-token replacement
//! observable in tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ComputeType, Decoder, DecoderStep, Device, Encoder, EncoderOutput, ModelLoader, Seq2SeqModel,
    TokenScore, VocabularyMap,
};
use crate::error::TranslationError;

pub(crate) const EOS: &str = "</s>";
pub(crate) const UNK: &str = "<unk>";

#[derive(Default)]
pub(crate) struct MockModel {
    pub(crate) device: Device,
    pub(crate) device_index: usize,
    pub(crate) compute_type: ComputeType,
    /// Fail every encode call with a decode error.
    pub(crate) fail_encode: bool,
    /// Target positions at which the decoder emits `<unk>` instead of the
    /// expected token.
    pub(crate) unk_positions: Vec<usize>,
    /// Artificial latency per decoder step, for concurrency tests.
    pub(crate) step_delay: Option<Duration>,
    pub(crate) vmap: Option<Arc<dyn VocabularyMap>>,
}

impl MockModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_encode: true,
            ..Self::default()
        }
    }

    /// The translation the mock converges to for one source sequence.
    pub(crate) fn expected_translation(source: &[String]) -> Vec<String> {
        source.iter().rev().cloned().collect()
    }

    pub(crate) fn expected_token(source: &[String], position: usize) -> String {
        if position < source.len() {
            source[source.len() - 1 - position].clone()
        } else {
            EOS.to_string()
        }
    }
}

impl Seq2SeqModel for MockModel {
    fn make_encoder(&self) -> Box<dyn Encoder> {
        Box::new(MockEncoder {
            fail: self.fail_encode,
        })
    }

    fn make_decoder(&self) -> Box<dyn Decoder> {
        Box::new(MockDecoder {
            unk_positions: self.unk_positions.clone(),
            step_delay: self.step_delay,
        })
    }

    fn device(&self) -> Device {
        self.device
    }

    fn device_index(&self) -> usize {
        self.device_index
    }

    fn compute_type(&self) -> ComputeType {
        self.compute_type
    }

    fn eos_token(&self) -> &str {
        EOS
    }

    fn unk_token(&self) -> &str {
        UNK
    }

    fn vocabulary_map(&self) -> Option<Arc<dyn VocabularyMap>> {
        self.vmap.clone()
    }
}

struct MockEncoder {
    fail: bool,
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn encode(&mut self, source: &[Vec<String>]) -> Result<EncoderOutput, TranslationError> {
        if self.fail {
            return Err(TranslationError::Decode("mock encoder failure".to_string()));
        }
        Ok(EncoderOutput::new(source.to_vec()))
    }
}

struct MockDecoder {
    unk_positions: Vec<usize>,
    step_delay: Option<Duration>,
}

#[async_trait]
impl Decoder for MockDecoder {
    async fn step(
        &mut self,
        encoded: &EncoderOutput,
        example_index: &[usize],
        targets: &[Vec<String>],
        num_candidates: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<DecoderStep>, TranslationError> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        let source = encoded
            .downcast_ref::<Vec<Vec<String>>>()
            .ok_or_else(|| TranslationError::Decode("unexpected encoder state".to_string()))?;

        let mut steps = Vec::with_capacity(targets.len());
        for (row, target) in targets.iter().enumerate() {
            let row_source = &source[example_index[row]];
            let position = target.len();
            let mut expected = MockModel::expected_token(row_source, position);
            if self.unk_positions.contains(&position) && expected != EOS {
                expected = UNK.to_string();
            }

            // A zero request asks for the untruncated distribution; this
            // model's whole fan is the expected token plus three distractors.
            let fan = if num_candidates == 0 { 4 } else { num_candidates };
            let mut candidates = Vec::new();
            for rank in 0..fan {
                let token = if rank == 0 {
                    expected.clone()
                } else {
                    format!("{}~{}", expected, rank)
                };
                if let Some(allowed) = allowed {
                    if token != EOS && !allowed.contains(&token) {
                        continue;
                    }
                }
                candidates.push(TokenScore {
                    log_prob: -0.1 - 0.4 * rank as f32,
                    token,
                });
            }

            let mut attention = vec![0.0; row_source.len()];
            if !attention.is_empty() {
                let focus = row_source.len().saturating_sub(position + 1);
                attention[focus.min(row_source.len() - 1)] = 1.0;
            }

            steps.push(DecoderStep {
                candidates,
                attention,
            });
        }
        Ok(steps)
    }
}

/// Vocabulary map that allows an explicit token set (plus EOS).
pub(crate) struct FixedVocabularyMap {
    pub(crate) tokens: HashSet<String>,
}

impl VocabularyMap for FixedVocabularyMap {
    fn allowed(&self, _source: &[Vec<String>]) -> HashSet<String> {
        self.tokens.clone()
    }
}

/// Loader that serves mock models for any path except `missing`.
pub(crate) struct MockLoader;

impl ModelLoader for MockLoader {
    fn load(
        &self,
        path: &Path,
        device: Device,
        device_index: usize,
        compute_type: ComputeType,
    ) -> Result<Arc<dyn Seq2SeqModel>, TranslationError> {
        if path.ends_with("missing") {
            return Err(TranslationError::Decode(format!(
                "cannot read model from {}",
                path.display()
            )));
        }
        Ok(Arc::new(MockModel {
            device,
            device_index,
            compute_type,
            ..MockModel::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn decoder_walks_the_reversed_source() {
        let model = MockModel::new();
        let mut encoder = model.make_encoder();
        let mut decoder = model.make_decoder();

        let source = vec![tokens(&["a", "b", "c"])];
        let encoded = encoder.encode(&source).await.unwrap();

        let steps = decoder
            .step(&encoded, &[0], &[vec![]], 2, None)
            .await
            .unwrap();
        assert_eq!(steps[0].candidates[0].token, "c");
        assert_eq!(steps[0].candidates[1].token, "c~1");
        // First target position reads the last source position.
        assert_eq!(steps[0].attention, vec![0.0, 0.0, 1.0]);

        let steps = decoder
            .step(&encoded, &[0], &[tokens(&["c", "b", "a"])], 1, None)
            .await
            .unwrap();
        assert_eq!(steps[0].candidates[0].token, EOS);
    }

    #[tokio::test]
    async fn failing_model_reports_decode_error() {
        let model = MockModel::failing();
        let mut encoder = model.make_encoder();
        let err = encoder
            .encode(&[tokens(&["a"])])
            .await
            .expect_err("encode must fail");
        assert!(matches!(err, TranslationError::Decode(_)));
    }
}

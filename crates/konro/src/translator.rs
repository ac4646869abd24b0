//! # Translator
//!
//! A lightweight handle over a shared, read-only model. Copying a
//! [`Translator`] does not duplicate the model data: the copy shares the
//! model behind its reference-counted handle and builds its own encoder
//! and decoder state, so independent copies can execute in parallel.

use std::path::Path;
use std::sync::Arc;

use crate::batch::rebatch_with_options;
use crate::error::TranslationError;
use crate::model::{ComputeType, Decoder, Device, Encoder, ModelLoader, Seq2SeqModel};
use crate::options::TranslationOptions;
use crate::result::TranslationResult;
use crate::search::{decode_batch, SearchContext};

/// Holds everything required to translate with a loaded model.
///
/// The model is shared and immutable; the encoder and decoder are private
/// compute state rebuilt for every copy. A translator without a model
/// (after [`detach_model`](Translator::detach_model)) rejects every
/// translation call with [`TranslationError::NoModel`] until a model is
/// attached again.
pub struct Translator {
    model: Option<Arc<dyn Seq2SeqModel>>,
    device: Device,
    device_index: usize,
    compute_type: ComputeType,
    encoder: Option<Box<dyn Encoder>>,
    decoder: Option<Box<dyn Decoder>>,
}

impl Clone for Translator {
    /// Shares the model, rebuilds the private encoder/decoder state.
    fn clone(&self) -> Self {
        match &self.model {
            Some(model) => {
                let mut copy = Self::from_model(model.clone());
                copy.device = self.device;
                copy.device_index = self.device_index;
                copy.compute_type = self.compute_type;
                copy
            }
            None => Self {
                model: None,
                device: self.device,
                device_index: self.device_index,
                compute_type: self.compute_type,
                encoder: None,
                decoder: None,
            },
        }
    }
}

impl Translator {
    /// Loads a model through `loader` and binds it to the given device and
    /// compute precision.
    pub fn new<L: ModelLoader>(
        loader: &L,
        path: impl AsRef<Path>,
        device: Device,
        device_index: usize,
        compute_type: ComputeType,
    ) -> Result<Self, TranslationError> {
        let model = loader.load(path.as_ref(), device, device_index, compute_type)?;
        let mut translator = Self::from_model(model);
        translator.device = device;
        translator.device_index = device_index;
        translator.compute_type = compute_type;
        Ok(translator)
    }

    /// Wraps an already loaded model; device and precision are taken from
    /// the model handle.
    pub fn from_model(model: Arc<dyn Seq2SeqModel>) -> Self {
        Self {
            device: model.device(),
            device_index: model.device_index(),
            compute_type: model.compute_type(),
            encoder: Some(model.make_encoder()),
            decoder: Some(model.make_decoder()),
            model: Some(model),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn compute_type(&self) -> ComputeType {
        self.compute_type
    }

    /// Whether a model is currently attached.
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Replaces the model, rebuilding the private compute state.
    pub fn set_model(&mut self, model: Arc<dyn Seq2SeqModel>) {
        self.encoder = Some(model.make_encoder());
        self.decoder = Some(model.make_decoder());
        self.model = Some(model);
    }

    /// Loads and attaches a different model while keeping the same device
    /// and compute precision as before.
    pub fn set_model_from<L: ModelLoader>(
        &mut self,
        loader: &L,
        path: impl AsRef<Path>,
    ) -> Result<(), TranslationError> {
        let model = loader.load(
            path.as_ref(),
            self.device,
            self.device_index,
            self.compute_type,
        )?;
        self.set_model(model);
        Ok(())
    }

    /// Detaches the model. The translator becomes unusable until
    /// [`set_model`](Self::set_model) is called; the returned handle keeps
    /// the model alive for any other holder.
    pub fn detach_model(&mut self) -> Option<Arc<dyn Seq2SeqModel>> {
        self.encoder = None;
        self.decoder = None;
        self.model.take()
    }

    /// Translates a single example.
    pub async fn translate(
        &mut self,
        tokens: Vec<String>,
        options: TranslationOptions,
    ) -> Result<TranslationResult, TranslationError> {
        self.translate_with_prefix(tokens, Vec::new(), options)
            .await
    }

    /// Translates a single example with a target prefix.
    pub async fn translate_with_prefix(
        &mut self,
        tokens: Vec<String>,
        target_prefix: Vec<String>,
        options: TranslationOptions,
    ) -> Result<TranslationResult, TranslationError> {
        let mut options = options;
        // A batch of one needs no planning.
        options.rebatch_input = false;
        let prefix = if target_prefix.is_empty() {
            Vec::new()
        } else {
            vec![target_prefix]
        };
        let mut results = self
            .run_batch_translation(&[tokens], &prefix, options)
            .await?;
        debug_assert_eq!(results.len(), 1);
        results
            .pop()
            .ok_or_else(|| TranslationError::Decode("missing result for example".to_string()))
    }

    /// Translates a batch of examples, returning results in input order.
    pub async fn translate_batch(
        &mut self,
        tokens: Vec<Vec<String>>,
        options: TranslationOptions,
    ) -> Result<Vec<TranslationResult>, TranslationError> {
        self.run_batch_translation(&tokens, &[], options).await
    }

    /// Translates a batch of examples with one target prefix per example.
    pub async fn translate_batch_with_prefix(
        &mut self,
        tokens: Vec<Vec<String>>,
        target_prefix: Vec<Vec<String>>,
        options: TranslationOptions,
    ) -> Result<Vec<TranslationResult>, TranslationError> {
        if target_prefix.len() != tokens.len() {
            return Err(TranslationError::InvalidInput(format!(
                "expected one target prefix per example ({} prefixes for {} examples)",
                target_prefix.len(),
                tokens.len()
            )));
        }
        self.run_batch_translation(&tokens, &target_prefix, options)
            .await
    }

    /// Validates, plans, runs every sub-batch, and restores input order.
    pub(crate) async fn run_batch_translation(
        &mut self,
        source: &[Vec<String>],
        target_prefix: &[Vec<String>],
        mut options: TranslationOptions,
    ) -> Result<Vec<TranslationResult>, TranslationError> {
        options.validate()?;
        let model = self.model.as_ref().ok_or(TranslationError::NoModel)?;
        let encoder = self.encoder.as_mut().ok_or(TranslationError::NoModel)?;
        let decoder = self.decoder.as_mut().ok_or(TranslationError::NoModel)?;
        if source.is_empty() {
            return Ok(Vec::new());
        }

        let vmap = if options.use_vmap {
            model.vocabulary_map()
        } else {
            None
        };

        let batches = rebatch_with_options(source, target_prefix, &options);
        let mut results: Vec<Option<TranslationResult>> = vec![None; source.len()];
        for batch in &batches {
            log::trace!(
                "translating sub-batch of {} example(s) (beam_size {})",
                batch.len(),
                options.beam_size
            );
            let encoded = encoder.encode(&batch.source).await?;
            let context = SearchContext {
                encoded: &encoded,
                source: &batch.source,
                prefix: &batch.target,
                options: &options,
                eos: model.eos_token(),
                unk: model.unk_token(),
                allowed: vmap.as_ref().map(|map| map.allowed(&batch.source)),
            };
            let batch_results = decode_batch(decoder.as_mut(), &context).await?;
            for (slot, result) in batch_results.into_iter().enumerate() {
                results[batch.example_index[slot]] = Some(result);
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.ok_or_else(|| {
                    TranslationError::Decode(format!("planner produced no result for example {}", index))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchType;
    use crate::model::mock::{FixedVocabularyMap, MockLoader, MockModel};

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn greedy_options() -> TranslationOptions {
        TranslationOptions {
            beam_size: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_example_round_trip() {
        let mut translator = Translator::from_model(Arc::new(MockModel::new()));
        let result = translator
            .translate(tokens(&["a", "b", "c"]), greedy_options())
            .await
            .unwrap();
        assert_eq!(result.output(), tokens(&["c", "b", "a"]).as_slice());
    }

    #[tokio::test]
    async fn batch_results_keep_input_order_across_splits() {
        let mut translator = Translator::from_model(Arc::new(MockModel::new()));
        let inputs = vec![
            tokens(&["a", "b", "c"]),
            tokens(&["q", "r", "s", "t", "u", "v", "w"]),
            tokens(&["d", "e", "f"]),
            tokens(&["l", "m", "n", "o", "p"]),
        ];
        let options = TranslationOptions {
            beam_size: 1,
            max_batch_size: 2,
            batch_type: BatchType::Examples,
            ..Default::default()
        };
        let results = translator.translate_batch(inputs.clone(), options).await.unwrap();
        assert_eq!(results.len(), inputs.len());
        for (input, result) in inputs.iter().zip(&results) {
            assert_eq!(
                result.output(),
                MockModel::expected_translation(input).as_slice()
            );
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_results() {
        let mut translator = Translator::from_model(Arc::new(MockModel::new()));
        let results = translator
            .translate_batch(Vec::new(), greedy_options())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn invalid_options_fail_before_compute() {
        let mut translator = Translator::from_model(Arc::new(MockModel::failing()));
        let options = TranslationOptions {
            beam_size: 4,
            sampling_topk: 5,
            ..Default::default()
        };
        // The failing encoder would raise Decode; validation must win.
        let err = translator
            .translate_batch(vec![tokens(&["a"])], options)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn detached_translator_rejects_calls() {
        let model: Arc<dyn Seq2SeqModel> = Arc::new(MockModel::new());
        let mut translator = Translator::from_model(model.clone());
        let detached = translator.detach_model();
        assert!(detached.is_some());
        assert!(!translator.has_model());

        let err = translator
            .translate(tokens(&["a"]), greedy_options())
            .await
            .unwrap_err();
        assert_eq!(err, TranslationError::NoModel);

        translator.set_model(model);
        assert!(translator.has_model());
        assert!(translator
            .translate(tokens(&["a"]), greedy_options())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_model_but_translate_independently() {
        let model: Arc<dyn Seq2SeqModel> = Arc::new(MockModel::new());
        let mut first = Translator::from_model(model.clone());
        let mut second = first.clone();
        assert_eq!(Arc::strong_count(&model), 3);

        let a = first.translate(tokens(&["a", "b"]), greedy_options()).await.unwrap();
        let b = second.translate(tokens(&["a", "b"]), greedy_options()).await.unwrap();
        assert_eq!(a.output(), b.output());

        // Detaching one copy leaves the other fully usable.
        first.detach_model();
        assert!(second
            .translate(tokens(&["a", "b"]), greedy_options())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn loader_construction_keeps_device_selection() {
        let mut translator = Translator::new(
            &MockLoader,
            "models/base",
            Device::Cuda,
            1,
            ComputeType::Float16,
        )
        .unwrap();
        assert_eq!(translator.device(), Device::Cuda);
        assert_eq!(translator.device_index(), 1);
        assert_eq!(translator.compute_type(), ComputeType::Float16);

        // Swapping the model keeps the device and precision selection.
        translator.set_model_from(&MockLoader, "models/other").unwrap();
        assert_eq!(translator.device(), Device::Cuda);
        assert_eq!(translator.compute_type(), ComputeType::Float16);

        assert!(Translator::new(
            &MockLoader,
            "models/missing",
            Device::Cpu,
            0,
            ComputeType::Default,
        )
        .is_err());
    }

    #[tokio::test]
    async fn prefix_count_mismatch_is_rejected() {
        let mut translator = Translator::from_model(Arc::new(MockModel::new()));
        let err = translator
            .translate_batch_with_prefix(
                vec![tokens(&["a"]), tokens(&["b"])],
                vec![tokens(&["x"])],
                greedy_options(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn encoder_failure_propagates_as_decode_error() {
        let mut translator = Translator::from_model(Arc::new(MockModel::failing()));
        let err = translator
            .translate(tokens(&["a"]), greedy_options())
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Decode(_)));
    }

    #[tokio::test]
    async fn vocabulary_map_restricts_candidates() {
        let allowed: std::collections::HashSet<String> =
            ["c~1", "b", "a"].iter().map(|t| t.to_string()).collect();
        let model = MockModel {
            vmap: Some(Arc::new(FixedVocabularyMap { tokens: allowed })),
            ..MockModel::new()
        };
        let mut translator = Translator::from_model(Arc::new(model));
        let options = TranslationOptions {
            beam_size: 1,
            use_vmap: true,
            ..Default::default()
        };
        let result = translator
            .translate(tokens(&["a", "b", "c"]), options)
            .await
            .unwrap();
        // "c" is outside the map, so the next-ranked candidate wins.
        assert_eq!(result.output(), tokens(&["c~1", "b", "a"]).as_slice());
    }
}

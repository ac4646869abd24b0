//! # Translator Pool
//!
//! Lets many producers submit translation jobs concurrently against one
//! loaded model, without each producer owning a full compute context and
//! without blocking on the computation itself.
//!
//! The pool owns a fixed set of worker tasks. Each worker wraps its own
//! [`Translator`] copy; all copies share the same read-only model, so the
//! weights exist once regardless of the worker count. Submissions go
//! through [`TranslatorPool::post`], which enqueues the job and returns a
//! [`TranslationJob`] future; a worker picks the job up, runs it through
//! the regular batch translation path, and fulfills the future.
//!
//! Within one submission, result order matches input order. Across
//! submissions no ordering is guaranteed: the pool is a fan-out work
//! queue, not a sequencer.

mod job;
mod queue_item;
mod worker;

pub use job::TranslationJob;

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use crate::error::TranslationError;
use crate::model::Seq2SeqModel;
use crate::options::TranslationOptions;
use crate::translator::Translator;
use queue_item::QueueItem;
use worker::WorkerCrew;

/// A fixed-size pool of translators sharing one model.
///
/// Must be created within a tokio runtime; the workers are spawned on it.
/// Dropping the pool shuts the workers down gracefully; jobs already
/// picked up still complete, jobs left in the queue resolve to
/// [`TranslationError::PoolClosed`].
pub struct TranslatorPool {
    waiting: Arc<Mutex<Vec<QueueItem>>>,
    crew: WorkerCrew,
    default_options: TranslationOptions,
}

impl TranslatorPool {
    /// Creates a pool of `num_workers` translators over a shared model.
    ///
    /// The default options are validated here and used by [`post`](Self::post);
    /// per-call options go through [`post_with_options`](Self::post_with_options).
    pub fn new(
        num_workers: usize,
        model: Arc<dyn Seq2SeqModel>,
        default_options: TranslationOptions,
    ) -> Result<Self, TranslationError> {
        if num_workers == 0 {
            return Err(TranslationError::InvalidInput(
                "a translator pool needs at least one worker".to_string(),
            ));
        }
        let mut default_options = default_options;
        default_options.validate()?;

        let base = Translator::from_model(model);
        let mut translators = Vec::with_capacity(num_workers);
        for _ in 1..num_workers {
            translators.push(base.clone());
        }
        translators.push(base);

        let waiting = Arc::new(Mutex::new(Vec::new()));
        let crew = WorkerCrew::spawn(translators, waiting.clone());
        log::debug!("translator pool started with {} worker(s)", crew.num_workers());
        Ok(Self {
            waiting,
            crew,
            default_options,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.crew.num_workers()
    }

    /// Submits a batch of examples under the pool's default options.
    pub async fn post(
        &self,
        source: Vec<Vec<String>>,
    ) -> Result<TranslationJob, TranslationError> {
        self.post_with_options(source, self.default_options.clone())
            .await
    }

    /// Submits a batch of examples with per-call options.
    pub async fn post_with_options(
        &self,
        source: Vec<Vec<String>>,
        options: TranslationOptions,
    ) -> Result<TranslationJob, TranslationError> {
        self.post_with_prefix(source, Vec::new(), options).await
    }

    /// Submits a batch with one target prefix per example.
    ///
    /// Blocks only to enqueue; the returned job is fulfilled by whichever
    /// worker picks the submission up. Configuration problems surface
    /// here, before the job is queued.
    pub async fn post_with_prefix(
        &self,
        source: Vec<Vec<String>>,
        target_prefix: Vec<Vec<String>>,
        options: TranslationOptions,
    ) -> Result<TranslationJob, TranslationError> {
        if !self.crew.is_running() {
            return Err(TranslationError::PoolClosed);
        }
        if !target_prefix.is_empty() && target_prefix.len() != source.len() {
            return Err(TranslationError::InvalidInput(format!(
                "expected one target prefix per example ({} prefixes for {} examples)",
                target_prefix.len(),
                source.len()
            )));
        }
        let mut options = options;
        options.validate()?;

        let (sender, receiver) = oneshot::channel();
        let item = QueueItem::new(source, target_prefix, options, sender);
        let id = item.id();
        {
            let mut queue = self.waiting.lock().await;
            queue.push(item);
        }
        self.crew.notify();
        log::trace!("job {} queued", id);
        Ok(TranslationJob::new(id, receiver))
    }

    /// Stops accepting submissions and shuts the workers down.
    ///
    /// In-flight jobs complete; jobs still waiting in the queue are
    /// dropped here so their futures resolve to
    /// [`TranslationError::PoolClosed`] right away.
    pub async fn shutdown(&mut self) {
        self.crew.shutdown();
        self.waiting.lock().await.clear();
    }
}

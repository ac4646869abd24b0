//! # Konro
//!
//! A **con**current batched translation engine: the request-batching and
//! scheduling core of a sequence-to-sequence inference service.
//!
//! ## Overview
//!
//! Konro turns arbitrary collections of variable-length translation
//! requests into efficiently shaped execution batches, runs them through
//! a configurable decoding strategy (greedy or beam search, with optional
//! target prefixes and alternative hypotheses), and hands results back in
//! the caller's original order. Many callers can translate concurrently
//! against one loaded model without duplicating its weights.
//!
//! Key components:
//!
//! - [`TranslationOptions`] - validated decoding and batching configuration
//! - [`rebatch_input`] - the batch planner: length-sorted, budget-bounded
//!   batches plus the index to restore input order
//! - [`Translator`] - a copyable handle over a shared model; each copy
//!   owns its own encoder/decoder compute state
//! - [`TranslatorPool`] - a fixed set of workers fanning out submitted
//!   jobs and fulfilling one future per submission
//!
//! ## Architecture
//!
//! ### Model seams
//!
//! The tensor-level forward passes live behind the traits in [`model`]:
//! a [`model::Seq2SeqModel`] is a shared, read-only handle exposing
//! encoder/decoder factories, and the core drives those instances step by
//! step without interpreting their numerics. This keeps the batching and
//! concurrency logic independent of any particular compute backend.
//!
//! ### Sharing model weights
//!
//! A model handle is reference counted and immutable after load, so any
//! number of translators can read it without locks. Everything mutable
//! (encoder/decoder state) is private to one translator copy; cloning a
//! [`Translator`] shares the model and rebuilds that private state.
//!
//! ### Concurrent execution
//!
//! [`TranslatorPool`] spawns its workers on the ambient tokio runtime.
//! Submissions return a [`TranslationJob`] future immediately; plain
//! threads can instead block on [`TranslationJob::get`], optionally
//! releasing a host-level lock through the [`HostLock`] seam for the
//! duration of the wait.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use konro::{TranslationOptions, TranslatorPool};
//!
//! # async fn example(model: Arc<dyn konro::model::Seq2SeqModel>) {
//! let options = TranslationOptions {
//!     beam_size: 4,
//!     max_batch_size: 32,
//!     ..Default::default()
//! };
//! let pool = TranslatorPool::new(4, model, options).unwrap();
//!
//! let job = pool
//!     .post(vec![vec!["▁Hello".to_string(), "▁world".to_string()]])
//!     .await
//!     .unwrap();
//! let results = job.await.unwrap();
//! println!("{:?}", results[0].output());
//! # }
//! ```

mod batch;
mod error;
mod host;
mod options;
mod pool;
mod result;
mod search;
mod translator;

pub mod model;

pub use batch::{rebatch_input, Batch, BatchType};
pub use error::TranslationError;
pub use host::HostLock;
pub use options::TranslationOptions;
pub use pool::{TranslationJob, TranslatorPool};
pub use result::TranslationResult;
pub use translator::Translator;

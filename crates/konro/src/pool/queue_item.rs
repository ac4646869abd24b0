use tokio::sync::oneshot::Sender;
use uuid::Uuid;

use crate::error::TranslationError;
use crate::options::TranslationOptions;
use crate::result::TranslationResult;

/// One submitted translation job waiting for a worker.
///
/// Pairs the inputs of a `post` call with the one-shot channel its
/// results are delivered on. The id only exists for log correlation.
pub(crate) struct QueueItem {
    id: Uuid,
    source: Vec<Vec<String>>,
    target_prefix: Vec<Vec<String>>,
    options: TranslationOptions,
    sender: Sender<Result<Vec<TranslationResult>, TranslationError>>,
}

impl QueueItem {
    pub(crate) fn new(
        source: Vec<Vec<String>>,
        target_prefix: Vec<Vec<String>>,
        options: TranslationOptions,
        sender: Sender<Result<Vec<TranslationResult>, TranslationError>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target_prefix,
            options,
            sender,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Consumes the item into its payload and result channel.
    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        Uuid,
        Vec<Vec<String>>,
        Vec<Vec<String>>,
        TranslationOptions,
        Sender<Result<Vec<TranslationResult>, TranslationError>>,
    ) {
        (
            self.id,
            self.source,
            self.target_prefix,
            self.options,
            self.sender,
        )
    }
}

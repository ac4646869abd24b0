use thiserror::Error;

/// Errors produced by the translation engine.
///
/// Configuration and no-model errors are detected synchronously, before any
/// compute is attempted. Decode errors are propagated from the
/// encoder/decoder collaborators without interpretation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// The supplied [`TranslationOptions`](crate::TranslationOptions) failed validation.
    #[error("invalid translation options: {0}")]
    InvalidOptions(String),

    /// The input forms passed to a translation call are inconsistent.
    #[error("invalid translation input: {0}")]
    InvalidInput(String),

    /// A translation call was made on a translator with no attached model.
    #[error("no model is attached to this translator")]
    NoModel,

    /// The encoder or decoder collaborator reported a failure.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// The pool is shut down, or a worker went away before fulfilling a job.
    #[error("translator pool is closed")]
    PoolClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        let err = TranslationError::InvalidOptions("beam_size must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid translation options: beam_size must be at least 1"
        );
        assert_eq!(
            TranslationError::NoModel.to_string(),
            "no model is attached to this translator"
        );
        assert_eq!(
            TranslationError::PoolClosed.to_string(),
            "translator pool is closed"
        );
    }
}

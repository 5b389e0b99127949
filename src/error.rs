use crate::generator::GeneratorError;
use thiserror::Error;

/// What happens to a task after processing ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delete the message; no further attempts.
    Delete,
    /// Leave the message; the queue redelivers it after the visibility
    /// timeout.
    Redeliver,
}

/// Everything that can end a task attempt without a committed summary.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("bad message: {0}")]
    BadMessage(String),
    #[error("item {0} not found")]
    EntityNotFound(String),
    #[error(transparent)]
    GeneratorTransient(GeneratorError),
    #[error(transparent)]
    GeneratorFatal(GeneratorError),
    #[error("item {0} was updated concurrently")]
    ConcurrentUpdate(String),
    #[error("task received {0} times, giving up")]
    RetriesExhausted(u32),
    #[error(transparent)]
    Processing(#[from] anyhow::Error),
}

impl From<GeneratorError> for ProcessError {
    fn from(err: GeneratorError) -> Self {
        if err.is_retryable() {
            Self::GeneratorTransient(err)
        } else {
            Self::GeneratorFatal(err)
        }
    }
}

impl ProcessError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::BadMessage(_) => "bad-message",
            Self::EntityNotFound(_) => "not-found",
            Self::GeneratorTransient(_) | Self::GeneratorFatal(_) => "generator-error",
            Self::ConcurrentUpdate(_) => "concurrent-update",
            Self::RetriesExhausted(_) => "retries-exhausted",
            Self::Processing(_) => "processing-error",
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::BadMessage(_) | Self::EntityNotFound(_) | Self::RetriesExhausted(_) => {
                Disposition::Delete
            }
            // Auth failures stay queued until credentials are fixed.
            Self::GeneratorFatal(_)
            | Self::GeneratorTransient(_)
            | Self::ConcurrentUpdate(_)
            | Self::Processing(_) => Disposition::Redeliver,
        }
    }

    /// Failures an operator has to look at, as opposed to expected churn.
    pub fn is_alert_worthy(&self) -> bool {
        matches!(
            self,
            Self::GeneratorFatal(_) | Self::Processing(_) | Self::RetriesExhausted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classes_are_deleted() {
        assert_eq!(
            ProcessError::BadMessage("x".into()).disposition(),
            Disposition::Delete
        );
        assert_eq!(
            ProcessError::EntityNotFound("1".into()).disposition(),
            Disposition::Delete
        );
        assert_eq!(ProcessError::RetriesExhausted(6).disposition(), Disposition::Delete);
    }

    #[test]
    fn retryable_classes_are_redelivered() {
        let cases = [
            ProcessError::from(GeneratorError::RateLimited("429".into())),
            ProcessError::from(GeneratorError::PermissionDenied("401".into())),
            ProcessError::ConcurrentUpdate("1".into()),
            ProcessError::Processing(anyhow::anyhow!("dynamo down")),
        ];
        for err in cases {
            assert_eq!(err.disposition(), Disposition::Redeliver, "{err}");
        }
    }

    #[test]
    fn generator_errors_split_by_retryability() {
        assert!(matches!(
            ProcessError::from(GeneratorError::Transport("reset".into())),
            ProcessError::GeneratorTransient(_)
        ));
        let fatal = ProcessError::from(GeneratorError::PermissionDenied("403".into()));
        assert!(matches!(fatal, ProcessError::GeneratorFatal(_)));
        assert!(fatal.is_alert_worthy());
        assert_eq!(fatal.category(), "generator-error");
    }

    #[test]
    fn contention_is_not_alert_worthy() {
        let err = ProcessError::ConcurrentUpdate("1".into());
        assert!(!err.is_alert_worthy());
        assert_eq!(err.category(), "concurrent-update");
    }
}

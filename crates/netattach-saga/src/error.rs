use thiserror::Error;

/// Error returned by a step's forward operation.
///
/// `Stop` and `Continue` are reserved by the engine and carry control-flow
/// meaning; every domain failure travels as `Failed`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepError<E> {
    /// Stop the enclosing workflow normally. Nothing already done is
    /// compensated; the value propagates to the root unchanged.
    #[error("workflow stopped early")]
    Stop,

    /// Skip the current iteration of a repeated step. Outside a repeat this
    /// behaves like an ordinary failure.
    #[error("iteration skipped")]
    Continue,

    /// An ordinary failure that triggers compensation.
    #[error(transparent)]
    Failed(E),
}

impl<E> StepError<E> {
    /// Whether this is the reserved stop value.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    /// Whether this is the reserved continue value.
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// The domain error, if this is an ordinary failure.
    #[must_use]
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Stop | Self::Continue => None,
        }
    }

    /// Borrow the domain error, if this is an ordinary failure.
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Stop | Self::Continue => None,
        }
    }
}

impl<E> From<E> for StepError<E> {
    fn from(error: E) -> Self {
        Self::Failed(error)
    }
}

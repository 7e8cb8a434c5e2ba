use crate::context::StepContext;
use crate::error::StepError;

/// A unit of work with a matching compensation.
///
/// # Type Parameters
///
/// - `P`: Payload carried by the [`StepContext`], shared by every step of a workflow
/// - `E`: Domain error type for ordinary failures
///
/// A step whose `execute` fails is never compensated by the engine, so it
/// must clean up its own partial effects before returning the error.
pub trait Step<P, E>: Send {
    /// Human-readable name for logging and audit records.
    fn name(&self) -> &'static str;

    /// Run the forward operation.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Failed`] on an ordinary failure, or one of the
    /// reserved values [`StepError::Stop`] and [`StepError::Continue`].
    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<E>>;

    /// Undo the forward operation after a later step failed.
    ///
    /// Compensation is best-effort. Problems are logged by the step itself
    /// and never interrupt the unwind. It must tolerate state that is
    /// already gone.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    fn rollback(&mut self, ctx: &mut StepContext<P>) {
        let _ = ctx;
    }

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}

/// Boxed step as stored by the composite steps.
pub type BoxedStep<P, E> = Box<dyn Step<P, E>>;

/// A boolean gate evaluated against the context.
///
/// A predicate may have side effects that a later step relies on, such as
/// acquiring an exclusion token and parking it in the payload.
pub trait Predicate<P>: Send {
    fn ok(&mut self, ctx: &mut StepContext<P>) -> bool;
}

impl<P, F> Predicate<P> for F
where
    F: FnMut(&mut StepContext<P>) -> bool + Send,
{
    fn ok(&mut self, ctx: &mut StepContext<P>) -> bool {
        self(ctx)
    }
}

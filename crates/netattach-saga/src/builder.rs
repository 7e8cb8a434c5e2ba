use crate::context::StepContext;
use crate::error::StepError;
use crate::optional::Optional;
use crate::repeat::Repeat;
use crate::sequence::Sequence;
use crate::step::{BoxedStep, Predicate, Step};

/// Builder for composing a [`Sequence`] out of plain, conditional and
/// repeated steps.
///
/// ```
/// use netattach_saga::{Sequence, Step, StepContext, StepError};
///
/// struct Reserve;
///
/// impl Step<Vec<u16>, String> for Reserve {
///     fn name(&self) -> &'static str {
///         "reserve"
///     }
///
///     fn execute(&mut self, ctx: &mut StepContext<Vec<u16>>) -> Result<(), StepError<String>> {
///         let index = ctx.repeat_index();
///         ctx.payload_mut().push(100 + u16::try_from(index).unwrap_or(0));
///         Ok(())
///     }
/// }
///
/// let mut workflow: Sequence<Vec<u16>, String> = Sequence::builder("reserve_ids")
///     .step_fn("count", |ctx| {
///         ctx.set_repeat_count(2);
///         Ok(())
///     })
///     .repeat("per_id", || Reserve)
///     .build();
///
/// let mut ctx = StepContext::new(Vec::new());
/// assert!(workflow.run(&mut ctx).is_ok());
/// assert_eq!(ctx.payload(), &vec![100, 101]);
/// ```
pub struct SequenceBuilder<P, E> {
    name: &'static str,
    steps: Vec<BoxedStep<P, E>>,
}

impl<P: 'static, E: 'static> SequenceBuilder<P, E> {
    /// Create a new builder with no steps.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step.
    #[must_use]
    pub fn step<S>(mut self, step: S) -> Self
    where
        S: Step<P, E> + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a forward-only step built from a closure.
    #[must_use]
    pub fn step_fn<F>(self, name: &'static str, f: F) -> Self
    where
        F: FnMut(&mut StepContext<P>) -> Result<(), StepError<E>> + Send + 'static,
    {
        self.step(FnStep { name, f })
    }

    /// Append a step that only runs when `predicate` holds.
    #[must_use]
    pub fn optional<Q, S>(self, predicate: Q, step: S) -> Self
    where
        Q: Predicate<P> + 'static,
        S: Step<P, E> + 'static,
    {
        self.step(Optional::new(predicate, step))
    }

    /// Append a step repeated [`StepContext::repeat_count`] times.
    #[must_use]
    pub fn repeat<F, S>(self, name: &'static str, factory: F) -> Self
    where
        F: FnMut() -> S + Send + 'static,
        S: Step<P, E> + 'static,
    {
        self.step(Repeat::new(name, factory))
    }

    /// Build the sequence from the accumulated steps.
    #[must_use]
    pub fn build(self) -> Sequence<P, E> {
        Sequence::from_steps(self.name, self.steps)
    }
}

struct FnStep<F> {
    name: &'static str,
    f: F,
}

impl<P, E, F> Step<P, E> for FnStep<F>
where
    F: FnMut(&mut StepContext<P>) -> Result<(), StepError<E>> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<E>> {
        (self.f)(ctx)
    }
}

use tracing::{debug, warn};

use crate::audit::StepStatus;
use crate::builder::SequenceBuilder;
use crate::context::StepContext;
use crate::error::StepError;
use crate::step::{BoxedStep, Step};

/// Why forward execution did not run to the end.
pub(crate) enum Halt<E> {
    /// A step returned [`StepError::Stop`]. Nothing is compensated.
    Stop,
    /// The step at `index` failed with `error`.
    Failed { index: usize, error: StepError<E> },
}

/// Executes `steps` in order until one of them does not succeed.
pub(crate) fn run_forward<P, E>(
    steps: &mut [BoxedStep<P, E>],
    ctx: &mut StepContext<P>,
) -> Result<(), Halt<E>> {
    for (index, step) in steps.iter_mut().enumerate() {
        let name = step.name();
        let audit_index = ctx.audit_index();
        let slot = ctx.audit_mut().record_start(name, audit_index);

        match step.execute(ctx) {
            Ok(()) => {
                let description = step.compensation_description();
                ctx.audit_mut().record_success(slot, description);
            }
            Err(StepError::Stop) => {
                debug!(step = name, "step stopped the workflow");
                ctx.audit_mut().record_outcome(slot, StepStatus::Stopped);
                return Err(Halt::Stop);
            }
            Err(error) => {
                let status = if error.is_continue() {
                    StepStatus::Skipped
                } else {
                    StepStatus::Failed
                };
                ctx.audit_mut().record_outcome(slot, status);
                return Err(Halt::Failed { index, error });
            }
        }
    }
    Ok(())
}

/// Compensates the steps before `failed_index`, most recent first.
///
/// The failed step itself is never compensated.
pub(crate) fn run_backward<P, E>(
    steps: &mut [BoxedStep<P, E>],
    ctx: &mut StepContext<P>,
    failed_index: usize,
) {
    for step in steps[..failed_index].iter_mut().rev() {
        compensate(step, ctx);
    }
}

pub(crate) fn compensate<P, E>(step: &mut BoxedStep<P, E>, ctx: &mut StepContext<P>) {
    let name = step.name();
    debug!(
        step = name,
        compensation = %step.compensation_description(),
        "compensating step"
    );
    step.rollback(ctx);
    let audit_index = ctx.audit_index();
    ctx.audit_mut().record_compensated(name, audit_index);
}

/// How a root workflow finished without an ordinary failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every step ran.
    Completed,
    /// A step returned [`StepError::Stop`].
    Stopped,
    /// A step returned [`StepError::Continue`] outside a repeat; everything
    /// before it was compensated.
    Skipped,
}

/// An ordered list of steps executed as one unit.
///
/// If any step fails, previously completed steps are compensated in reverse
/// order (LIFO) and the original error is returned unchanged. A sequence is
/// itself a step, so sequences nest.
pub struct Sequence<P, E> {
    name: &'static str,
    steps: Vec<BoxedStep<P, E>>,
}

/// Sequence used as the entry point of a workflow.
pub type Transaction<P, E> = Sequence<P, E>;

/// Sequence nested inside another workflow.
pub type Procedure<P, E> = Sequence<P, E>;

impl<P: 'static, E: 'static> Sequence<P, E> {
    /// Start building a sequence.
    #[must_use]
    pub fn builder(name: &'static str) -> SequenceBuilder<P, E> {
        SequenceBuilder::new(name)
    }
}

impl<P, E> Sequence<P, E> {
    pub(crate) fn from_steps(name: &'static str, steps: Vec<BoxedStep<P, E>>) -> Self {
        Self { name, steps }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the sequence as the root of a workflow.
    ///
    /// The reserved values are folded into an [`Outcome`]; only ordinary
    /// failures surface as errors, after compensation has finished.
    ///
    /// # Errors
    ///
    /// Returns the domain error of the step that triggered the unwind.
    pub fn run(&mut self, ctx: &mut StepContext<P>) -> Result<Outcome, E>
    where
        P: 'static,
        E: 'static,
    {
        match self.execute(ctx) {
            Ok(()) => Ok(Outcome::Completed),
            Err(StepError::Stop) => Ok(Outcome::Stopped),
            Err(StepError::Continue) => Ok(Outcome::Skipped),
            Err(StepError::Failed(error)) => Err(error),
        }
    }
}

impl<P: 'static, E: 'static> Step<P, E> for Sequence<P, E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<E>> {
        match run_forward(&mut self.steps, ctx) {
            Ok(()) => Ok(()),
            Err(Halt::Stop) => Err(StepError::Stop),
            Err(Halt::Failed { index, error }) => {
                if index > 0 {
                    warn!(
                        sequence = self.name,
                        failed_step = self.steps[index].name(),
                        compensating = index,
                        "step failed, compensating completed steps"
                    );
                }
                run_backward(&mut self.steps, ctx, index);
                Err(error)
            }
        }
    }

    fn rollback(&mut self, ctx: &mut StepContext<P>) {
        let len = self.steps.len();
        run_backward(&mut self.steps, ctx, len);
    }

    fn compensation_description(&self) -> String {
        format!("undo {} step(s) of {}", self.steps.len(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    type Log = Vec<String>;

    struct Tracked {
        name: &'static str,
    }

    impl Step<Log, TestError> for Tracked {
        fn name(&self) -> &'static str {
            self.name
        }

        fn execute(&mut self, ctx: &mut StepContext<Log>) -> Result<(), StepError<TestError>> {
            ctx.payload_mut().push(format!("exec {}", self.name));
            Ok(())
        }

        fn rollback(&mut self, ctx: &mut StepContext<Log>) {
            ctx.payload_mut().push(format!("rollback {}", self.name));
        }
    }

    struct Failing;

    impl Step<Log, TestError> for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn execute(&mut self, _ctx: &mut StepContext<Log>) -> Result<(), StepError<TestError>> {
            Err(StepError::Failed(TestError("boom".to_string())))
        }
    }

    fn boxed(name: &'static str) -> BoxedStep<Log, TestError> {
        Box::new(Tracked { name })
    }

    #[test]
    fn run_forward_reports_failing_index() {
        let mut steps: Vec<BoxedStep<Log, TestError>> =
            vec![boxed("a"), boxed("b"), Box::new(Failing), boxed("c")];
        let mut ctx = StepContext::new(Log::new());

        let result = run_forward(&mut steps, &mut ctx);

        assert!(matches!(result, Err(Halt::Failed { index: 2, .. })));
        assert_eq!(*ctx.payload(), vec!["exec a", "exec b"]);
    }

    #[test]
    fn run_backward_with_zero_index_does_nothing() {
        let mut steps = vec![boxed("a"), boxed("b")];
        let mut ctx = StepContext::new(Log::new());

        run_backward(&mut steps, &mut ctx, 0);

        assert!(ctx.payload().is_empty());
    }

    #[test]
    fn run_backward_compensates_before_failed_index_in_reverse() {
        let mut steps = vec![boxed("a"), boxed("b"), boxed("c")];
        let mut ctx = StepContext::new(Log::new());

        run_backward(&mut steps, &mut ctx, 2);

        assert_eq!(*ctx.payload(), vec!["rollback b", "rollback a"]);
    }

    fn single<P: 'static, E: 'static>(step: impl Step<P, E> + 'static) -> Sequence<P, E> {
        Sequence::builder("single").step(step).build()
    }

    #[test]
    fn builder_works_for_generic_payloads() -> anyhow::Result<()> {
        let mut seq = single(Tracked { name: "a" });
        let mut ctx = StepContext::new(Log::new());

        assert_eq!(seq.len(), 1);
        assert_eq!(seq.run(&mut ctx)?, Outcome::Completed);
        assert_eq!(*ctx.payload(), vec!["exec a"]);
        Ok(())
    }

    #[test]
    fn sequence_rollback_compensates_every_child() {
        let mut seq: Sequence<Log, TestError> = Sequence::builder("all")
            .step(Tracked { name: "a" })
            .step(Tracked { name: "b" })
            .build();
        let mut ctx = StepContext::new(Log::new());

        seq.rollback(&mut ctx);

        assert_eq!(*ctx.payload(), vec!["rollback b", "rollback a"]);
    }

    #[test]
    fn run_maps_failure_to_domain_error() {
        let mut seq: Sequence<Log, TestError> = Sequence::builder("root")
            .step(Tracked { name: "a" })
            .step(Failing)
            .build();
        let mut ctx = StepContext::new(Log::new());

        let err = seq.run(&mut ctx).expect_err("should fail");

        assert_eq!(err, TestError("boom".to_string()));
        assert_eq!(*ctx.payload(), vec!["exec a", "rollback a"]);
    }
}

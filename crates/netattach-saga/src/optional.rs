use tracing::debug;

use crate::context::StepContext;
use crate::error::StepError;
use crate::step::{BoxedStep, Predicate, Step};

/// Runs a nested step only when its predicate holds.
///
/// The predicate is evaluated at execution time. Whether the nested step ran
/// is remembered so that a later rollback only compensates work that was
/// actually done.
pub struct Optional<P, E> {
    predicate: Box<dyn Predicate<P>>,
    step: BoxedStep<P, E>,
    ran: bool,
}

impl<P, E> Optional<P, E> {
    pub fn new<Q, S>(predicate: Q, step: S) -> Self
    where
        Q: Predicate<P> + 'static,
        S: Step<P, E> + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            step: Box::new(step),
            ran: false,
        }
    }

    /// Whether the nested step ran during the last execution.
    #[must_use]
    pub fn ran(&self) -> bool {
        self.ran
    }
}

impl<P, E> Step<P, E> for Optional<P, E> {
    fn name(&self) -> &'static str {
        self.step.name()
    }

    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<E>> {
        self.ran = false;
        if !self.predicate.ok(ctx) {
            debug!(step = self.step.name(), "predicate false, bypassing step");
            let audit_index = ctx.audit_index();
            ctx.audit_mut()
                .record_bypassed(self.step.name(), audit_index);
            return Ok(());
        }
        self.step.execute(ctx)?;
        self.ran = true;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<P>) {
        if self.ran {
            self.step.rollback(ctx);
            self.ran = false;
        }
    }

    fn compensation_description(&self) -> String {
        self.step.compensation_description()
    }
}

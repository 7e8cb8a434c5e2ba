use tracing::{debug, warn};

use crate::audit::StepStatus;
use crate::context::StepContext;
use crate::error::StepError;
use crate::sequence::compensate;
use crate::step::{BoxedStep, Step};

type Factory<P, E> = Box<dyn FnMut() -> BoxedStep<P, E> + Send>;

/// Expands into one freshly built step per iteration.
///
/// The iteration count is read from [`StepContext::repeat_count`] when the
/// repeat starts executing, so an earlier step decides it at runtime. Each
/// iteration gets its own instance from the factory and can be compensated
/// on its own. An iteration that returns [`StepError::Continue`] is skipped
/// and leaves nothing to compensate.
pub struct Repeat<P, E> {
    name: &'static str,
    factory: Factory<P, E>,
    slots: Vec<Option<BoxedStep<P, E>>>,
}

impl<P: 'static, E: 'static> Repeat<P, E> {
    pub fn new<F, S>(name: &'static str, mut factory: F) -> Self
    where
        F: FnMut() -> S + Send + 'static,
        S: Step<P, E> + 'static,
    {
        Self {
            name,
            factory: Box::new(move || Box::new(factory()) as BoxedStep<P, E>),
            slots: Vec::new(),
        }
    }
}

impl<P, E> Repeat<P, E> {
    /// Number of iterations whose effects are currently committed.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn compensate_slots(&mut self, ctx: &mut StepContext<P>, end: usize) {
        for (index, slot) in self.slots[..end].iter_mut().enumerate().rev() {
            if let Some(step) = slot.as_mut() {
                ctx.set_repeat_index(index);
                compensate(step, ctx);
            }
            *slot = None;
        }
    }
}

impl<P, E> Step<P, E> for Repeat<P, E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<E>> {
        let count = ctx.repeat_count();
        self.slots = std::iter::repeat_with(|| None).take(count).collect();
        debug!(repeat = self.name, count, "starting repeated step");

        let saved = ctx.enter_repeat();
        for index in 0..count {
            ctx.set_repeat_index(index);
            let mut step = (self.factory)();
            let slot = ctx.audit_mut().record_start(step.name(), Some(index));

            match step.execute(ctx) {
                Ok(()) => {
                    let description = step.compensation_description();
                    ctx.audit_mut().record_success(slot, description);
                    self.slots[index] = Some(step);
                }
                Err(StepError::Continue) => {
                    debug!(repeat = self.name, index, "iteration skipped");
                    ctx.audit_mut().record_outcome(slot, StepStatus::Skipped);
                }
                Err(error) => {
                    let status = if error.is_stop() {
                        StepStatus::Stopped
                    } else {
                        StepStatus::Failed
                    };
                    ctx.audit_mut().record_outcome(slot, status);
                    if index > 0 {
                        warn!(
                            repeat = self.name,
                            failed_iteration = index,
                            "iteration failed, compensating earlier iterations"
                        );
                        self.compensate_slots(ctx, index);
                    }
                    ctx.leave_repeat(saved);
                    return Err(error);
                }
            }
        }
        ctx.leave_repeat(saved);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<P>) {
        let saved = ctx.enter_repeat();
        let len = self.slots.len();
        self.compensate_slots(ctx, len);
        ctx.leave_repeat(saved);
    }

    fn compensation_description(&self) -> String {
        format!("undo iterations of {}", self.name)
    }
}

use crate::audit::AuditLog;

/// Request-scoped state threaded through every step of one workflow run.
///
/// The engine never looks inside the payload. It only maintains the repeat
/// index while a [`Repeat`](crate::Repeat) is running and the audit log.
#[derive(Debug)]
pub struct StepContext<P> {
    payload: P,
    repeat_index: usize,
    repeat_count: usize,
    in_repeat: bool,
    audit: AuditLog,
}

impl<P> StepContext<P> {
    #[must_use]
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            repeat_index: 0,
            repeat_count: 0,
            in_repeat: false,
            audit: AuditLog::new(),
        }
    }

    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Iteration currently being executed or compensated.
    ///
    /// Only meaningful inside a repeated step.
    #[must_use]
    pub fn repeat_index(&self) -> usize {
        self.repeat_index
    }

    /// Number of iterations the next repeated step will run.
    #[must_use]
    pub fn repeat_count(&self) -> usize {
        self.repeat_count
    }

    pub fn set_repeat_count(&mut self, count: usize) {
        self.repeat_count = count;
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn audit_mut(&mut self) -> &mut AuditLog {
        &mut self.audit
    }

    /// Repeat index to attach to audit records, if inside a repeat.
    pub(crate) fn audit_index(&self) -> Option<usize> {
        self.in_repeat.then_some(self.repeat_index)
    }

    /// Enters a repeat scope, returning the previous scope for [`Self::leave_repeat`].
    pub(crate) fn enter_repeat(&mut self) -> (usize, bool) {
        let saved = (self.repeat_index, self.in_repeat);
        self.in_repeat = true;
        saved
    }

    pub(crate) fn set_repeat_index(&mut self, index: usize) {
        self.repeat_index = index;
    }

    pub(crate) fn leave_repeat(&mut self, saved: (usize, bool)) {
        (self.repeat_index, self.in_repeat) = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_starts_outside_repeat() {
        let ctx = StepContext::new(vec![1, 2, 3]);

        assert_eq!(ctx.repeat_index(), 0);
        assert_eq!(ctx.repeat_count(), 0);
        assert_eq!(ctx.audit_index(), None);
        assert_eq!(ctx.payload().len(), 3);
    }

    #[test]
    fn payload_is_mutable_and_recoverable() {
        let mut ctx = StepContext::new(String::from("veth"));
        ctx.payload_mut().push_str("0");

        assert_eq!(ctx.into_payload(), "veth0");
    }

    #[test]
    fn repeat_scope_is_restored_on_leave() {
        let mut ctx = StepContext::new(());
        let outer = ctx.enter_repeat();
        ctx.set_repeat_index(2);

        let inner = ctx.enter_repeat();
        ctx.set_repeat_index(5);
        assert_eq!(ctx.audit_index(), Some(5));
        ctx.leave_repeat(inner);

        assert_eq!(ctx.repeat_index(), 2);
        ctx.leave_repeat(outer);
        assert_eq!(ctx.audit_index(), None);
    }
}

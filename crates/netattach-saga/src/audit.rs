use std::time::Instant;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Forward operation is running or finished successfully.
    Executed,
    /// Forward operation failed.
    Failed,
    /// Forward operation asked the workflow to stop.
    Stopped,
    /// Repeat iteration was skipped; nothing to compensate.
    Skipped,
    /// Optional step whose predicate was false.
    Bypassed,
    /// Step was compensated.
    Compensated,
}

/// Record of a step's execution.
#[derive(Debug)]
pub struct StepRecord {
    /// Name of the step.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Repeat iteration the step ran for, if it ran inside a repeat.
    pub repeat_index: Option<usize>,
    /// When the step started executing.
    pub started_at: Instant,
    /// When the step completed (execution or compensation).
    pub completed_at: Option<Instant>,
    /// Description of compensation, once the step succeeded.
    pub compensation_description: Option<String>,
}

/// Audit log tracking every step touched by one workflow invocation.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Vec<StepRecord>,
}

impl AuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&mut self, name: &str, repeat_index: Option<usize>) -> usize {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Executed,
            repeat_index,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
        });
        self.records.len() - 1
    }

    /// Completes a started record. Records already marked bypassed keep
    /// their status.
    pub(crate) fn record_success(&mut self, slot: usize, compensation_description: String) {
        if let Some(record) = self.records.get_mut(slot) {
            if record.status == StepStatus::Executed {
                record.completed_at = Some(Instant::now());
                record.compensation_description = Some(compensation_description);
            }
        }
    }

    pub(crate) fn record_outcome(&mut self, slot: usize, status: StepStatus) {
        if let Some(record) = self.records.get_mut(slot) {
            record.status = status;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Marks the in-flight record with this name and iteration as bypassed.
    pub(crate) fn record_bypassed(&mut self, name: &str, repeat_index: Option<usize>) {
        let found = self.records.iter_mut().rev().find(|record| {
            record.name == name
                && record.repeat_index == repeat_index
                && record.completed_at.is_none()
        });
        if let Some(record) = found {
            record.status = StepStatus::Bypassed;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Marks the most recent successful record with this name and iteration
    /// as compensated.
    pub(crate) fn record_compensated(&mut self, name: &str, repeat_index: Option<usize>) {
        let found = self.records.iter_mut().rev().find(|record| {
            record.name == name
                && record.repeat_index == repeat_index
                && record.status == StepStatus::Executed
        });
        if let Some(record) = found {
            record.status = StepStatus::Compensated;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Records with the given status, in execution order.
    pub fn with_status(&self, status: StepStatus) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }

    /// Get a summary of the workflow execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Stopped => "■",
                StepStatus::Skipped => "»",
                StepStatus::Bypassed => "-",
                StepStatus::Compensated => "↩",
            };
            match record.repeat_index {
                Some(index) => lines.push(format!("{status} {}[{index}]", record.name)),
                None => lines.push(format!("{status} {}", record.name)),
            }
        }
        lines.join("\n")
    }
}

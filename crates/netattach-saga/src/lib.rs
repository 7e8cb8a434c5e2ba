//! Compensating workflow engine.
//!
//! Workflows are built from [`Step`]s composed into [`Sequence`]s, with
//! [`Optional`] steps gated by a [`Predicate`] and [`Repeat`] steps that
//! expand into a runtime-determined number of iterations. When a step fails,
//! every step that already succeeded is compensated in reverse order before
//! the original error is returned.

mod audit;
mod builder;
mod context;
mod error;
mod optional;
mod repeat;
mod sequence;
mod step;

pub use audit::{AuditLog, StepRecord, StepStatus};
pub use builder::SequenceBuilder;
pub use context::StepContext;
pub use error::StepError;
pub use optional::Optional;
pub use repeat::Repeat;
pub use sequence::{Outcome, Procedure, Sequence, Transaction};
pub use step::{BoxedStep, Predicate, Step};

//! Preview: what each row would change on the calendar.

mod engine;
mod proposal;
mod status;

pub use engine::{index_by_identity, reconcile};
pub use proposal::{DiffField, FieldDiff, FieldValue, MatchedEvent, Payload, Schedule, SyncProposal};
pub use status::SyncStatus;

pub mod ledger;
pub mod off_schedule;
pub mod service;
pub mod split;
pub mod store;

pub use crate::ledger::CompletionWrite;
pub use crate::off_schedule::OffScheduleResult;
pub use crate::service::{ToggleResult, TrackerService, TrackerServiceBuilder};
pub use crate::split::{SeriesSplit, SplitScope};
pub use crate::store::MemoryStore;

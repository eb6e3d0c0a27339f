pub mod completion;
pub mod dates;
pub mod errors;
pub mod projector;
pub mod recurrence;
pub mod task;

pub use crate::completion::{CompletionRecord, Outcome};
pub use crate::dates::{CanonicalDate, Clock, FixedClock, SystemClock};
pub use crate::errors::{EngineError, EngineResult};
pub use crate::projector::project_range;
pub use crate::recurrence::{occurs_on, MonthlyAnchor, Pattern, Recurrence};
pub use crate::task::{CompletionStyle, Task, TaskChanges, TaskStatus};

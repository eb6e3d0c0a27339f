//! The occurrence projector: answers "what occurs on each day of this range,
//! and in what state" by reconciling the recurrence pattern, the completion
//! ledger, and off-schedule instances. Several fields can claim the same
//! date, so each (task, date) pair is decided by exactly one rule, checked
//! in a fixed precedence order.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use crate::completion::CompletionRecord;
use crate::dates::CanonicalDate;
use crate::recurrence::occurs_on;
use crate::task::{Task, TaskStatus};

/// Ledger lookups the projector needs, pre-indexed so the per-day loop stays
/// cheap over month-sized ranges.
struct LedgerIndex {
    pairs: HashSet<(Uuid, CanonicalDate)>,
    dates_by_task: HashMap<Uuid, Vec<CanonicalDate>>,
}

impl LedgerIndex {
    fn build(completions: &[CompletionRecord]) -> Self {
        let mut pairs = HashSet::with_capacity(completions.len());
        let mut dates_by_task: HashMap<Uuid, Vec<CanonicalDate>> = HashMap::new();
        for record in completions {
            pairs.insert((record.task_id, record.date));
            dates_by_task.entry(record.task_id).or_default().push(record.date);
        }
        Self { pairs, dates_by_task }
    }

    fn has(&self, task_id: Uuid, date: CanonicalDate) -> bool {
        self.pairs.contains(&(task_id, date))
    }

    fn any_other_date(&self, task_id: Uuid, own: CanonicalDate) -> bool {
        self.dates_by_task
            .get(&task_id)
            .map_or(false, |dates| dates.iter().any(|date| *date != own))
    }
}

/// Projects `tasks` over the inclusive `[start, end]` range. Every day in
/// the range is present in the result so calendar views can render empty
/// days without a second pass.
pub fn project_range(
    tasks: &[Task],
    completions: &[CompletionRecord],
    start: CanonicalDate,
    end: CanonicalDate,
) -> BTreeMap<CanonicalDate, Vec<Task>> {
    let ledger = LedgerIndex::build(completions);
    let mut projection = BTreeMap::new();
    for day in start.iter_through(end) {
        let occupants: Vec<Task> = tasks
            .iter()
            .filter(|task| includes_on(task, day, &ledger))
            .cloned()
            .collect();
        projection.insert(day, occupants);
    }
    projection
}

/// One authoritative rule per (task, date); the first applicable rule both
/// decides and terminates, so a task can never appear twice or fall through
/// to a contradictory rule.
fn includes_on(task: &Task, date: CanonicalDate, ledger: &LedgerIndex) -> bool {
    // Floating: an undated non-recurring item in progress follows the user
    // to every day until resolved. Undated items in any other status stay
    // in the backlog and never render on a date.
    if task.is_undated() {
        return task.status == TaskStatus::InProgress;
    }

    // Off-schedule instances live on their own date alone, and only once a
    // completion backs them; an instance with no completion is an orphan
    // and must not render.
    if task.is_off_schedule {
        return task.scheduled_date() == Some(date) && ledger.has(task.id, date);
    }

    // One-time dated task: its date is authoritative until a completion
    // lands elsewhere (the task was done on a different day) or the task is
    // complete, after which only the days completions actually live on show
    // it.
    if let Some(own_date) = task.scheduled_date() {
        let displaced = task.status == TaskStatus::Complete
            || ledger.any_other_date(task.id, own_date);
        if displaced {
            return ledger.has(task.id, date);
        }
        return task
            .recurrence
            .as_ref()
            .map_or(false, |rec| occurs_on(rec, date));
    }

    let Some(rec) = task.recurrence.as_ref() else {
        return false;
    };

    // A user-added date outside the pattern renders only when fulfilled by
    // a real completion; unfulfilled additional dates stay invisible.
    if rec.additional_dates.contains(&date.date_string()) {
        return ledger.has(task.id, date);
    }

    occurs_on(rec, date)
}

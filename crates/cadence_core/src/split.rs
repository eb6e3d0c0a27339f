//! The series split engine: turns an edit to a recurring task into either a
//! single-date exception plus a derived one-time task, or a termination of
//! the old series plus a successor series starting at the edit date. History
//! before the edit date is never rewritten.

use uuid::Uuid;

use cadence_domain::{
    occurs_on, CanonicalDate, EngineError, EngineResult, Recurrence, Task, TaskChanges,
};

use crate::store::StoreState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitScope {
    ThisOnly,
    ThisAndFuture,
}

/// The planned pair of writes: the patched original and the task to insert.
/// Both must land in the same transaction; applying only one side would
/// silently resurrect or duplicate the occurrence.
#[derive(Debug, Clone)]
pub struct SeriesSplit {
    pub original: Task,
    pub derived: Task,
}

/// Whether this edit needs a "just this occurrence / this and future" prompt.
/// Only scheduling fields (date, time, pattern shape) qualify; title, color
/// and tags apply uniformly and never interrupt the user.
pub fn requires_scope_decision(original: &Task, changes: &TaskChanges) -> bool {
    if !original.is_recurring() {
        return false;
    }
    let time_changed = changes
        .time
        .map_or(false, |time| original.time != Some(time));
    let schedule_changed = changes.recurrence.as_ref().map_or(false, |proposed| {
        original.recurrence.as_ref().map_or(true, |current| {
            current.pattern != proposed.pattern || current.start_date != proposed.start_date
        })
    });
    time_changed || schedule_changed
}

/// Plans "change just this occurrence": the edit date becomes an exception
/// on the original series, and a one-time task carries the changed fields on
/// that date, with lineage back to the series.
pub fn plan_this_occurrence_only(
    original: &Task,
    changes: &TaskChanges,
    edit_date: CanonicalDate,
) -> EngineResult<SeriesSplit> {
    let mut patched = original.clone();
    let Some(recurrence) = patched.recurrence.as_mut() else {
        return Err(not_a_series(original.id));
    };
    if recurrence.is_one_time() {
        return Err(not_a_series(original.id));
    }
    recurrence.suppress_on(edit_date);

    let mut derived = derive_from(original, changes);
    derived.recurrence = Some(
        changes
            .recurrence
            .clone()
            .unwrap_or_else(|| Recurrence::once_on(edit_date)),
    );
    Ok(SeriesSplit {
        original: patched,
        derived,
    })
}

/// Plans "change this and all future occurrences": the old series ends the
/// day before the edit date, and a successor series seeded from the changes
/// (falling back to the original per field) starts on it. The day-before
/// boundary uses real calendar arithmetic, so no date can match both series
/// for any pattern kind.
pub fn plan_this_and_future(
    original: &Task,
    changes: &TaskChanges,
    edit_date: CanonicalDate,
) -> EngineResult<SeriesSplit> {
    let Some(base) = original.recurrence.clone() else {
        return Err(not_a_series(original.id));
    };
    if base.is_one_time() {
        return Err(not_a_series(original.id));
    }

    let mut patched = original.clone();
    if let Some(recurrence) = patched.recurrence.as_mut() {
        recurrence.end_date = Some(edit_date.pred());
    }

    let mut successor_rec = changes.recurrence.clone().unwrap_or_else(|| base.clone());
    successor_rec.start_date = Some(edit_date);
    if successor_rec.end_date.is_none() {
        successor_rec.end_date = base.end_date;
    }

    let mut derived = derive_from(original, changes);
    derived.recurrence = Some(successor_rec);
    Ok(SeriesSplit {
        original: patched,
        derived,
    })
}

/// Applies the planned pair atomically; the caller wraps this in one store
/// transaction. Returns the inserted derived task.
pub fn apply(state: &mut StoreState, split: SeriesSplit) -> EngineResult<Task> {
    let derived = split.derived.clone();
    state.update_task(split.original)?;
    state.insert_task(split.derived)?;
    tracing::debug!(derived_id = %derived.id, source_id = ?derived.source_task_id, "applied series split");
    Ok(derived)
}

/// Debug-time check of the non-overlap guarantee; cheap enough to assert in
/// tests across pattern kinds.
pub fn series_overlap(old: &Recurrence, new: &Recurrence, probe_days: u32) -> Option<CanonicalDate> {
    let Some(mut day) = old.start_date.or(new.start_date) else {
        return None;
    };
    for _ in 0..probe_days {
        if occurs_on(old, day) && occurs_on(new, day) {
            return Some(day);
        }
        day = day.succ();
    }
    None
}

fn derive_from(original: &Task, changes: &TaskChanges) -> Task {
    let mut derived = Task::new(original.user_id, original.title.clone());
    derived.section_id = original.section_id;
    derived.time = original.time;
    derived.duration_minutes = original.duration_minutes;
    derived.color = original.color.clone();
    derived.tags = original.tags.clone();
    derived.completion_style = original.completion_style;
    derived.is_rollover = original.is_rollover;
    derived.parent_id = original.parent_id;
    derived.status = original.status;
    derived.source_task_id = Some(original.id);
    changes.apply_cosmetic(&mut derived);
    if let Some(time) = changes.time {
        derived.time = Some(time);
    }
    derived
}

fn not_a_series(id: Uuid) -> EngineError {
    EngineError::Validation(format!("task {id} is not recurring; nothing to split"))
}

//! Off-schedule instances: a standalone one-time task recording an
//! occurrence the declared pattern didn't predict, without touching the
//! recurring task's definition. The completion is written to both the source
//! and the instance so the occurrence groups under the source's history and
//! still renders as its own card in date-indexed views.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_domain::{
    CanonicalDate, EngineError, EngineResult, Outcome, Recurrence, Task, TaskStatus,
};

use crate::store::StoreState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OffScheduleResult {
    /// The (source, date) pair was cleared; both deletions are attempted
    /// regardless of whether either target existed.
    Cleared {
        instance_removed: bool,
        completion_removed: bool,
    },
    /// An occurrence was logged; `instance` is the (created or reused)
    /// off-schedule task.
    Logged { instance: Task },
}

/// Logs or clears an off-schedule occurrence for (source, date). Runs inside
/// one store transaction so the dual completion write cannot half-apply.
pub fn set_off_schedule(
    state: &mut StoreState,
    user_id: Uuid,
    source_task_id: Uuid,
    date: CanonicalDate,
    outcome: Option<Outcome>,
    note: Option<String>,
) -> EngineResult<OffScheduleResult> {
    let source = state.task_owned(source_task_id, user_id)?.clone();
    if !source.is_recurring() {
        return Err(EngineError::Validation(format!(
            "task {source_task_id} is not recurring; off-schedule instances derive from a series"
        )));
    }

    let existing = state
        .off_schedule_instance(source_task_id, date)
        .map(|task| task.id);

    let Some(outcome) = outcome else {
        // Clearing: idempotent on both sides.
        let completion_removed = state.remove_completion(source_task_id, date);
        let instance_removed = match existing {
            Some(instance_id) => {
                state.remove_task_cascade(instance_id)?;
                true
            }
            None => false,
        };
        tracing::debug!(%source_task_id, %date, instance_removed, "cleared off-schedule occurrence");
        return Ok(OffScheduleResult::Cleared {
            instance_removed,
            completion_removed,
        });
    };

    let instance_id = match existing {
        Some(id) => id,
        None => {
            let instance = derive_instance(&source, date);
            let id = instance.id;
            state.insert_task(instance)?;
            id
        }
    };

    // Dual write, same date: once on the source, once on the instance.
    state.upsert_completion(source_task_id, user_id, date, Some(outcome), note.clone())?;
    state.upsert_completion(instance_id, user_id, date, Some(outcome), note)?;

    let instance = state
        .task(instance_id)
        .cloned()
        .ok_or_else(|| EngineError::Transaction("off-schedule instance vanished mid-write".into()))?;
    tracing::debug!(%source_task_id, %date, instance_id = %instance.id, "logged off-schedule occurrence");
    Ok(OffScheduleResult::Logged { instance })
}

/// Clones the render-relevant fields of the source onto a one-time task
/// anchored at `date`, tagged with lineage.
fn derive_instance(source: &Task, date: CanonicalDate) -> Task {
    let mut instance = Task::new(source.user_id, source.title.clone());
    instance.section_id = source.section_id;
    instance.time = source.time;
    instance.duration_minutes = source.duration_minutes;
    instance.color = source.color.clone();
    instance.tags = source.tags.clone();
    instance.completion_style = source.completion_style;
    instance.is_rollover = source.is_rollover;
    instance.recurrence = Some(Recurrence::once_on(date));
    instance.source_task_id = Some(source.id);
    instance.is_off_schedule = true;
    instance.status = TaskStatus::Todo;
    instance
}

//! The completion ledger: create/update/delete completion records, batch
//! variants for parent-with-subtasks toggles, and the pure read side every
//! view keys by canonical date. Reads never evaluate recurrence; that is the
//! evaluator's job.

use uuid::Uuid;

use cadence_domain::{CanonicalDate, CompletionRecord, EngineError, EngineResult, Outcome};

use crate::store::StoreState;

/// One pending ledger write, the unit batch operations are built from.
#[derive(Debug, Clone)]
pub struct CompletionWrite {
    pub task_id: Uuid,
    pub date: CanonicalDate,
    pub outcome: Option<Outcome>,
    pub note: Option<String>,
}

impl CompletionWrite {
    pub fn completed(task_id: Uuid, date: CanonicalDate) -> Self {
        Self {
            task_id,
            date,
            outcome: Some(Outcome::Completed),
            note: None,
        }
    }
}

/// Upserts one completion. The referenced task must exist and belong to the
/// acting user.
pub fn create_completion(
    state: &mut StoreState,
    user_id: Uuid,
    write: &CompletionWrite,
) -> EngineResult<CompletionRecord> {
    state.task_owned(write.task_id, user_id)?;
    state.upsert_completion(
        write.task_id,
        user_id,
        write.date,
        write.outcome,
        write.note.clone(),
    )
}

pub fn update_completion(
    state: &mut StoreState,
    user_id: Uuid,
    row_id: Uuid,
    outcome: Option<Outcome>,
    note: Option<String>,
) -> EngineResult<CompletionRecord> {
    let owned = state
        .completions_for_user(user_id)
        .iter()
        .any(|record| record.id == row_id);
    if !owned {
        return Err(EngineError::NotFound(format!("completion {row_id}")));
    }
    state.update_completion_fields(row_id, outcome, note)
}

/// Removes the completion for (task, date). Returns whether a row existed;
/// clearing an absent row is not an error.
pub fn delete_completion(
    state: &mut StoreState,
    user_id: Uuid,
    task_id: Uuid,
    date: CanonicalDate,
) -> EngineResult<bool> {
    state.task_owned(task_id, user_id)?;
    Ok(state.remove_completion(task_id, date))
}

/// Applies every write or none: the caller runs this inside one store
/// transaction, so the first failure rolls the whole batch back.
pub fn batch_create(
    state: &mut StoreState,
    user_id: Uuid,
    writes: &[CompletionWrite],
) -> EngineResult<Vec<CompletionRecord>> {
    let mut created = Vec::with_capacity(writes.len());
    for write in writes {
        created.push(create_completion(state, user_id, write)?);
    }
    Ok(created)
}

pub fn batch_delete(
    state: &mut StoreState,
    user_id: Uuid,
    pairs: &[(Uuid, CanonicalDate)],
) -> EngineResult<usize> {
    let mut removed = 0;
    for (task_id, date) in pairs {
        if delete_completion(state, user_id, *task_id, *date)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Pure ledger lookup; a legacy row without an outcome counts as completed.
pub fn is_completed_on_date(state: &StoreState, task_id: Uuid, date: CanonicalDate) -> bool {
    state
        .completion_on(task_id, date)
        .map_or(false, CompletionRecord::counts_as_completed)
}

/// The stored outcome for (task, date); `None` both for a missing row and
/// for a legacy row that predates outcome tracking.
pub fn outcome_on_date(state: &StoreState, task_id: Uuid, date: CanonicalDate) -> Option<Outcome> {
    state.completion_on(task_id, date).and_then(|record| record.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use cadence_domain::Task;

    fn day(s: &str) -> CanonicalDate {
        CanonicalDate::parse(s).expect("valid date")
    }

    fn seeded_store() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let task = Task::new(user, "seeded");
        let task_id = task.id;
        store.transaction(|state| state.insert_task(task)).unwrap();
        (store, user, task_id)
    }

    #[test]
    fn write_then_read_round_trips_and_delete_clears() {
        let (store, user, task_id) = seeded_store();
        let date = day("2024-02-10");

        store
            .transaction(|state| {
                create_completion(
                    state,
                    user,
                    &CompletionWrite {
                        task_id,
                        date,
                        outcome: Some(Outcome::Completed),
                        note: Some("done".into()),
                    },
                )
            })
            .unwrap();
        store.read(|state| {
            assert!(is_completed_on_date(state, task_id, date));
            assert_eq!(outcome_on_date(state, task_id, date), Some(Outcome::Completed));
        });

        store
            .transaction(|state| delete_completion(state, user, task_id, date))
            .unwrap();
        store.read(|state| {
            assert!(!is_completed_on_date(state, task_id, date));
            assert_eq!(outcome_on_date(state, task_id, date), None);
        });
    }

    #[test]
    fn completion_for_unknown_task_is_not_found() {
        let (store, user, _) = seeded_store();
        let err = store
            .transaction(|state| {
                create_completion(
                    state,
                    user,
                    &CompletionWrite::completed(Uuid::new_v4(), day("2024-02-10")),
                )
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn batch_create_is_all_or_nothing() {
        let (store, user, task_id) = seeded_store();
        let date = day("2024-02-10");
        let writes = vec![
            CompletionWrite::completed(task_id, date),
            // Unknown subtask id poisons the whole batch.
            CompletionWrite::completed(Uuid::new_v4(), date),
        ];
        let err = store
            .transaction(|state| batch_create(state, user, &writes))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        store.read(|state| assert!(!is_completed_on_date(state, task_id, date)));
    }

    #[test]
    fn not_completed_outcome_reads_back_as_incomplete() {
        let (store, user, task_id) = seeded_store();
        let date = day("2024-02-11");
        store
            .transaction(|state| {
                create_completion(
                    state,
                    user,
                    &CompletionWrite {
                        task_id,
                        date,
                        outcome: Some(Outcome::NotCompleted),
                        note: None,
                    },
                )
            })
            .unwrap();
        store.read(|state| {
            assert!(!is_completed_on_date(state, task_id, date));
            assert_eq!(
                outcome_on_date(state, task_id, date),
                Some(Outcome::NotCompleted)
            );
        });
    }
}

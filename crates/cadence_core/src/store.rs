//! In-process transactional mirror of the backing store. The relational
//! server is an external collaborator reached through this same shape of
//! keyed operations; offline, this mirror is the optimistic local cache the
//! sync queue replays against.
//!
//! Transactions clone the state, run the closure on the draft, and commit
//! only on success, so a reader can never observe half of a multi-write
//! operation.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use cadence_domain::{
    CanonicalDate, CompletionRecord, EngineError, EngineResult, Outcome, Task,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

#[derive(Debug, Default, Clone)]
pub struct StoreState {
    tasks: HashMap<Uuid, Task>,
    completions: HashMap<Uuid, CompletionRecord>,
    /// Uniqueness constraint: at most one completion row per (task, date).
    completion_index: HashMap<(Uuid, CanonicalDate), Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.state.read())
    }

    /// Atomic multi-statement execution: the closure mutates a draft; any
    /// error discards the draft wholesale.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut guard = self.state.write();
        let mut draft = guard.clone();
        let value = f(&mut draft)?;
        *guard = draft;
        Ok(value)
    }
}

impl StoreState {
    // ---- tasks ----

    pub fn insert_task(&mut self, task: Task) -> EngineResult<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(EngineError::Conflict(format!(
                "task {} already exists",
                task.id
            )));
        }
        self.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn update_task(&mut self, task: Task) -> EngineResult<()> {
        if !self.tasks.contains_key(&task.id) {
            return Err(EngineError::NotFound(format!("task {}", task.id)));
        }
        self.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Every query is scoped by the acting user; a task owned by someone
    /// else is indistinguishable from a missing one.
    pub fn task_owned(&self, id: Uuid, user_id: Uuid) -> EngineResult<&Task> {
        self.tasks
            .get(&id)
            .filter(|task| task.user_id == user_id)
            .ok_or_else(|| EngineError::NotFound(format!("task {id}")))
    }

    pub fn tasks_for_user(&self, user_id: Uuid) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn subtasks_of(&self, parent_id: Uuid) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|task| task.parent_id == Some(parent_id))
            .cloned()
            .collect()
    }

    /// The off-schedule instance derived from `source_id` for `date`, if
    /// one exists. Uniqueness per (source, date) is maintained by the
    /// off-schedule manager always reusing this lookup before creating.
    pub fn off_schedule_instance(&self, source_id: Uuid, date: CanonicalDate) -> Option<&Task> {
        self.tasks.values().find(|task| {
            task.is_off_schedule
                && task.source_task_id == Some(source_id)
                && task.scheduled_date() == Some(date)
        })
    }

    /// Deletes a task together with its subtasks, the off-schedule
    /// instances derived from it, and every completion row of the removed
    /// tasks.
    pub fn remove_task_cascade(&mut self, id: Uuid) -> EngineResult<()> {
        if !self.tasks.contains_key(&id) {
            return Err(EngineError::NotFound(format!("task {id}")));
        }
        let mut doomed = vec![id];
        let derived: Vec<Uuid> = self
            .tasks
            .values()
            .filter(|task| {
                task.parent_id == Some(id)
                    || (task.is_off_schedule && task.source_task_id == Some(id))
            })
            .map(|task| task.id)
            .collect();
        doomed.extend(derived);

        for task_id in doomed {
            self.tasks.remove(&task_id);
            let rows: Vec<Uuid> = self
                .completions
                .values()
                .filter(|record| record.task_id == task_id)
                .map(|record| record.id)
                .collect();
            for row_id in rows {
                if let Some(record) = self.completions.remove(&row_id) {
                    self.completion_index.remove(&(record.task_id, record.date));
                }
            }
        }
        Ok(())
    }

    // ---- completions ----

    /// Upsert-on-conflict write path: an existing (task, date) row is
    /// updated in place, never duplicated.
    pub fn upsert_completion(
        &mut self,
        task_id: Uuid,
        user_id: Uuid,
        date: CanonicalDate,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> EngineResult<CompletionRecord> {
        if let Some(row_id) = self.completion_index.get(&(task_id, date)).copied() {
            let record = self
                .completions
                .get_mut(&row_id)
                .ok_or_else(|| EngineError::Transaction("completion index desynced".into()))?;
            record.outcome = outcome;
            record.note = note;
            return Ok(record.clone());
        }
        let record = CompletionRecord::new(task_id, user_id, date, outcome, note);
        self.completion_index.insert((task_id, date), record.id);
        self.completions.insert(record.id, record.clone());
        Ok(record)
    }

    /// Raw insert that refuses to overwrite: the path a duplicate create
    /// takes when it bypasses the upsert.
    pub fn insert_completion_strict(&mut self, record: CompletionRecord) -> EngineResult<()> {
        if self.completion_index.contains_key(&(record.task_id, record.date)) {
            return Err(EngineError::Conflict(format!(
                "completion for task {} on {} already exists",
                record.task_id, record.date
            )));
        }
        self.completion_index
            .insert((record.task_id, record.date), record.id);
        self.completions.insert(record.id, record);
        Ok(())
    }

    pub fn remove_completion(&mut self, task_id: Uuid, date: CanonicalDate) -> bool {
        match self.completion_index.remove(&(task_id, date)) {
            Some(row_id) => self.completions.remove(&row_id).is_some(),
            None => false,
        }
    }

    pub fn update_completion_fields(
        &mut self,
        row_id: Uuid,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> EngineResult<CompletionRecord> {
        let record = self
            .completions
            .get_mut(&row_id)
            .ok_or_else(|| EngineError::NotFound(format!("completion {row_id}")))?;
        record.outcome = outcome;
        record.note = note;
        Ok(record.clone())
    }

    pub fn completion_on(&self, task_id: Uuid, date: CanonicalDate) -> Option<&CompletionRecord> {
        self.completion_index
            .get(&(task_id, date))
            .and_then(|row_id| self.completions.get(row_id))
    }

    pub fn completions_for_task(&self, task_id: Uuid) -> Vec<CompletionRecord> {
        let mut rows: Vec<CompletionRecord> = self
            .completions
            .values()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by_key(|record| record.date);
        rows
    }

    pub fn completions_for_user(&self, user_id: Uuid) -> Vec<CompletionRecord> {
        let mut rows: Vec<CompletionRecord> = self
            .completions
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|record| record.date);
        rows
    }
}

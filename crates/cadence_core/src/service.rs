//! `TrackerService`: the engine facade the transport layer calls. Owns the
//! store mirror and the injected clock; every operation is scoped by the
//! acting user's id and every multi-write runs in one store transaction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_domain::{
    project_range, CanonicalDate, Clock, CompletionRecord, EngineResult, Outcome, Recurrence,
    SystemClock, Task, TaskChanges, TaskStatus,
};

use crate::ledger::{self, CompletionWrite};
use crate::off_schedule::{self, OffScheduleResult};
use crate::split::{self, SeriesSplit, SplitScope};
use crate::store::MemoryStore;

pub struct TrackerService {
    store: MemoryStore,
    clock: Box<dyn Clock>,
}

pub struct TrackerServiceBuilder {
    clock: Option<Box<dyn Clock>>,
}

impl TrackerServiceBuilder {
    pub fn new() -> Self {
        Self { clock: None }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> TrackerService {
        TrackerService {
            store: MemoryStore::new(),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
        }
    }
}

impl Default for TrackerServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a toggle did, so optimistic UI state can be reconciled or rolled
/// back by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToggleResult {
    Checked { records: usize },
    Unchecked { records: usize },
}

impl TrackerService {
    pub fn builder() -> TrackerServiceBuilder {
        TrackerServiceBuilder::new()
    }

    pub fn today(&self) -> CanonicalDate {
        self.clock.today()
    }

    // ---- tasks ----

    /// Inserts a task record as given (caller-supplied id); the sync replay
    /// path and tests use this directly.
    pub fn insert_task(&self, task: Task) -> EngineResult<Task> {
        self.store.transaction(|state| {
            state.insert_task(task.clone())?;
            Ok(task.clone())
        })
    }

    pub fn create_task(
        &self,
        user_id: Uuid,
        title: impl Into<String>,
        recurrence: Option<Recurrence>,
    ) -> EngineResult<Task> {
        let mut task = Task::new(user_id, title);
        task.recurrence = recurrence;
        self.insert_task(task)
    }

    pub fn task(&self, user_id: Uuid, id: Uuid) -> EngineResult<Task> {
        self.store
            .read(|state| state.task_owned(id, user_id).cloned())
    }

    pub fn tasks(&self, user_id: Uuid) -> Vec<Task> {
        self.store.read(|state| state.tasks_for_user(user_id))
    }

    /// Replaces a task record wholesale. Used by sync replay; interactive
    /// edits go through `update_task` or `split_series`.
    pub fn replace_task(&self, user_id: Uuid, task: Task) -> EngineResult<Task> {
        self.store.transaction(|state| {
            state.task_owned(task.id, user_id)?;
            state.update_task(task.clone())?;
            Ok(task.clone())
        })
    }

    /// Applies an edit uniformly to the task: the no-prompt path for
    /// cosmetic changes, or the explicit "rewrite the whole series" choice.
    pub fn update_task(&self, user_id: Uuid, id: Uuid, changes: &TaskChanges) -> EngineResult<Task> {
        self.store.transaction(|state| {
            let mut task = state.task_owned(id, user_id)?.clone();
            changes.apply_cosmetic(&mut task);
            if let Some(time) = changes.time {
                task.time = Some(time);
            }
            if let Some(recurrence) = &changes.recurrence {
                task.recurrence = Some(recurrence.clone());
            }
            state.update_task(task.clone())?;
            Ok(task)
        })
    }

    pub fn delete_task(&self, user_id: Uuid, id: Uuid) -> EngineResult<()> {
        self.store.transaction(|state| {
            state.task_owned(id, user_id)?;
            state.remove_task_cascade(id)
        })
    }

    // ---- series split ----

    pub fn requires_scope_decision(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: &TaskChanges,
    ) -> EngineResult<bool> {
        let task = self.task(user_id, id)?;
        Ok(split::requires_scope_decision(&task, changes))
    }

    /// Splits a recurring series at `edit_date`. Both halves of the planned
    /// write pair land in one transaction; a retry after failure re-plans
    /// from current state and cannot double-apply.
    pub fn split_series(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: &TaskChanges,
        edit_date: CanonicalDate,
        scope: SplitScope,
    ) -> EngineResult<Task> {
        self.store.transaction(|state| {
            let original = state.task_owned(id, user_id)?.clone();
            let plan: SeriesSplit = match scope {
                SplitScope::ThisOnly => {
                    split::plan_this_occurrence_only(&original, changes, edit_date)?
                }
                SplitScope::ThisAndFuture => {
                    split::plan_this_and_future(&original, changes, edit_date)?
                }
            };
            split::apply(state, plan)
        })
    }

    // ---- off-schedule ----

    pub fn set_off_schedule(
        &self,
        user_id: Uuid,
        source_task_id: Uuid,
        date: CanonicalDate,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> EngineResult<OffScheduleResult> {
        self.store.transaction(|state| {
            off_schedule::set_off_schedule(state, user_id, source_task_id, date, outcome, note)
        })
    }

    // ---- completions ----

    pub fn create_completion(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        date: CanonicalDate,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> EngineResult<CompletionRecord> {
        self.store.transaction(|state| {
            ledger::create_completion(
                state,
                user_id,
                &CompletionWrite {
                    task_id,
                    date,
                    outcome,
                    note,
                },
            )
        })
    }

    pub fn update_completion(
        &self,
        user_id: Uuid,
        row_id: Uuid,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> EngineResult<CompletionRecord> {
        self.store
            .transaction(|state| ledger::update_completion(state, user_id, row_id, outcome, note))
    }

    pub fn delete_completion(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        date: CanonicalDate,
    ) -> EngineResult<bool> {
        self.store
            .transaction(|state| ledger::delete_completion(state, user_id, task_id, date))
    }

    pub fn batch_create_completions(
        &self,
        user_id: Uuid,
        writes: &[CompletionWrite],
    ) -> EngineResult<Vec<CompletionRecord>> {
        self.store
            .transaction(|state| ledger::batch_create(state, user_id, writes))
    }

    pub fn batch_delete_completions(
        &self,
        user_id: Uuid,
        pairs: &[(Uuid, CanonicalDate)],
    ) -> EngineResult<usize> {
        self.store
            .transaction(|state| ledger::batch_delete(state, user_id, pairs))
    }

    pub fn is_completed_on_date(&self, task_id: Uuid, date: CanonicalDate) -> bool {
        self.store
            .read(|state| ledger::is_completed_on_date(state, task_id, date))
    }

    pub fn outcome_on_date(&self, task_id: Uuid, date: CanonicalDate) -> Option<Outcome> {
        self.store
            .read(|state| ledger::outcome_on_date(state, task_id, date))
    }

    pub fn completions_for_task(&self, user_id: Uuid, task_id: Uuid) -> EngineResult<Vec<CompletionRecord>> {
        self.store.read(|state| {
            state.task_owned(task_id, user_id)?;
            Ok(state.completions_for_task(task_id))
        })
    }

    /// Checking off an occurrence, optionally together with the task's
    /// subtasks, as one atomic batch. Checking an undated backlog item is
    /// defined as "schedule it for today and complete it": the ledger write
    /// and the schedule/status mutation are one operation on purpose and
    /// must not be decoupled.
    pub fn toggle_occurrence(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        date: Option<CanonicalDate>,
        with_subtasks: bool,
    ) -> EngineResult<ToggleResult> {
        let today = self.clock.today();
        self.store.transaction(|state| {
            let mut task = state.task_owned(task_id, user_id)?.clone();
            let date = date.unwrap_or(today);

            let mut targets = vec![task_id];
            if with_subtasks {
                targets.extend(state.subtasks_of(task_id).into_iter().map(|sub| sub.id));
            }

            let already = ledger::is_completed_on_date(state, task_id, date);
            if already {
                let pairs: Vec<(Uuid, CanonicalDate)> =
                    targets.iter().map(|id| (*id, date)).collect();
                let removed = ledger::batch_delete(state, user_id, &pairs)?;
                if !task.is_recurring() {
                    task.status = TaskStatus::Todo;
                    state.update_task(task)?;
                }
                tracing::debug!(%task_id, %date, removed, "unchecked occurrence");
                return Ok(ToggleResult::Unchecked { records: removed });
            }

            if task.is_undated() {
                // Retroactively schedule the backlog item for today.
                task.recurrence = Some(Recurrence::once_on(today));
                task.status = TaskStatus::Complete;
                state.update_task(task.clone())?;
            } else if !task.is_recurring() {
                task.status = TaskStatus::Complete;
                state.update_task(task.clone())?;
            }

            let writes: Vec<CompletionWrite> = targets
                .iter()
                .map(|id| CompletionWrite::completed(*id, date))
                .collect();
            let created = ledger::batch_create(state, user_id, &writes)?;
            tracing::debug!(%task_id, %date, records = created.len(), "checked occurrence");
            Ok(ToggleResult::Checked {
                records: created.len(),
            })
        })
    }

    // ---- projection ----

    /// The read side for every calendar/list view: which of the user's
    /// tasks occur on each day of `[start, end]`, reconciling pattern,
    /// ledger, and off-schedule instances.
    pub fn project_range(
        &self,
        user_id: Uuid,
        start: CanonicalDate,
        end: CanonicalDate,
    ) -> BTreeMap<CanonicalDate, Vec<Task>> {
        self.store.read(|state| {
            let tasks = state.tasks_for_user(user_id);
            let completions = state.completions_for_user(user_id);
            project_range(&tasks, &completions, start, end)
        })
    }
}

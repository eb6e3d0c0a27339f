//! The offline sync reconciliation queue: an ordered log of pending
//! mutations keyed by entity, with supersession rules that collapse repeated
//! edits before replay. Optimization is a bandwidth concern only: replaying
//! the optimized queue must produce the same end state as replaying the
//! original sequence.
//!
//! The queue has exactly one owner per client session; every mutating method
//! takes `&mut self`, so unguarded concurrent mutation is ruled out
//! structurally.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use cadence_core::TrackerService;
use cadence_domain::{CompletionRecord, EngineError, Task};

/// Transient store failures are retried this many times before the entry is
/// marked failed.
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntryStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncEntry {
    pub seq: u64,
    pub operation: SyncOperation,
    pub entity: EntityKind,
    pub entity_id: String,
    pub payload: Value,
    pub status: SyncEntryStatus,
    pub retry_count: u32,
}

impl SyncEntry {
    fn same_entity(&self, other: &SyncEntry) -> bool {
        self.entity == other.entity && self.entity_id == other.entity_id
    }
}

/// Where drained entries land: the server client online, or a local mirror
/// under test.
pub trait ReplayTarget {
    fn apply(&mut self, entry: &SyncEntry) -> Result<(), EngineError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub retried: usize,
    pub failed: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    entries: Vec<SyncEntry>,
    next_seq: u64,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, entity_id, payload))]
    pub fn enqueue(
        &mut self,
        operation: SyncOperation,
        entity: EntityKind,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(SyncEntry {
            seq,
            operation,
            entity,
            entity_id: entity_id.into(),
            payload,
            status: SyncEntryStatus::Pending,
            retry_count: 0,
        });
        seq
    }

    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    pub fn pending(&self) -> impl Iterator<Item = &SyncEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == SyncEntryStatus::Pending)
    }

    /// Collapses the pending log per (entity kind, entity id):
    /// - a DELETE discards every earlier pending entry for that entity and
    ///   remains the sole survivor;
    /// - an UPDATE replaces an immediately preceding pending UPDATE in
    ///   place, keeping only the latest payload;
    /// - a CREATE is never merged with later updates, so the server still
    ///   sees "create X" then "update X" and can hand the create's assigned
    ///   id to the update.
    #[instrument(skip(self))]
    pub fn optimize(&mut self) {
        let before = self.entries.len();
        let mut kept: Vec<SyncEntry> = Vec::with_capacity(before);
        for entry in self.entries.drain(..) {
            if entry.status != SyncEntryStatus::Pending {
                kept.push(entry);
                continue;
            }
            match entry.operation {
                SyncOperation::Delete => {
                    kept.retain(|prior| {
                        prior.status != SyncEntryStatus::Pending || !prior.same_entity(&entry)
                    });
                    kept.push(entry);
                }
                SyncOperation::Update => {
                    let prior = kept
                        .iter_mut()
                        .rev()
                        .find(|prior| {
                            prior.status == SyncEntryStatus::Pending && prior.same_entity(&entry)
                        });
                    match prior {
                        Some(prior) if prior.operation == SyncOperation::Update => {
                            prior.payload = entry.payload;
                        }
                        _ => kept.push(entry),
                    }
                }
                SyncOperation::Create => kept.push(entry),
            }
        }
        tracing::debug!(before, after = kept.len(), "optimized sync queue");
        self.entries = kept;
    }

    /// Replays pending entries in order. A transient store failure stops the
    /// drain (order per entity must hold) and leaves the entry pending with
    /// its retry count bumped, until the count runs out; validation,
    /// conflict and not-found failures are terminal for the entry: marked
    /// failed and surfaced, never silently dropped.
    #[instrument(skip(self, target))]
    pub fn drain(&mut self, target: &mut dyn ReplayTarget) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for entry in &mut self.entries {
            if entry.status != SyncEntryStatus::Pending {
                continue;
            }
            match target.apply(entry) {
                Ok(()) => {
                    entry.status = SyncEntryStatus::Completed;
                    report.applied += 1;
                }
                Err(err) if err.is_transient() => {
                    entry.retry_count += 1;
                    if entry.retry_count >= MAX_RETRIES {
                        tracing::warn!(seq = entry.seq, %err, "entry exhausted its retries");
                        entry.status = SyncEntryStatus::Failed;
                        report.failed.push((entry.seq, err.to_string()));
                    } else {
                        report.retried += 1;
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(seq = entry.seq, %err, "entry failed terminally");
                    entry.status = SyncEntryStatus::Failed;
                    report.failed.push((entry.seq, err.to_string()));
                }
            }
        }
        Ok(report)
    }
}

/// Applies queue entries to a [`TrackerService`] mirror on behalf of one
/// user. Deletes of entities the mirror never saw are no-ops, which keeps
/// replay idempotent after a crashed drain.
pub struct ServiceReplayTarget<'a> {
    service: &'a TrackerService,
    user_id: Uuid,
}

impl<'a> ServiceReplayTarget<'a> {
    pub fn new(service: &'a TrackerService, user_id: Uuid) -> Self {
        Self { service, user_id }
    }

    fn decode<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, EngineError> {
        serde_json::from_value(payload.clone())
            .map_err(|err| EngineError::Validation(format!("undecodable sync payload: {err}")))
    }
}

impl ReplayTarget for ServiceReplayTarget<'_> {
    fn apply(&mut self, entry: &SyncEntry) -> Result<(), EngineError> {
        match (entry.entity, entry.operation) {
            (EntityKind::Task, SyncOperation::Create) => {
                let task: Task = Self::decode(&entry.payload)?;
                self.service.insert_task(task)?;
            }
            (EntityKind::Task, SyncOperation::Update) => {
                let task: Task = Self::decode(&entry.payload)?;
                self.service.replace_task(self.user_id, task)?;
            }
            (EntityKind::Task, SyncOperation::Delete) => {
                let id = parse_entity_id(&entry.entity_id)?;
                match self.service.delete_task(self.user_id, id) {
                    Ok(()) | Err(EngineError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            (EntityKind::Completion, SyncOperation::Create | SyncOperation::Update) => {
                let record: CompletionRecord = Self::decode(&entry.payload)?;
                self.service.create_completion(
                    self.user_id,
                    record.task_id,
                    record.date,
                    record.outcome,
                    record.note,
                )?;
            }
            (EntityKind::Completion, SyncOperation::Delete) => {
                let record: CompletionRecord = Self::decode(&entry.payload)?;
                match self
                    .service
                    .delete_completion(self.user_id, record.task_id, record.date)
                {
                    Ok(_) | Err(EngineError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }
}

fn parse_entity_id(raw: &str) -> Result<Uuid, EngineError> {
    Uuid::parse_str(raw)
        .map_err(|err| EngineError::Validation(format!("bad entity id `{raw}`: {err}")))
}

/// Drains a queue into a service mirror with a context-tagged error chain,
/// the call sites in the app shell use.
pub fn replay_into(
    queue: &mut SyncQueue,
    service: &TrackerService,
    user_id: Uuid,
) -> Result<SyncReport> {
    let mut target = ServiceReplayTarget::new(service, user_id);
    queue
        .drain(&mut target)
        .with_context(|| format!("replaying sync queue for user {user_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_domain::{CanonicalDate, FixedClock, Outcome};
    use serde_json::json;

    fn day(s: &str) -> CanonicalDate {
        CanonicalDate::parse(s).expect("valid date")
    }

    fn mirror_at(today: &str) -> TrackerService {
        TrackerService::builder()
            .with_clock(Box::new(FixedClock(day(today))))
            .build()
    }

    fn task_payload(task: &Task) -> Value {
        serde_json::to_value(task).expect("task serializes")
    }

    #[test]
    fn delete_discards_all_earlier_entries_for_the_entity() {
        let mut queue = SyncQueue::new();
        let id = Uuid::new_v4().to_string();
        queue.enqueue(SyncOperation::Create, EntityKind::Task, id.as_str(), json!({"title": "a"}));
        queue.enqueue(SyncOperation::Update, EntityKind::Task, id.as_str(), json!({"title": "b"}));
        queue.enqueue(SyncOperation::Delete, EntityKind::Task, id.as_str(), Value::Null);
        let other = Uuid::new_v4().to_string();
        queue.enqueue(SyncOperation::Update, EntityKind::Task, other.as_str(), json!({"title": "keep"}));

        queue.optimize();
        let ops: Vec<_> = queue.pending().map(|e| (e.operation, e.entity_id.clone())).collect();
        assert_eq!(
            ops,
            vec![
                (SyncOperation::Delete, id),
                (SyncOperation::Update, other)
            ]
        );
    }

    #[test]
    fn consecutive_updates_keep_only_the_latest_payload() {
        let mut queue = SyncQueue::new();
        let id = Uuid::new_v4().to_string();
        queue.enqueue(SyncOperation::Update, EntityKind::Task, id.as_str(), json!({"title": "v1"}));
        queue.enqueue(SyncOperation::Update, EntityKind::Task, id.as_str(), json!({"title": "v2"}));
        queue.enqueue(SyncOperation::Update, EntityKind::Task, id.as_str(), json!({"title": "v3"}));

        queue.optimize();
        let pending: Vec<_> = queue.pending().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, json!({"title": "v3"}));
    }

    #[test]
    fn update_after_create_stays_a_separate_entry() {
        let mut queue = SyncQueue::new();
        let id = Uuid::new_v4().to_string();
        queue.enqueue(SyncOperation::Create, EntityKind::Task, id.as_str(), json!({"title": "new"}));
        queue.enqueue(SyncOperation::Update, EntityKind::Task, id.as_str(), json!({"title": "renamed"}));

        queue.optimize();
        let ops: Vec<_> = queue.pending().map(|e| e.operation).collect();
        assert_eq!(ops, vec![SyncOperation::Create, SyncOperation::Update]);
    }

    #[test]
    fn optimized_and_unoptimized_replays_converge() {
        let user = Uuid::new_v4();
        let mut task = Task::new(user, "Stretch");
        task.recurrence = Some(cadence_domain::Recurrence::once_on(day("2024-05-01")));
        let completion = CompletionRecord::new(
            task.id,
            user,
            day("2024-05-01"),
            Some(Outcome::Completed),
            None,
        );

        let mut plain = SyncQueue::new();
        plain.enqueue(
            SyncOperation::Create,
            EntityKind::Task,
            task.id.to_string(),
            task_payload(&task),
        );
        let mut renamed = task.clone();
        renamed.title = "Stretch (AM)".into();
        plain.enqueue(
            SyncOperation::Update,
            EntityKind::Task,
            task.id.to_string(),
            task_payload(&renamed),
        );
        let mut renamed_again = task.clone();
        renamed_again.title = "Stretch (early)".into();
        plain.enqueue(
            SyncOperation::Update,
            EntityKind::Task,
            task.id.to_string(),
            task_payload(&renamed_again),
        );
        plain.enqueue(
            SyncOperation::Create,
            EntityKind::Completion,
            completion.id.to_string(),
            serde_json::to_value(&completion).unwrap(),
        );
        let mut optimized = SyncQueue::new();
        for entry in plain.entries() {
            optimized.enqueue(
                entry.operation,
                entry.entity,
                entry.entity_id.clone(),
                entry.payload.clone(),
            );
        }
        optimized.optimize();
        assert!(optimized.pending().count() < plain.pending().count());

        let mirror_a = mirror_at("2024-05-02");
        let mirror_b = mirror_at("2024-05-02");
        let report_a = replay_into(&mut plain, &mirror_a, user).unwrap();
        let report_b = replay_into(&mut optimized, &mirror_b, user).unwrap();
        assert!(report_a.failed.is_empty());
        assert!(report_b.failed.is_empty());

        assert_eq!(mirror_a.tasks(user), mirror_b.tasks(user));
        // Replayed rows get fresh row ids; the (task, date, outcome, note)
        // facts are what must converge.
        let facts = |service: &TrackerService| {
            service
                .completions_for_task(user, task.id)
                .unwrap()
                .into_iter()
                .map(|record| (record.task_id, record.date, record.outcome, record.note))
                .collect::<Vec<_>>()
        };
        assert_eq!(facts(&mirror_a), facts(&mirror_b));
        assert_eq!(
            mirror_a.tasks(user)[0].title,
            "Stretch (early)"
        );
    }

    #[test]
    fn terminal_failures_are_marked_and_surfaced() {
        let mut queue = SyncQueue::new();
        queue.enqueue(
            SyncOperation::Create,
            EntityKind::Task,
            Uuid::new_v4().to_string(),
            json!({"not": "a task"}),
        );
        let mirror = mirror_at("2024-05-02");
        let user = Uuid::new_v4();
        let report = replay_into(&mut queue, &mirror, user).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(queue
            .entries()
            .iter()
            .all(|entry| entry.status == SyncEntryStatus::Failed));
    }

    #[test]
    fn transient_failures_leave_the_entry_pending_until_retries_run_out() {
        struct FlakyTarget {
            attempts: u32,
        }
        impl ReplayTarget for FlakyTarget {
            fn apply(&mut self, _entry: &SyncEntry) -> Result<(), EngineError> {
                self.attempts += 1;
                Err(EngineError::Store("connection reset".into()))
            }
        }

        let mut queue = SyncQueue::new();
        queue.enqueue(
            SyncOperation::Create,
            EntityKind::Task,
            Uuid::new_v4().to_string(),
            json!({}),
        );
        let mut target = FlakyTarget { attempts: 0 };

        let first = queue.drain(&mut target).unwrap();
        assert_eq!(first.retried, 1);
        assert_eq!(queue.pending().count(), 1);

        let second = queue.drain(&mut target).unwrap();
        assert_eq!(second.retried, 1);

        // Third attempt exhausts the retry allowance.
        let third = queue.drain(&mut target).unwrap();
        assert_eq!(third.failed.len(), 1);
        assert_eq!(queue.pending().count(), 0);
        assert_eq!(target.attempts, 3);
    }
}

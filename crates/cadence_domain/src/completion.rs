//! Completion records: the fact "on date D, task T had outcome O". At most
//! one record exists per (task, date); the store enforces that with an
//! upsert-on-conflict write path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates::CanonicalDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    NotCompleted,
    RolledOver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub date: CanonicalDate,
    /// Absent on records that predate outcome tracking; existence alone
    /// means the occurrence was completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(
        task_id: Uuid,
        user_id: Uuid,
        date: CanonicalDate,
        outcome: Option<Outcome>,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            user_id,
            date,
            outcome,
            note,
            created_at: Utc::now(),
        }
    }

    pub fn counts_as_completed(&self) -> bool {
        matches!(self.outcome, None | Some(Outcome::Completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> CanonicalDate {
        CanonicalDate::parse(s).expect("valid date")
    }

    #[test]
    fn legacy_records_without_an_outcome_count_as_completed() {
        let done = CompletionRecord::new(Uuid::new_v4(), Uuid::new_v4(), day("2024-01-05"), None, None);
        assert!(done.counts_as_completed());

        let missed = CompletionRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            day("2024-01-05"),
            Some(Outcome::NotCompleted),
            None,
        );
        assert!(!missed.counts_as_completed());
    }

    #[test]
    fn record_serializes_with_a_utc_midnight_date() {
        let record = CompletionRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            day("2024-02-10"),
            Some(Outcome::Completed),
            Some("felt good".into()),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-02-10T00:00:00.000Z");
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["note"], "felt good");

        let back: CompletionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}

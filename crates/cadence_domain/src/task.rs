//! The schedulable unit: a one-time item, a recurring series, or an
//! off-schedule instance derived from one.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates::CanonicalDate;
use crate::recurrence::Recurrence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Complete,
}

/// How an occurrence is logged: a bare checkbox, or an outcome with a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStyle {
    #[default]
    Check,
    Journal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<Uuid>,
    /// Scheduled time of day; dates live on the recurrence descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// `None` (or the `none` pattern) means one-time, optionally dated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    pub status: TaskStatus,
    /// Lineage back-reference for tasks derived by a series split or an
    /// off-schedule log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_task_id: Option<Uuid>,
    #[serde(default)]
    pub is_off_schedule: bool,
    /// Goal-type tasks carry unfinished work forward.
    #[serde(default)]
    pub is_rollover: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub completion_style: CompletionStyle,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            section_id: None,
            time: None,
            duration_minutes: None,
            color: None,
            tags: BTreeSet::new(),
            recurrence: None,
            status: TaskStatus::Todo,
            source_task_id: None,
            is_off_schedule: false,
            is_rollover: false,
            parent_id: None,
            completion_style: CompletionStyle::default(),
            created_at: Utc::now(),
        }
    }

    /// True when the descriptor declares anything beyond a one-time date.
    pub fn is_recurring(&self) -> bool {
        self.recurrence
            .as_ref()
            .map_or(false, |rec| !rec.is_one_time())
    }

    /// The single fixed date of a one-time task, when it has one.
    pub fn scheduled_date(&self) -> Option<CanonicalDate> {
        let rec = self.recurrence.as_ref()?;
        if rec.is_one_time() {
            rec.start_date
        } else {
            None
        }
    }

    /// Backlog item: not recurring and carrying no date at all.
    pub fn is_undated(&self) -> bool {
        !self.is_recurring() && self.scheduled_date().is_none()
    }
}

/// A sparse edit to a task. Only the present fields change; the split engine
/// inspects the scheduling subset to decide whether a scope prompt is due.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub section_id: Option<Uuid>,
    pub color: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
}

impl TaskChanges {
    /// Applies the non-scheduling fields onto `task`, leaving its schedule
    /// untouched. The split engine owns recurrence/time propagation.
    pub fn apply_cosmetic(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(section) = self.section_id {
            task.section_id = Some(section);
        }
        if let Some(color) = &self.color {
            task.color = Some(color.clone());
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(duration) = self.duration_minutes {
            task.duration_minutes = Some(duration);
        }
    }
}

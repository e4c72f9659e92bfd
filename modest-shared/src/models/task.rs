/// Task model
///
/// A task is a line of free text owned by exactly one account. Only the owner
/// may read, update, or delete it; the store enforces this by filtering every
/// query on the owner id.
///
/// # Wire format
///
/// ```json
/// {
///   "id": "3xJ9kQ2mZr8TbWcYpLa01d",
///   "owner": "9b2f5a7e-6c1d-4e8a-9f3b-2d7c1e0a4b56",
///   "text": "water the plants",
///   "status": "todo",
///   "created_at": "2025-03-01T10:00:00Z",
///   "updated_at": "2025-03-01T10:00:00Z"
/// }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started (default for new tasks)
    #[default]
    Todo,

    /// Being worked on
    InProgress,

    /// Finished
    Done,
}

impl TaskStatus {
    /// All valid statuses, in display order
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    /// Converts to the stored string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "inprogress",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task status '{0}', expected one of: todo, inprogress, done")]
pub struct InvalidTaskStatus(pub String);

impl FromStr for TaskStatus {
    type Err = InvalidTaskStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "inprogress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(InvalidTaskStatus(other.to_string())),
        }
    }
}

/// A task owned by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Random 22-character identifier
    pub id: String,

    /// Owning account
    pub owner: Uuid,

    /// Free-text body
    pub text: String,

    /// Current status
    pub status: TaskStatus,

    /// Creation time, never changes
    pub created_at: DateTime<Utc>,

    /// Last mutation time, strictly increasing across mutations
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds a fresh task with status `todo`
    pub fn new(id: String, owner: Uuid, text: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            text,
            status: TaskStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the task as modified
    ///
    /// Two mutations within the same clock tick still produce distinct,
    /// increasing timestamps.
    pub fn touch(&mut self) {
        self.updated_at = next_update_time(self.updated_at, Utc::now());
    }
}

/// Returns `now`, or one microsecond past `previous` if the clock has not
/// advanced beyond it
///
/// Microseconds match the resolution PostgreSQL stores.
pub fn next_update_time(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_round_trip_strings() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_task_status_rejects_unknown() {
        let err = "bogus".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err, InvalidTaskStatus("bogus".to_string()));
        assert!("TODO".parse::<TaskStatus>().is_err());
        assert!("".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_status_serde() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"inprogress\"");

        let parsed: TaskStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(parsed, TaskStatus::Done);
    }

    #[test]
    fn test_new_task_defaults() {
        let owner = Uuid::new_v4();
        let task = Task::new("abc".to_string(), owner, "write tests".to_string());

        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.owner, owner);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_touch_is_strictly_increasing() {
        let mut task = Task::new("abc".to_string(), Uuid::new_v4(), "x".to_string());
        let created = task.created_at;

        let mut previous = task.updated_at;
        for _ in 0..100 {
            task.touch();
            assert!(task.updated_at > previous);
            previous = task.updated_at;
        }
        assert_eq!(task.created_at, created);
    }

    #[test]
    fn test_next_update_time_with_stalled_clock() {
        let previous = Utc::now();
        let stalled = previous - Duration::seconds(5);

        assert_eq!(
            next_update_time(previous, stalled),
            previous + Duration::microseconds(1)
        );

        let later = previous + Duration::seconds(1);
        assert_eq!(next_update_time(previous, later), later);
    }
}

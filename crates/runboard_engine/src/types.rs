use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Backend-reported job status.
///
/// `Unknown` covers a job that has not been polled yet and any status string
/// the backend sends that is not part of the vocabulary below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    #[default]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "started" => JobStatus::Queued,
            "starting" | "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a backend job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub current_task: Option<u64>,
    /// Per-task status keyed by task id.
    #[serde(default)]
    pub task_status_map: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

/// Tally of per-task statuses reported in [`Job::task_status_map`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub other: usize,
}

impl TaskCounts {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn total(&self) -> usize {
        self.finished() + self.running + self.other
    }
}

impl Job {
    /// Rejects snapshots that break the task-count invariant.
    pub(crate) fn validate(self) -> Result<Self, ClientError> {
        if let Some(current) = self.current_task {
            if current > self.total_tasks {
                return Err(ClientError::Parse(format!(
                    "current_task {current} exceeds total_tasks {}",
                    self.total_tasks
                )));
            }
        }
        Ok(self)
    }

    /// Fraction of tasks finished, in `0.0..=1.0`. `None` until the total is known.
    pub fn progress(&self) -> Option<f64> {
        if self.total_tasks == 0 {
            return None;
        }
        let done = match self.current_task {
            Some(current) => current,
            None if self.status == JobStatus::Completed => self.total_tasks,
            None => 0,
        };
        Some(done as f64 / self.total_tasks as f64)
    }

    pub fn task_counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for status in self.task_status_map.iter().flat_map(|map| map.values()) {
            match JobStatus::from(status.clone()) {
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Queued | JobStatus::Unknown => counts.other += 1,
            }
        }
        counts
    }

    /// Error message the backend attached to a failed job, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.get("error"))
            .and_then(Value::as_str)
    }
}

/// One row of a project's run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRun {
    pub id: String,
    pub date: String,
    pub revision: String,
    pub model: String,
    pub score: f64,
    #[serde(rename = "totalTests")]
    pub total_tests: u64,
    pub pass: u64,
    pub fail: u64,
    pub regression: u64,
    #[serde(default)]
    pub bookmarked: Option<bool>,
    #[serde(default)]
    pub noted: Option<bool>,
}

/// Page window for run history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunsPage {
    pub limit: u32,
    pub offset: u32,
}

impl RunsPage {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

impl Default for RunsPage {
    fn default() -> Self {
        Self { limit: 5, offset: 0 }
    }
}

/// Full record of one run, including every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub id: String,
    pub project: Project,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub date: String,
    pub status: JobStatus,
    #[serde(default)]
    pub tasks: Vec<TaskDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub task_input: Option<Value>,
    #[serde(default)]
    pub task_output: Option<Value>,
    #[serde(default)]
    pub task_details: Option<Value>,
    #[serde(default)]
    pub task_logs: Option<Value>,
    #[serde(default)]
    pub eval_spec: Option<Value>,
    #[serde(default)]
    pub eval_passed: Option<bool>,
    #[serde(default)]
    pub eval_score: Option<f64>,
    #[serde(default)]
    pub eval_details: Option<Value>,
    #[serde(default)]
    pub eval_logs: Option<Value>,
    pub created_at: String,
    #[serde(default)]
    pub executed_at: Option<String>,
    #[serde(default)]
    pub evaluated_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(value: Value) -> Job {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn backend_status_vocabulary_maps_onto_closed_set() {
        assert_eq!(JobStatus::from("started".to_string()), JobStatus::Queued);
        assert_eq!(JobStatus::from("starting".to_string()), JobStatus::Running);
        assert_eq!(JobStatus::from("COMPLETED".to_string()), JobStatus::Completed);
        assert_eq!(JobStatus::from("evaluating".to_string()), JobStatus::Unknown);
    }

    #[test]
    fn progress_and_counts_follow_snapshot() {
        let snapshot = job(json!({
            "project_id": "p",
            "job_id": "j",
            "status": "running",
            "total_tasks": 4,
            "current_task": 2,
            "task_status_map": {"t1": "completed", "t2": "failed", "t3": "running"},
        }));

        assert_eq!(snapshot.progress(), Some(0.5));
        let counts = snapshot.task_counts();
        assert_eq!((counts.completed, counts.failed, counts.running), (1, 1, 1));
        assert_eq!(counts.finished(), 2);
    }

    #[test]
    fn current_task_past_total_is_rejected() {
        let snapshot = job(json!({
            "project_id": "p", "job_id": "j", "status": "running",
            "total_tasks": 2, "current_task": 3,
        }));
        assert!(matches!(snapshot.validate(), Err(ClientError::Parse(_))));
    }

    #[test]
    fn runs_page_clamps_limit() {
        assert_eq!(RunsPage::new(0, 3), RunsPage { limit: 1, offset: 3 });
        assert_eq!(RunsPage::new(500, 0).limit, RunsPage::MAX_LIMIT);
    }
}

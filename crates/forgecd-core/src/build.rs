use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::BuildKey;

/// Status ∈ {scheduled, running, successful, failed, canceled} (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Scheduled,
    Running,
    Successful,
    Failed,
    Canceled,
}

impl BuildStatus {
    /// Legal transitions: scheduled → {running, canceled, failed};
    /// running → {successful, failed, canceled}; terminal states absorb.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        matches!(
            (self, next),
            (Scheduled, Running | Canceled | Failed)
                | (Running, Successful | Failed | Canceled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Successful | BuildStatus::Failed | BuildStatus::Canceled
        )
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildStatus::Scheduled => "scheduled",
            BuildStatus::Running => "running",
            BuildStatus::Successful => "successful",
            BuildStatus::Failed => "failed",
            BuildStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// `{command, idx, total, output}` (spec §3). `idx`/`total` are `None` for
/// synthetic entries (`[bind]`, `[build init]`, ...) that don't originate
/// from a user command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLog {
    pub command: String,
    pub idx: Option<i32>,
    pub total: Option<i32>,
    pub output: String,
}

impl BuildLog {
    pub fn synthetic(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            idx: None,
            total: None,
            output: String::new(),
        }
    }

    pub fn command(command: impl Into<String>, idx: i32, total: i32) -> Self {
        Self {
            command: command.into(),
            idx: Some(idx),
            total: Some(total),
            output: String::new(),
        }
    }

    /// Appends output, newline-separated, per spec §3.
    pub fn append_output(&mut self, line: &str) {
        if self.output.is_empty() {
            self.output.push_str(line);
        } else {
            self.output.push('\n');
            self.output.push_str(line);
        }
    }
}

/// Identified by `(build_key, name)` (spec §3). Holds an ordered list of
/// `BuildLog` entries and start/duration bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<BuildLog>,
}

impl BuildStep {
    pub fn open(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            started_at: now,
            finished_at: None,
            logs: Vec::new(),
        }
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.finished_at = Some(now);
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub fn append_log(&mut self, log: BuildLog) {
        self.logs.push(log);
    }

    /// Appends output, concatenating to the last log's output (spec §3).
    pub fn append_output(&mut self, line: &str) {
        if let Some(last) = self.logs.last_mut() {
            last.append_output(line);
        }
    }
}

/// One execution attempt of a pipeline (spec §3, glossary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub key: BuildKey,
    pub status: BuildStatus,
    pub worker_name: Option<String>,
    pub steps: Vec<BuildStep>,
    pub created_at: DateTime<Utc>,
}

impl Build {
    pub fn new(key: BuildKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: BuildStatus::Scheduled,
            worker_name: None,
            steps: Vec::new(),
            created_at: now,
        }
    }

    pub fn current_step_mut(&mut self) -> Option<&mut BuildStep> {
        self.steps.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(BuildStatus::Scheduled.can_transition_to(BuildStatus::Running));
        assert!(BuildStatus::Scheduled.can_transition_to(BuildStatus::Canceled));
        assert!(BuildStatus::Running.can_transition_to(BuildStatus::Successful));
        assert!(!BuildStatus::Successful.can_transition_to(BuildStatus::Running));
        assert!(!BuildStatus::Scheduled.can_transition_to(BuildStatus::Successful));
    }

    #[test]
    fn build_log_output_is_newline_joined() {
        let mut log = BuildLog::command("echo hi", 0, 1);
        log.append_output("hi");
        log.append_output("there");
        assert_eq!(log.output, "hi\nthere");
    }

    #[test]
    fn build_key_round_trips() {
        let key = BuildKey::new("acme", "deploy", 7);
        assert_eq!(key.to_string(), "acme/deploy/7");
        assert_eq!(key.as_workdir(), "acme_deploy_7");
        let parsed: BuildKey = "acme/deploy/7".parse().unwrap();
        assert_eq!(parsed, key);
    }
}

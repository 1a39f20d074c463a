use serde::{Deserialize, Serialize};

/// `status ∈ {idle, used, unreachable}` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Used,
    Unreachable,
}

/// `strategy ∈ {min, balanced, max}` (spec §3). Ordering for the worker
/// selector's sort key (spec §4.3: descending strategy, max > balanced > min).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStrategy {
    Min,
    Balanced,
    Max,
}

/// `(name)` primary key (spec §3). Static workers connect over SSH to
/// `address`; non-static workers are Docker hosts at `address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub name: String,
    pub address: String,
    pub system: String,
    pub username: String,
    pub is_static: bool,
    pub status: WorkerStatus,
    pub strategy: WorkerStrategy,
    pub active_builds: i32,
    pub capacity: i32,
}

impl Worker {
    pub fn has_free_capacity(&self) -> bool {
        self.active_builds < self.capacity
    }

    /// Recomputes idle/used from `active_builds`; `unreachable` is set
    /// exclusively from probe results and is not touched here (spec §3).
    pub fn refresh_status_from_load(&mut self) {
        if self.status == WorkerStatus::Unreachable {
            return;
        }
        self.status = if self.active_builds > 0 {
            WorkerStatus::Used
        } else {
            WorkerStatus::Idle
        };
    }
}

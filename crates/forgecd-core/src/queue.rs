use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::{Build, BuildLog, BuildStep};
use crate::id::BuildKey;
use crate::pipeline::PipelineConfig;
use crate::secret::Resolved;

/// Snapshot of the resolved build context, serialized as the queue element's
/// `context` JSON column (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueContext {
    pub build_key: BuildKey,
    pub repo: String,
    pub branch: String,
    /// `config.steps` already has the workdir/secrets/variables steps
    /// prepended and cleanup appended (spec §4.5 step 7).
    pub config: PipelineConfig,
    pub secrets: Vec<ResolvedSecret>,
    pub variables: Vec<ResolvedVariable>,
    pub worker_name: Option<String>,
    /// The "Worker binding" build step opened when this element is enqueued,
    /// closed by the Binder once a worker is matched (spec §4.4 step 3).
    /// Carried on the context rather than looked up again so the Binder
    /// doesn't need an extra query to find which step is still open.
    pub pending_step_id: Option<uuid::Uuid>,
}

/// A resolved secret: the value is the base64-encoded payload as stored in
/// the secret store (decoded at injection time, spec §4.5 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSecret {
    pub key: String,
    pub path: Option<String>,
    pub store_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVariable {
    pub key: String,
    pub path: Option<String>,
    pub value: String,
}

impl From<Resolved<String>> for ResolvedVariable {
    fn from(r: Resolved<String>) -> Self {
        Self {
            key: r.key,
            path: r.path,
            value: r.value,
        }
    }
}

/// `{id, context, created_at}` (spec §3). A queue element exists iff its
/// build is `scheduled` and not yet bound (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueElement {
    pub id: String,
    pub context: QueueContext,
    pub created_at: DateTime<Utc>,
}

impl QueueElement {
    pub fn new(context: QueueContext, now: DateTime<Utc>) -> Self {
        Self {
            id: context.build_key.to_string(),
            context,
            created_at: now,
        }
    }
}

/// The seed step recorded while building context, plus the build it belongs
/// to — returned by the context builder to the caller (spec §4.5).
pub struct ContextBuildResult {
    pub build: Build,
    pub queue_context: QueueContext,
    pub seed_step: BuildStep,
}

impl ContextBuildResult {
    pub fn seed_log(name: &str, outcome: &str) -> BuildLog {
        BuildLog::synthetic(format!("[{name}] {outcome}"))
    }
}

//! `CoreServices` (spec §9): "Replace [process-wide state] with constructor
//! injection: one `CoreServices` value threaded through the engine and its
//! components; tests inject fakes." Grounded on spec §9's explicit
//! instruction and `buildit-api/src/state.rs`'s `AppState` aggregation-struct
//! pattern. Lives here rather than in `forgecd-core` because it names the
//! concrete `forgecd-db`/`forgecd-secrets`/`forgecd-runner` types, and
//! `forgecd-core` must stay free of those dependencies to avoid a cycle.

use std::sync::Arc;

use forgecd_db::{BuildRepo, OutboxRepo, PipelineRepo, ProjectRepo, QueueRepo, SecretRepo, VariableRepo, WorkerRepo};
use forgecd_runner::DockerClientManager;
use forgecd_secrets::SecretStore;
use sqlx::PgPool;

/// Everything the engine's components need, injected once at startup
/// (`forgecd-cli::main`) and shared via `Arc` across the event loop, the
/// Binder, and every spawned executor task.
#[derive(Clone)]
pub struct CoreServices {
    pub pool: PgPool,
    pub build_repo: Arc<dyn BuildRepo>,
    pub pipeline_repo: Arc<dyn PipelineRepo>,
    pub project_repo: Arc<dyn ProjectRepo>,
    pub worker_repo: Arc<dyn WorkerRepo>,
    pub secret_repo: Arc<dyn SecretRepo>,
    pub variable_repo: Arc<dyn VariableRepo>,
    pub queue_repo: Arc<dyn QueueRepo>,
    pub outbox_repo: Arc<dyn OutboxRepo>,
    pub secret_store: Arc<dyn SecretStore>,
    pub docker_manager: Arc<DockerClientManager>,
    /// `None` in standalone mode; set when `scheduler = k8s` (spec §6).
    pub kube_client: Option<kube::Client>,
}

impl CoreServices {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        build_repo: Arc<dyn BuildRepo>,
        pipeline_repo: Arc<dyn PipelineRepo>,
        project_repo: Arc<dyn ProjectRepo>,
        worker_repo: Arc<dyn WorkerRepo>,
        secret_repo: Arc<dyn SecretRepo>,
        variable_repo: Arc<dyn VariableRepo>,
        queue_repo: Arc<dyn QueueRepo>,
        outbox_repo: Arc<dyn OutboxRepo>,
        secret_store: Arc<dyn SecretStore>,
        docker_manager: Arc<DockerClientManager>,
        kube_client: Option<kube::Client>,
    ) -> Self {
        Self {
            pool,
            build_repo,
            pipeline_repo,
            project_repo,
            worker_repo,
            secret_repo,
            variable_repo,
            queue_repo,
            outbox_repo,
            secret_store,
            docker_manager,
            kube_client,
        }
    }
}
